use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::{HeaderMap, header::SET_COOKIE, uri::Scheme};
use std::net::SocketAddr;

use session_lifecycle::{RequestContext, SessionManager, set_session_cookie};

use super::error::IntoResponseError;
use super::session::TrustedSession;

/// Whether the connection the request arrived on is encrypted.
///
/// Servers see origin-form URIs without a scheme, so a TLS listener has to
/// say so itself: add `Extension(TransportSecure(true))` as a layer outside
/// [`resume_session`]. Without it the URI scheme is used, which only carries
/// `https` for absolute-form requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportSecure(pub bool);

/// Resume the session for every request passing through.
///
/// Install with `axum::middleware::from_fn_with_state(manager, resume_session)`.
/// The client address comes from `ConnectInfo<SocketAddr>` when the server
/// was started with `into_make_service_with_connect_info`.
pub async fn resume_session(
    State(manager): State<SessionManager>,
    mut req: Request,
    next: Next,
) -> Response {
    let client_address = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let secure = is_secure(&req);

    let ctx = RequestContext::from_headers(
        req.headers(),
        client_address,
        secure,
        &manager.config().cookie_name,
    );

    let session = match manager.resume(&ctx).await.into_response_error() {
        Ok(session) => session,
        Err(err) => {
            tracing::error!("Failed to resume session: {}", err.1);
            return err.into_response();
        }
    };
    tracing::debug!("Session transition: {:?}", session.transition);

    req.extensions_mut().insert(TrustedSession::new(
        session.clone(),
        ctx.clone(),
        manager.clone(),
    ));

    let mut response = next.run(req).await;

    // A handler that already wrote the session cookie (e.g. logout) wins
    if sets_cookie(response.headers(), &manager.config().cookie_name) {
        return response;
    }

    if let Err(e) = set_session_cookie(
        response.headers_mut(),
        manager.config(),
        &ctx,
        &session,
        manager.now(),
    ) {
        tracing::error!("Failed to set session cookie: {}", e);
    }
    response
}

fn is_secure(req: &Request) -> bool {
    match req.extensions().get::<TransportSecure>() {
        Some(TransportSecure(secure)) => *secure,
        None => req.uri().scheme() == Some(&Scheme::HTTPS),
    }
}

fn sets_cookie(headers: &HeaderMap, cookie_name: &str) -> bool {
    let prefix = format!("{cookie_name}=");
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with(&prefix))
}
