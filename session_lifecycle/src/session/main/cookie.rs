use chrono::{DateTime, Utc};
use http::header::{COOKIE, HOST, HeaderMap, HeaderName, USER_AGENT};

use crate::session::config::SessionConfig;
use crate::session::errors::SessionError;
use crate::session::types::{RequestContext, ResumedSession};
use crate::utils::header_set_cookie;

pub fn get_session_id_from_headers<'a>(
    headers: &'a HeaderMap,
    cookie_name: &str,
) -> Result<Option<&'a str>, SessionError> {
    let Some(cookie_header) = headers.get(COOKIE) else {
        tracing::debug!("No cookie header found");
        return Ok(None);
    };

    let cookie_str = cookie_header.to_str().map_err(|e| {
        tracing::error!("Invalid cookie header: {}", e);
        SessionError::Cookie("Invalid cookie header".to_string())
    })?;

    let session_id = cookie_str.split(';').map(|s| s.trim()).find_map(|s| {
        let mut parts = s.splitn(2, '=');
        match (parts.next(), parts.next()) {
            (Some(k), Some(v)) if k == cookie_name && !v.is_empty() => Some(v),
            _ => None,
        }
    });

    if session_id.is_none() {
        tracing::debug!("No session cookie '{}' found in cookies", cookie_name);
    }

    Ok(session_id)
}

impl RequestContext {
    /// Collect the lifecycle inputs from request headers.
    ///
    /// Unreadable headers are treated as absent rather than failing the request.
    pub fn from_headers(
        headers: &HeaderMap,
        client_address: Option<String>,
        secure: bool,
        cookie_name: &str,
    ) -> Self {
        let session_id = get_session_id_from_headers(headers, cookie_name)
            .ok()
            .flatten()
            .map(str::to_string);

        let header_str = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Self {
            client_address,
            user_agent: header_str(USER_AGENT),
            session_id,
            host: header_str(HOST),
            secure,
        }
    }
}

/// Strip any port from a `Host` value.
fn host_domain(host: &str) -> &str {
    if host.starts_with('[') {
        return host.find(']').map_or(host, |end| &host[..=end]);
    }
    host.split(':').next().unwrap_or(host)
}

fn cookie_attributes(config: &SessionConfig, ctx: &RequestContext) -> String {
    let mut attrs = format!("; Path={}", config.cookie_path);

    let domain = config
        .cookie_domain
        .as_deref()
        .or_else(|| ctx.host.as_deref().map(host_domain))
        .filter(|d| !d.is_empty());
    if let Some(domain) = domain {
        attrs.push_str(&format!("; Domain={domain}"));
    }
    if ctx.secure {
        attrs.push_str("; Secure");
    }
    if config.http_only {
        attrs.push_str("; HttpOnly");
    }
    attrs.push_str("; SameSite=Lax");
    attrs
}

/// The `Set-Cookie` value to send for `session`, or `None` when the client
/// already holds the current identifier.
///
/// Without an expiry the cookie is session-scoped; otherwise `Max-Age` is the
/// time left until `expires_at`.
pub fn session_cookie(
    config: &SessionConfig,
    ctx: &RequestContext,
    session: &ResumedSession,
    now: DateTime<Utc>,
) -> Option<String> {
    if !session.id_changed() {
        return None;
    }

    let mut cookie = format!("{}={}", config.cookie_name, session.session_id);
    if let Some(expires_at) = session.record.expires_at() {
        let max_age = (expires_at - now).num_seconds().max(0);
        cookie.push_str(&format!("; Max-Age={max_age}"));
    }
    cookie.push_str(&cookie_attributes(config, ctx));
    Some(cookie)
}

/// Append the session cookie to `headers` if the identifier changed.
/// Returns whether a cookie was written.
pub fn set_session_cookie(
    headers: &mut HeaderMap,
    config: &SessionConfig,
    ctx: &RequestContext,
    session: &ResumedSession,
    now: DateTime<Utc>,
) -> Result<bool, SessionError> {
    let Some(cookie) = session_cookie(config, ctx, session, now) else {
        return Ok(false);
    };
    header_set_cookie(headers, &cookie)?;
    Ok(true)
}

/// Headers that clear the session cookie on the client.
pub fn prepare_logout_headers(
    config: &SessionConfig,
    ctx: &RequestContext,
) -> Result<HeaderMap, SessionError> {
    let mut headers = HeaderMap::new();
    let cookie = format!(
        "{}=; Max-Age=0{}",
        config.cookie_name,
        cookie_attributes(config, ctx)
    );
    header_set_cookie(&mut headers, &cookie)?;
    Ok(headers)
}
