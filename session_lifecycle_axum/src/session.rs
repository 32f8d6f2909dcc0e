use axum::extract::FromRequestParts;
use http::{HeaderMap, StatusCode, request::Parts};
use serde::{Serialize, de::DeserializeOwned};

use session_lifecycle::{
    RequestContext, ResumedSession, SessionError, SessionManager, Transition,
    prepare_logout_headers,
};

/// The request's session after the lifecycle checks, available as an Axum extractor
///
/// Inserted into request extensions by [`resume_session`](crate::resume_session).
/// Handlers read and modify data through it and call [`save`](Self::save) to
/// persist changes.
///
/// # Example
///
/// ```no_run
/// use axum::{routing::get, Router};
/// use session_lifecycle_axum::TrustedSession;
///
/// async fn visits(mut session: TrustedSession) -> String {
///     let count = session.get::<u64>("visits").ok().flatten().unwrap_or(0) + 1;
///     let _ = session.insert("visits", count);
///     let _ = session.save().await;
///     format!("visit #{count}")
/// }
///
/// let app: Router = Router::new().route("/", get(visits));
/// ```
#[derive(Clone, Debug)]
pub struct TrustedSession {
    session: ResumedSession,
    ctx: RequestContext,
    manager: SessionManager,
}

impl TrustedSession {
    pub(crate) fn new(session: ResumedSession, ctx: RequestContext, manager: SessionManager) -> Self {
        Self {
            session,
            ctx,
            manager,
        }
    }

    pub fn id(&self) -> &str {
        &self.session.session_id
    }

    pub fn transition(&self) -> Transition {
        self.session.transition
    }

    pub fn session(&self) -> &ResumedSession {
        &self.session
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionError> {
        self.session.record.get(key)
    }

    pub fn insert<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), SessionError> {
        self.session.record.insert(key, value)
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.session.record.remove(key)
    }

    /// Persist the data held by this extractor. Returns `false` if the
    /// session has been removed in the meantime.
    pub async fn save(&self) -> Result<bool, SessionError> {
        self.manager.save(&self.session).await
    }

    /// Remove the session and return headers that clear the cookie.
    pub async fn destroy(self) -> Result<HeaderMap, SessionError> {
        self.manager.destroy(&self.session.session_id).await?;
        prepare_logout_headers(self.manager.config(), &self.ctx)
    }
}

impl<S> FromRequestParts<S> for TrustedSession
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<TrustedSession>().cloned().ok_or_else(|| {
            tracing::error!("TrustedSession requested but the session middleware is not installed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Session middleware not installed",
            )
        })
    }
}
