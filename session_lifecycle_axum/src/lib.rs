mod error;
mod middleware;
mod session;

pub use error::IntoResponseError;
pub use middleware::{TransportSecure, resume_session};
pub use session::TrustedSession;

// Re-export the core types handlers commonly need
pub use session_lifecycle::{
    RequestContext, ResumedSession, SESSION_COOKIE_NAME, SessionConfig, SessionError,
    SessionManager, Transition, cache_store_from_env,
};
