//! session_lifecycle - trust decisions and identifier rotation for web sessions
//!
//! Each inbound request is resolved to a session the caller can trust:
//! missing or expired sessions are replaced, sessions presented from a
//! different client are wiped and rotated, and healthy sessions are rotated
//! now and then to bound the useful life of any one identifier. A superseded
//! identifier keeps resolving for a short grace window so that requests
//! already in flight are not cut off.
//!
//! ```no_run
//! use session_lifecycle::{RequestContext, SessionConfig, SessionManager, cache_store_from_env};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = cache_store_from_env().await?;
//! let manager = SessionManager::new(store, SessionConfig::from_env())?;
//!
//! let ctx = RequestContext::new()
//!     .with_client_address("203.0.113.7")
//!     .with_user_agent("Mozilla/5.0");
//! let mut session = manager.resume(&ctx).await?;
//! session.record.insert("visits", 1)?;
//! manager.save(&session).await?;
//! # Ok(())
//! # }
//! ```

mod session;
mod storage;
mod utils;

pub use session::{
    Clock, Fingerprint, FixedRandom, HijackCheck, ManualClock, RandomSource, RequestContext,
    ResumedSession, RotationMarker, RotationOutcome, RotationReason, SESSION_COOKIE_NAME,
    SequenceRandom, SessionConfig, SessionData, SessionError, SessionManager, SessionRecord,
    SystemClock, SystemRandom, Transition, Validity, detect, evaluate, extract_fingerprint,
    get_session_id_from_headers, prepare_logout_headers, session_cookie, set_session_cookie,
};

pub use storage::{
    CacheData, CacheStore, InMemoryCacheStore, RedisCacheStore, StorageError,
    cache_store_from_env,
};

pub use utils::{UtilError, gen_random_string};
