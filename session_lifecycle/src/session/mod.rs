mod common;
mod config;
mod errors;
mod main;
mod types;

pub use config::{SESSION_COOKIE_NAME, SessionConfig};
pub use errors::SessionError;
pub use main::{
    Clock, FixedRandom, ManualClock, RandomSource, SequenceRandom, SessionManager, SystemClock,
    SystemRandom, detect, evaluate, extract_fingerprint, get_session_id_from_headers,
    prepare_logout_headers, session_cookie, set_session_cookie,
};
pub use types::{
    Fingerprint, HijackCheck, RequestContext, ResumedSession, RotationMarker, RotationOutcome,
    RotationReason, SessionData, SessionRecord, Transition, Validity,
};
