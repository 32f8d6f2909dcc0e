mod capability;
mod cookie;
mod fingerprint;
mod hijack;
mod manager;
mod record;
mod rotation;
mod validity;

pub use capability::{
    Clock, FixedRandom, ManualClock, RandomSource, SequenceRandom, SystemClock, SystemRandom,
};
pub use cookie::{
    get_session_id_from_headers, prepare_logout_headers, session_cookie, set_session_cookie,
};
pub use fingerprint::extract_fingerprint;
pub use hijack::detect;
pub use manager::SessionManager;
pub use validity::evaluate;
