use crate::session::types::{Fingerprint, RequestContext};

/// Value substituted for a signal the request does not carry.
pub(crate) const MISSING_SIGNAL: &str = "";

/// Derive the client fingerprint from a request.
///
/// Never fails: an absent address or user agent becomes the empty string, so a
/// later comparison is always defined.
pub fn extract_fingerprint(ctx: &RequestContext) -> Fingerprint {
    Fingerprint {
        client_address: ctx
            .client_address
            .clone()
            .unwrap_or_else(|| MISSING_SIGNAL.to_string()),
        user_agent: ctx
            .user_agent
            .clone()
            .unwrap_or_else(|| MISSING_SIGNAL.to_string()),
    }
}
