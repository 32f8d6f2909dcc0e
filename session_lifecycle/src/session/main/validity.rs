use chrono::{DateTime, Utc};

use crate::session::types::{SessionRecord, Validity};

/// Classify a looked-up record at `now`.
///
/// A record without an expiry is valid for as long as the store keeps it.
pub fn evaluate(record: Option<&SessionRecord>, now: DateTime<Utc>) -> Validity {
    match record {
        None => Validity::Missing,
        Some(record) => match record.expires_at {
            Some(expires_at) if expires_at < now => Validity::Expired,
            _ => Validity::Valid,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::Fingerprint;
    use chrono::Duration;

    fn record_expiring(at: Option<DateTime<Utc>>) -> SessionRecord {
        SessionRecord::bound(Fingerprint::new("192.0.2.1", "agent"), at)
    }

    #[test]
    fn test_absent_record_is_missing() {
        assert_eq!(evaluate(None, Utc::now()), Validity::Missing);
    }

    #[test]
    fn test_record_without_expiry_is_valid() {
        let record = record_expiring(None);
        assert_eq!(evaluate(Some(&record), Utc::now()), Validity::Valid);
    }

    #[test]
    fn test_record_in_the_past_is_expired() {
        let now = Utc::now();
        let record = record_expiring(Some(now - Duration::seconds(1)));
        assert_eq!(evaluate(Some(&record), now), Validity::Expired);
    }

    #[test]
    fn test_expiry_boundary_is_still_valid() {
        // Expired means strictly before now
        let now = Utc::now();
        let record = record_expiring(Some(now));
        assert_eq!(evaluate(Some(&record), now), Validity::Valid);
    }

    #[test]
    fn test_evaluation_uses_the_given_clock() {
        let now = Utc::now();
        let record = record_expiring(Some(now + Duration::seconds(60)));

        assert_eq!(evaluate(Some(&record), now), Validity::Valid);
        assert_eq!(
            evaluate(Some(&record), now + Duration::seconds(61)),
            Validity::Expired
        );
    }
}
