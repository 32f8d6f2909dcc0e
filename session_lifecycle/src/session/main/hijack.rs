use subtle::ConstantTimeEq;

use crate::session::types::{Fingerprint, HijackCheck, SessionRecord};

/// Compare the record's binding with the current request's fingerprint.
///
/// Comparison is byte-exact with no normalization, so a user agent that only
/// changed case is still a mismatch. An unbound record always mismatches.
pub fn detect(record: &SessionRecord, current: &Fingerprint) -> HijackCheck {
    let Some(bound) = record.fingerprint.as_ref() else {
        return HijackCheck::Mismatch;
    };

    let address_eq = bound
        .client_address
        .as_bytes()
        .ct_eq(current.client_address.as_bytes());
    let agent_eq = bound
        .user_agent
        .as_bytes()
        .ct_eq(current.user_agent.as_bytes());

    if bool::from(address_eq & agent_eq) {
        HijackCheck::Match
    } else {
        HijackCheck::Mismatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bound(address: &str, agent: &str) -> SessionRecord {
        SessionRecord::bound(Fingerprint::new(address, agent), None)
    }

    #[test]
    fn test_identical_fingerprint_matches() {
        let record = bound("192.0.2.1", "Mozilla/5.0");
        let current = Fingerprint::new("192.0.2.1", "Mozilla/5.0");
        assert_eq!(detect(&record, &current), HijackCheck::Match);
    }

    #[test]
    fn test_address_change_mismatches() {
        let record = bound("192.0.2.1", "Mozilla/5.0");
        let current = Fingerprint::new("192.0.2.2", "Mozilla/5.0");
        assert_eq!(detect(&record, &current), HijackCheck::Mismatch);
    }

    #[test]
    fn test_agent_case_drift_mismatches() {
        let record = bound("192.0.2.1", "Mozilla/5.0");
        let current = Fingerprint::new("192.0.2.1", "mozilla/5.0");
        assert_eq!(detect(&record, &current), HijackCheck::Mismatch);
    }

    #[test]
    fn test_unbound_record_mismatches() {
        let record = SessionRecord::default();
        let current = Fingerprint::new("", "");
        assert_eq!(detect(&record, &current), HijackCheck::Mismatch);
    }

    #[test]
    fn test_sentinel_fingerprints_match_each_other() {
        let record = bound("", "");
        assert_eq!(detect(&record, &Fingerprint::new("", "")), HijackCheck::Match);
    }

    proptest! {
        #[test]
        fn prop_mismatch_iff_any_component_differs(
            a1 in ".{0,24}", u1 in ".{0,48}", a2 in ".{0,24}", u2 in ".{0,48}"
        ) {
            let record = bound(&a1, &u1);
            let current = Fingerprint::new(a2.clone(), u2.clone());
            let expected = if a1 == a2 && u1 == u2 {
                HijackCheck::Match
            } else {
                HijackCheck::Mismatch
            };

            prop_assert_eq!(detect(&record, &current), expected);
            // Deterministic and side-effect free
            prop_assert_eq!(detect(&record, &current), expected);
            prop_assert_eq!(record.fingerprint(), Some(&Fingerprint::new(a1, u1)));
        }
    }
}
