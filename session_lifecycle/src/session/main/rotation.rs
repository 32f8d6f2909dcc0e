use chrono::{DateTime, Utc};

use crate::session::config::{ROTATION_CAS_ATTEMPTS, SESSION_PREFIX, SessionConfig};
use crate::session::errors::SessionError;
use crate::session::types::{RotationMarker, RotationOutcome, SessionRecord};
use crate::storage::{CacheData, CacheStore};
use crate::utils::redact;

use super::capability::seconds_after;
use super::record::{insert_new_record, load_record};

/// Rotation result carrying the successor record, for callers that go on to
/// use it within the same request.
#[derive(Debug, Clone)]
pub(crate) enum Rotation {
    Rotated {
        new_id: String,
        record: SessionRecord,
    },
    InProgress,
    Contended,
    NotFound,
}

impl From<Rotation> for RotationOutcome {
    fn from(rotation: Rotation) -> Self {
        match rotation {
            Rotation::Rotated { new_id, .. } => RotationOutcome::Rotated { new_id },
            Rotation::InProgress => RotationOutcome::InProgress,
            Rotation::Contended => RotationOutcome::Contended,
            Rotation::NotFound => RotationOutcome::NotFound,
        }
    }
}

/// Supersede `old_id` with a new identifier for the same session.
///
/// The old record is marked as rotating with a compare-and-swap against the
/// exact bytes that were read; only the caller that wins the swap issues a new
/// identifier. Everyone else observes the marker and does nothing. The old
/// record stays readable until its grace deadline, enforced both by the store
/// TTL and by the sweep in [`load_record`].
#[tracing::instrument(skip(store, old_id, config), fields(session = %redact(old_id)))]
pub(crate) async fn rotate_session(
    store: &dyn CacheStore,
    old_id: &str,
    now: DateTime<Utc>,
    config: &SessionConfig,
) -> Result<Rotation, SessionError> {
    let grace_deadline = seconds_after(now, config.grace_seconds)?;

    for attempt in 1..=ROTATION_CAS_ATTEMPTS {
        let Some(loaded) = load_record(store, old_id, now).await? else {
            tracing::debug!("Nothing to rotate");
            return Ok(Rotation::NotFound);
        };

        if loaded.record.is_rotating() {
            tracing::debug!("Rotation already in progress, skipping");
            return Ok(Rotation::InProgress);
        }

        let mut superseded = loaded.record.clone();
        superseded.rotation = Some(RotationMarker {
            in_progress: true,
            grace_deadline,
        });

        let claim = CacheData::try_from(&superseded)?;
        let claimed = store
            .compare_and_swap(
                SESSION_PREFIX,
                old_id,
                &loaded.raw,
                claim.clone(),
                config.grace_seconds as usize,
            )
            .await?;

        if !claimed {
            tracing::debug!("Lost rotation claim on attempt {}, re-reading", attempt);
            continue;
        }

        let mut successor = loaded.record;
        successor.rotation = None;
        let new_id = match insert_new_record(store, &successor, config.store_ttl()).await {
            Ok(new_id) => new_id,
            Err(e) => {
                release_claim(store, old_id, &claim, loaded.raw, config).await;
                return Err(e);
            }
        };

        tracing::info!(
            "Rotated session {} -> {}, old id valid until {}",
            redact(old_id),
            redact(&new_id),
            grace_deadline
        );

        return Ok(Rotation::Rotated {
            new_id,
            record: successor,
        });
    }

    tracing::warn!("Giving up rotation after {} contended attempts", ROTATION_CAS_ATTEMPTS);
    Ok(Rotation::Contended)
}

/// Put the pre-rotation record back after a claim that produced no successor,
/// so the session stays usable and a later request can rotate it again.
async fn release_claim(
    store: &dyn CacheStore,
    old_id: &str,
    claim: &CacheData,
    original: CacheData,
    config: &SessionConfig,
) {
    match store
        .compare_and_swap(SESSION_PREFIX, old_id, claim, original, config.store_ttl())
        .await
    {
        Ok(true) => tracing::debug!("Released rotation claim after failed successor insert"),
        Ok(false) => tracing::warn!("Rotation claim changed before it could be released"),
        Err(e) => tracing::error!("Failed to release rotation claim: {}", e),
    }
}
