use chrono::{DateTime, Utc};

use crate::session::config::{
    ROTATION_CAS_ATTEMPTS, SESSION_ID_BYTES, SESSION_ID_COLLISION_ATTEMPTS, SESSION_PREFIX,
};
use crate::session::errors::SessionError;
use crate::session::types::SessionRecord;
use crate::storage::{CacheData, CacheStore};
use crate::utils::{gen_random_string, redact};

/// A decoded record together with the exact bytes it was read from, so a
/// later compare-and-swap can detect concurrent writers.
#[derive(Debug, Clone)]
pub(crate) struct LoadedRecord {
    pub(crate) raw: CacheData,
    pub(crate) record: SessionRecord,
}

/// Read a record, sweeping it if its grace window has closed or it cannot be decoded.
pub(crate) async fn load_record(
    store: &dyn CacheStore,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<LoadedRecord>, SessionError> {
    let Some(raw) = store.get(SESSION_PREFIX, session_id).await? else {
        return Ok(None);
    };

    let record = match SessionRecord::try_from(&raw) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(
                "Discarding undecodable session record {}: {}",
                redact(session_id),
                e
            );
            store.remove(SESSION_PREFIX, session_id).await?;
            return Ok(None);
        }
    };

    if record.rotation.is_some_and(|r| r.grace_deadline <= now) {
        tracing::debug!(
            "Grace window closed for superseded session {}",
            redact(session_id)
        );
        store.remove(SESSION_PREFIX, session_id).await?;
        return Ok(None);
    }

    Ok(Some(LoadedRecord { raw, record }))
}

/// Store `record` under a freshly generated identifier and return it.
pub(crate) async fn insert_new_record(
    store: &dyn CacheStore,
    record: &SessionRecord,
    ttl: usize,
) -> Result<String, SessionError> {
    let data = CacheData::try_from(record)?;

    for attempt in 1..=SESSION_ID_COLLISION_ATTEMPTS {
        let session_id = gen_random_string(SESSION_ID_BYTES)?;

        if store
            .put_if_not_exists(SESSION_PREFIX, &session_id, data.clone(), ttl)
            .await?
        {
            return Ok(session_id);
        }

        tracing::debug!(
            "Collision detected on attempt {} for generated session id, retrying...",
            attempt
        );
    }

    Err(SessionError::Crypto(format!(
        "Failed to allocate a unique session id after {SESSION_ID_COLLISION_ATTEMPTS} attempts"
    )))
}

/// TTL for writing `record` back: the remaining grace window for a superseded
/// record, the idle timeout otherwise.
pub(crate) fn ttl_for(record: &SessionRecord, now: DateTime<Utc>, live_ttl: usize) -> usize {
    match record.rotation {
        Some(rotation) if rotation.in_progress => {
            let remaining = (rotation.grace_deadline - now).num_seconds();
            remaining.max(1) as usize
        }
        _ => live_ttl,
    }
}

/// Apply `update` to the stored record with compare-and-swap, retrying when
/// another writer got there first. Returns the record as written, or `None`
/// if there is nothing stored under the identifier.
pub(crate) async fn modify_record<F>(
    store: &dyn CacheStore,
    session_id: &str,
    now: DateTime<Utc>,
    live_ttl: usize,
    mut update: F,
) -> Result<Option<SessionRecord>, SessionError>
where
    F: FnMut(&mut SessionRecord),
{
    for attempt in 1..=ROTATION_CAS_ATTEMPTS {
        let Some(loaded) = load_record(store, session_id, now).await? else {
            return Ok(None);
        };

        let mut record = loaded.record;
        update(&mut record);

        let ttl = ttl_for(&record, now, live_ttl);
        let data = CacheData::try_from(&record)?;
        if store
            .compare_and_swap(SESSION_PREFIX, session_id, &loaded.raw, data, ttl)
            .await?
        {
            return Ok(Some(record));
        }

        tracing::debug!(
            "Session {} changed concurrently on attempt {}, retrying update",
            redact(session_id),
            attempt
        );
    }

    Err(SessionError::StoreUnavailable(format!(
        "session {} kept changing during update",
        redact(session_id)
    )))
}
