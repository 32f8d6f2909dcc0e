use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::session::config::{SESSION_PREFIX, SessionConfig};
use crate::session::errors::SessionError;
use crate::session::types::{
    Fingerprint, HijackCheck, RequestContext, ResumedSession, RotationOutcome, RotationReason,
    SessionRecord, Transition, Validity,
};
use crate::storage::CacheStore;
use crate::utils::redact;

use super::capability::{
    Clock, RandomSource, SystemClock, SystemRandom, rotation_due, seconds_after,
};
use super::fingerprint::extract_fingerprint;
use super::hijack::detect;
use super::record::{LoadedRecord, insert_new_record, load_record, modify_record};
use super::rotation::{Rotation, rotate_session};
use super::validity::evaluate;

/// Decides, once per request, whether the presented session identifier can be
/// trusted, and rotates it when it cannot or when routine rotation is due.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn CacheStore>,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(store: Arc<dyn CacheStore>, config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            clock: Arc::new(SystemClock),
            random: Arc::new(SystemRandom),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Resume the request's session, or start a new one.
    ///
    /// - no record, or an expired one: a fresh record bound to the caller's
    ///   fingerprint under a new identifier
    /// - fingerprint mismatch: data wiped, binding replaced, rotation forced
    /// - otherwise: rotated with the configured probability, else unchanged
    #[tracing::instrument(skip_all)]
    pub async fn resume(&self, ctx: &RequestContext) -> Result<ResumedSession, SessionError> {
        let now = self.clock.now();
        let fingerprint = extract_fingerprint(ctx);
        let inbound_id = ctx.session_id.clone().filter(|id| !id.is_empty());

        let loaded = match inbound_id.as_deref() {
            Some(id) => load_record(self.store.as_ref(), id, now).await?,
            None => None,
        };

        let state = evaluate(loaded.as_ref().map(|l| &l.record), now);
        match (state, inbound_id.as_deref(), loaded) {
            (Validity::Valid, Some(id), Some(loaded)) => {
                self.resume_valid(id, loaded, fingerprint, now, inbound_id.clone())
                    .await
            }
            (state, stale_id, _) => {
                if let (Validity::Expired, Some(id)) = (state, stale_id) {
                    tracing::debug!("Destroying expired session {}", redact(id));
                    self.store.remove(SESSION_PREFIX, id).await?;
                }
                self.start_fresh(state, fingerprint, now, inbound_id.clone())
                    .await
            }
        }
    }

    async fn resume_valid(
        &self,
        id: &str,
        loaded: LoadedRecord,
        fingerprint: Fingerprint,
        now: DateTime<Utc>,
        inbound_id: Option<String>,
    ) -> Result<ResumedSession, SessionError> {
        if detect(&loaded.record, &fingerprint) == HijackCheck::Mismatch {
            tracing::warn!(
                "Fingerprint mismatch on session {}, wiping and rotating",
                redact(id)
            );
            return self.recover_hijacked(id, fingerprint, now, inbound_id).await;
        }

        if !rotation_due(
            self.random.draw_percent()?,
            self.config.rotation_probability_percent,
        ) {
            return Ok(ResumedSession {
                session_id: id.to_string(),
                record: loaded.record,
                transition: Transition::Resumed,
                inbound_id,
            });
        }

        let rotation = rotate_session(self.store.as_ref(), id, now, &self.config).await?;
        match rotation {
            Rotation::Rotated { new_id, record } => Ok(ResumedSession {
                session_id: new_id,
                record,
                transition: Transition::Rotated(RotationReason::Scheduled),
                inbound_id,
            }),
            Rotation::InProgress | Rotation::Contended => Ok(ResumedSession {
                session_id: id.to_string(),
                record: loaded.record,
                transition: Transition::RotationSkipped(RotationReason::Scheduled),
                inbound_id,
            }),
            Rotation::NotFound => {
                self.start_fresh(Validity::Missing, fingerprint, now, inbound_id)
                    .await
            }
        }
    }

    async fn recover_hijacked(
        &self,
        id: &str,
        fingerprint: Fingerprint,
        now: DateTime<Utc>,
        inbound_id: Option<String>,
    ) -> Result<ResumedSession, SessionError> {
        let wiped = modify_record(
            self.store.as_ref(),
            id,
            now,
            self.config.store_ttl(),
            |record| {
                record.wipe_data();
                record.rebind(fingerprint.clone());
            },
        )
        .await?;

        let Some(wiped) = wiped else {
            return self
                .start_fresh(Validity::Missing, fingerprint, now, inbound_id)
                .await;
        };

        let rotation = rotate_session(self.store.as_ref(), id, now, &self.config).await?;
        match rotation {
            Rotation::Rotated { new_id, record } => Ok(ResumedSession {
                session_id: new_id,
                record,
                transition: Transition::Rotated(RotationReason::Hijack),
                inbound_id,
            }),
            Rotation::InProgress | Rotation::Contended => Ok(ResumedSession {
                session_id: id.to_string(),
                record: wiped,
                transition: Transition::RotationSkipped(RotationReason::Hijack),
                inbound_id,
            }),
            Rotation::NotFound => {
                self.start_fresh(Validity::Missing, fingerprint, now, inbound_id)
                    .await
            }
        }
    }

    async fn start_fresh(
        &self,
        state: Validity,
        fingerprint: Fingerprint,
        now: DateTime<Utc>,
        inbound_id: Option<String>,
    ) -> Result<ResumedSession, SessionError> {
        let expires_at = match self.config.lifetime_seconds {
            0 => None,
            lifetime => Some(seconds_after(now, lifetime)?),
        };
        let record = SessionRecord::bound(fingerprint, expires_at);

        let session_id =
            insert_new_record(self.store.as_ref(), &record, self.config.store_ttl()).await?;
        tracing::debug!(
            "Started session {} ({:?} inbound)",
            redact(&session_id),
            state
        );

        Ok(ResumedSession {
            session_id,
            record,
            transition: Transition::Created(state),
            inbound_id,
        })
    }

    /// Look up a record without any trust decision.
    ///
    /// Superseded records whose grace window has closed resolve to `None`.
    pub async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionError> {
        let loaded = load_record(self.store.as_ref(), session_id, self.clock.now()).await?;
        Ok(loaded.map(|l| l.record))
    }

    /// Rotate a session's identifier outside of `resume`.
    pub async fn rotate(&self, session_id: &str) -> Result<RotationOutcome, SessionError> {
        let rotation =
            rotate_session(self.store.as_ref(), session_id, self.clock.now(), &self.config)
                .await?;
        Ok(rotation.into())
    }

    /// Write the caller's data back to the store.
    ///
    /// The stored binding and rotation state are kept; the stored expiry only
    /// ever moves forward. Returns `false` if the session no longer exists.
    pub async fn save(&self, session: &ResumedSession) -> Result<bool, SessionError> {
        let data = &session.record.data;
        let expires_at = session.record.expires_at;

        let saved = modify_record(
            self.store.as_ref(),
            &session.session_id,
            self.clock.now(),
            self.config.store_ttl(),
            |stored| {
                stored.data = data.clone();
                if let Some(at) = expires_at {
                    stored.extend_expiry_to(at);
                }
            },
        )
        .await?;

        if saved.is_none() {
            tracing::debug!(
                "Session {} vanished before save",
                redact(&session.session_id)
            );
        }
        Ok(saved.is_some())
    }

    /// Push the session's expiry to `now + seconds`, never earlier than it already is.
    pub async fn extend_expiry(
        &self,
        session_id: &str,
        seconds: u64,
    ) -> Result<Option<DateTime<Utc>>, SessionError> {
        let now = self.clock.now();
        let target = seconds_after(now, seconds)?;

        let updated = modify_record(
            self.store.as_ref(),
            session_id,
            now,
            self.config.store_ttl(),
            |record| {
                record.extend_expiry_to(target);
            },
        )
        .await?;

        Ok(updated.and_then(|r| r.expires_at))
    }

    /// Remove a session entirely, e.g. on logout.
    pub async fn destroy(&self, session_id: &str) -> Result<(), SessionError> {
        tracing::debug!("Destroying session {}", redact(session_id));
        self.store.remove(SESSION_PREFIX, session_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::main::capability::{FixedRandom, ManualClock};
    use crate::storage::InMemoryCacheStore;
    use chrono::Duration;

    const ADDRESS: &str = "192.0.2.10";
    const AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64)";

    struct Harness {
        manager: SessionManager,
        clock: Arc<ManualClock>,
    }

    fn harness(draw: u8) -> Harness {
        harness_with(Arc::new(FixedRandom(draw)), SessionConfig::default())
    }

    fn harness_with(random: Arc<dyn RandomSource>, config: SessionConfig) -> Harness {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let manager = SessionManager::new(Arc::new(InMemoryCacheStore::new()), config)
            .unwrap()
            .with_clock(clock.clone())
            .with_random(random);
        Harness { manager, clock }
    }

    fn request(session_id: Option<&str>) -> RequestContext {
        let ctx = RequestContext::new()
            .with_client_address(ADDRESS)
            .with_user_agent(AGENT);
        match session_id {
            Some(id) => ctx.with_session_id(id),
            None => ctx,
        }
    }

    /// Start a session and store one value in it.
    async fn established(h: &Harness) -> ResumedSession {
        let mut session = h.manager.resume(&request(None)).await.unwrap();
        session.record.insert("user", "alice").unwrap();
        assert!(h.manager.save(&session).await.unwrap());
        session
    }

    #[tokio::test]
    async fn test_new_session_without_cookie() {
        // Given a request with no identifier
        let h = harness(100);

        // When resuming
        let session = h.manager.resume(&request(None)).await.unwrap();

        // Then a fresh record is bound to the caller, with no expiry
        assert_eq!(session.transition, Transition::Created(Validity::Missing));
        assert_eq!(
            session.record.fingerprint(),
            Some(&Fingerprint::new(ADDRESS, AGENT))
        );
        assert!(session.record.expires_at().is_none());
        assert!(session.record.data.is_empty());
        assert!(session.id_changed());
        assert!(h.manager.load(&session.session_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_identifier_is_not_adopted() {
        // A client-chosen identifier must never become the session id
        let h = harness(100);
        let session = h
            .manager
            .resume(&request(Some("attacker-chosen")))
            .await
            .unwrap();

        assert_eq!(session.transition, Transition::Created(Validity::Missing));
        assert_ne!(session.session_id, "attacker-chosen");
        assert!(session.id_changed());
    }

    #[tokio::test]
    async fn test_valid_session_is_resumed_unchanged() {
        let h = harness(100);
        let first = established(&h).await;

        let second = h
            .manager
            .resume(&request(Some(&first.session_id)))
            .await
            .unwrap();

        assert_eq!(second.transition, Transition::Resumed);
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.record.data, first.record.data);
        assert!(!second.id_changed());
    }

    #[tokio::test]
    async fn test_scheduled_rotation_on_low_draw() {
        // Given a valid, matching session and a draw of 3 against 5%
        let h = harness(3);
        let first = established(&h).await;

        // When resuming
        let second = h
            .manager
            .resume(&request(Some(&first.session_id)))
            .await
            .unwrap();

        // Then the identifier rotates and the data carries over
        assert_eq!(
            second.transition,
            Transition::Rotated(RotationReason::Scheduled)
        );
        assert_ne!(second.session_id, first.session_id);
        assert_eq!(second.record.data, first.record.data);
        assert!(second.id_changed());
    }

    #[tokio::test]
    async fn test_hijack_wipes_rebinds_and_rotates() {
        // Given a session bound to one address, and a draw that would never rotate
        let h = harness(100);
        let first = established(&h).await;

        // When the identifier shows up from another address
        let intruder = RequestContext::new()
            .with_client_address("198.51.100.99")
            .with_user_agent(AGENT)
            .with_session_id(first.session_id.clone());
        let second = h.manager.resume(&intruder).await.unwrap();

        // Then data is wiped, the binding follows the new request and rotation is forced
        assert_eq!(second.transition, Transition::Rotated(RotationReason::Hijack));
        assert_ne!(second.session_id, first.session_id);
        assert!(second.record.data.is_empty());
        assert_eq!(
            second.record.fingerprint(),
            Some(&Fingerprint::new("198.51.100.99", AGENT))
        );

        // And the old identifier no longer exposes the victim's data
        let old = h.manager.load(&first.session_id).await.unwrap().unwrap();
        assert!(old.data.is_empty());
        assert!(old.is_rotating());
    }

    #[tokio::test]
    async fn test_hijack_always_rotates() {
        let h = harness(100);
        for _ in 0..20 {
            let first = established(&h).await;
            let intruder = RequestContext::new()
                .with_client_address(ADDRESS)
                .with_user_agent("curl/8.5.0")
                .with_session_id(first.session_id.clone());

            let second = h.manager.resume(&intruder).await.unwrap();
            assert_eq!(second.transition, Transition::Rotated(RotationReason::Hijack));
        }
    }

    #[tokio::test]
    async fn test_expired_session_is_replaced() {
        // Given a session with an expiry one second in the past
        let h = harness(100);
        let first = established(&h).await;
        h.manager
            .extend_expiry(&first.session_id, 60)
            .await
            .unwrap();
        h.clock.advance(Duration::seconds(61));

        // When resuming it
        let second = h
            .manager
            .resume(&request(Some(&first.session_id)))
            .await
            .unwrap();

        // Then the stale record is discarded and a fresh one created
        assert_eq!(second.transition, Transition::Created(Validity::Expired));
        assert_ne!(second.session_id, first.session_id);
        assert!(second.record.data.is_empty());
        assert!(h.manager.load(&first.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_grace_window_reachability() {
        let h = harness(100);
        let first = established(&h).await;

        // When rotating explicitly
        let outcome = h.manager.rotate(&first.session_id).await.unwrap();
        let RotationOutcome::Rotated { new_id } = outcome else {
            panic!("Expected rotation");
        };

        // Then both identifiers resolve to equivalent records during the grace window
        let old = h.manager.load(&first.session_id).await.unwrap().unwrap();
        let new = h.manager.load(&new_id).await.unwrap().unwrap();
        assert_eq!(old.data, new.data);
        assert_eq!(old.fingerprint(), new.fingerprint());

        h.clock.advance(Duration::seconds(9));
        assert!(h.manager.load(&first.session_id).await.unwrap().is_some());

        // And after it the old identifier is gone while the new one remains
        h.clock.advance(Duration::seconds(1));
        assert!(h.manager.load(&first.session_id).await.unwrap().is_none());
        assert!(h.manager.load(&new_id).await.unwrap().is_some());

        let resumed = h.manager.resume(&request(Some(&first.session_id))).await.unwrap();
        assert_eq!(resumed.transition, Transition::Created(Validity::Missing));
    }

    #[tokio::test]
    async fn test_in_flight_request_on_old_id_does_not_rotate_again() {
        // Given a session that was just rotated
        let h = harness(1);
        let first = established(&h).await;
        let RotationOutcome::Rotated { .. } = h.manager.rotate(&first.session_id).await.unwrap()
        else {
            panic!("Expected rotation");
        };

        // When a request still holding the old id arrives with a draw that wants rotation
        let late = h
            .manager
            .resume(&request(Some(&first.session_id)))
            .await
            .unwrap();

        // Then it resolves to the old record without a second rotation
        assert_eq!(
            late.transition,
            Transition::RotationSkipped(RotationReason::Scheduled)
        );
        assert_eq!(late.session_id, first.session_id);
        assert_eq!(late.record.data, first.record.data);
    }

    #[tokio::test]
    async fn test_extend_expiry_is_monotonic() {
        let h = harness(100);
        let first = established(&h).await;

        let t = h
            .manager
            .extend_expiry(&first.session_id, 600)
            .await
            .unwrap()
            .unwrap();

        // A shorter extension does not rewind
        let again = h
            .manager
            .extend_expiry(&first.session_id, 60)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again, t);

        // Nor does saving a stale copy without an expiry
        assert!(h.manager.save(&first).await.unwrap());
        let stored = h.manager.load(&first.session_id).await.unwrap().unwrap();
        assert_eq!(stored.expires_at(), Some(t));

        // A longer one moves it forward
        let later = h
            .manager
            .extend_expiry(&first.session_id, 1200)
            .await
            .unwrap()
            .unwrap();
        assert!(later > t);
    }

    #[tokio::test]
    async fn test_extend_expiry_out_of_range() {
        // Given a session with a one-minute expiry
        let h = harness(100);
        let first = established(&h).await;
        let expiry = h
            .manager
            .extend_expiry(&first.session_id, 60)
            .await
            .unwrap();

        // When asking for an extension beyond the representable range
        for seconds in [1_000_000_000_000_000, u64::MAX] {
            let result = h.manager.extend_expiry(&first.session_id, seconds).await;

            // Then it is refused without touching the record
            assert!(matches!(result, Err(SessionError::Config(_))));
        }
        let stored = h.manager.load(&first.session_id).await.unwrap().unwrap();
        assert_eq!(stored.expires_at(), expiry);
        assert_eq!(stored.data, first.record.data);
    }

    #[tokio::test]
    async fn test_lifetime_sets_expiry_on_new_sessions() {
        let h = harness_with(
            Arc::new(FixedRandom(100)),
            SessionConfig::default().with_lifetime_seconds(3600),
        );
        let now = h.clock.now();

        let session = h.manager.resume(&request(None)).await.unwrap();

        assert_eq!(
            session.record.expires_at(),
            Some(now + Duration::seconds(3600))
        );
    }

    #[tokio::test]
    async fn test_save_missing_session() {
        let h = harness(100);
        let session = ResumedSession {
            session_id: "gone".to_string(),
            record: SessionRecord::default(),
            transition: Transition::Resumed,
            inbound_id: Some("gone".to_string()),
        };
        assert!(!h.manager.save(&session).await.unwrap());
    }

    #[tokio::test]
    async fn test_destroy() {
        let h = harness(100);
        let first = established(&h).await;

        h.manager.destroy(&first.session_id).await.unwrap();

        assert!(h.manager.load(&first.session_id).await.unwrap().is_none());
        let next = h
            .manager
            .resume(&request(Some(&first.session_id)))
            .await
            .unwrap();
        assert_eq!(next.transition, Transition::Created(Validity::Missing));
    }

    #[tokio::test]
    async fn test_missing_signals_still_resume() {
        // A request without address or agent still gets a session, and keeps it
        let h = harness(100);
        let first = h.manager.resume(&RequestContext::new()).await.unwrap();
        let second = h
            .manager
            .resume(&RequestContext::new().with_session_id(first.session_id.clone()))
            .await
            .unwrap();

        assert_eq!(second.transition, Transition::Resumed);
        assert_eq!(second.session_id, first.session_id);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = SessionManager::new(
            Arc::new(InMemoryCacheStore::new()),
            SessionConfig::default().with_rotation_probability(150),
        );
        assert!(matches!(result, Err(SessionError::Config(_))));
    }
}
