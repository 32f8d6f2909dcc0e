use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;

use crate::session::errors::SessionError;

/// Caller-owned session values. Never interpreted by the lifecycle layer.
pub type SessionData = BTreeMap<String, serde_json::Value>;

/// Low-entropy client signals a session is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub client_address: String,
    pub user_agent: String,
}

impl Fingerprint {
    pub fn new(client_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            client_address: client_address.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// What the transport layer knows about the inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub client_address: Option<String>,
    pub user_agent: Option<String>,
    /// Identifier presented by the client, if any
    pub session_id: Option<String>,
    /// Request host, used when no cookie domain is configured
    pub host: Option<String>,
    /// Whether the request arrived over a secure transport
    pub secure: bool,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client_address(mut self, address: impl Into<String>) -> Self {
        self.client_address = Some(address.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

/// Present on a record only while it is being superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationMarker {
    pub in_progress: bool,
    pub grace_deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub(crate) fingerprint: Option<Fingerprint>,
    #[serde(default)]
    pub(crate) expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) rotation: Option<RotationMarker>,
    #[serde(default)]
    pub data: SessionData,
}

impl SessionRecord {
    /// A fresh record bound to `fingerprint` with no data.
    pub fn bound(fingerprint: Fingerprint, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            fingerprint: Some(fingerprint),
            expires_at,
            rotation: None,
            data: SessionData::new(),
        }
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn rotation(&self) -> Option<&RotationMarker> {
        self.rotation.as_ref()
    }

    pub fn is_rotating(&self) -> bool {
        self.rotation.is_some_and(|r| r.in_progress)
    }

    /// Replace the binding with a new fingerprint, both components at once.
    pub(crate) fn rebind(&mut self, fingerprint: Fingerprint) {
        self.fingerprint = Some(fingerprint);
    }

    pub(crate) fn wipe_data(&mut self) {
        self.data.clear();
    }

    /// Move the expiry to `at` unless that would bring it earlier.
    /// Returns whether the expiry changed.
    pub(crate) fn extend_expiry_to(&mut self, at: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(current) if current >= at => false,
            _ => {
                self.expires_at = Some(at);
                true
            }
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionError> {
        self.data
            .get(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(SessionError::from)
    }

    pub fn insert<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<(), SessionError> {
        self.data.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.data.remove(key)
    }
}

/// Outcome of the validity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Missing,
    Expired,
    Valid,
}

/// Outcome of comparing a record's binding with the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HijackCheck {
    Match,
    Mismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    /// Fingerprint mismatch; rotation is unconditional
    Hijack,
    /// Routine probabilistic rotation
    Scheduled,
}

/// What `resume` did with the inbound identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A new session replaced a missing or expired one
    Created(Validity),
    /// The existing session was kept as-is
    Resumed,
    Rotated(RotationReason),
    /// Rotation was due but another rotation of this record is in flight,
    /// or the record was contended
    RotationSkipped(RotationReason),
}

/// Result of a rotation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    Rotated { new_id: String },
    /// The record is already being rotated; nothing was changed
    InProgress,
    /// Concurrent writers kept changing the record; nothing was changed
    Contended,
    /// No record exists under the identifier
    NotFound,
}

/// A session the caller can trust for the rest of the request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumedSession {
    pub session_id: String,
    pub record: SessionRecord,
    pub transition: Transition,
    /// Identifier the client presented, if any
    pub inbound_id: Option<String>,
}

impl ResumedSession {
    /// Whether the transport must send the identifier back to the client.
    pub fn id_changed(&self) -> bool {
        self.inbound_id.as_deref() != Some(self.session_id.as_str())
    }
}
