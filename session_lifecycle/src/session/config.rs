use std::env;
use std::sync::LazyLock;

use crate::session::errors::SessionError;

pub(super) const SESSION_PREFIX: &str = "session";
pub(super) const SESSION_ID_BYTES: usize = 32;
pub(super) const SESSION_ID_COLLISION_ATTEMPTS: usize = 3;
pub(super) const ROTATION_CAS_ATTEMPTS: usize = 5;

/// Upper bound for every configured duration: ten years.
pub(super) const MAX_CONFIG_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

pub static SESSION_COOKIE_NAME: LazyLock<String> = LazyLock::new(|| {
    env::var("SESSION_COOKIE_NAME")
        .ok()
        .unwrap_or("SessionId".to_string())
});

static SESSION_GRACE_SECONDS: LazyLock<u64> =
    LazyLock::new(|| parse_env("SESSION_GRACE_SECONDS", 10));

static SESSION_ROTATION_PROBABILITY: LazyLock<u8> =
    LazyLock::new(|| parse_env("SESSION_ROTATION_PROBABILITY", 5));

static SESSION_COOKIE_PATH: LazyLock<String> =
    LazyLock::new(|| env::var("SESSION_COOKIE_PATH").unwrap_or_else(|_| "/".to_string()));

static SESSION_COOKIE_DOMAIN: LazyLock<Option<String>> = LazyLock::new(|| {
    env::var("SESSION_COOKIE_DOMAIN")
        .ok()
        .filter(|d| !d.is_empty())
});

static SESSION_COOKIE_HTTP_ONLY: LazyLock<bool> =
    LazyLock::new(|| parse_env("SESSION_COOKIE_HTTP_ONLY", true));

static SESSION_IDLE_TIMEOUT: LazyLock<u64> =
    LazyLock::new(|| parse_env("SESSION_IDLE_TIMEOUT", 1440));

static SESSION_LIFETIME: LazyLock<u64> = LazyLock::new(|| parse_env("SESSION_LIFETIME", 0));

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Tunables for the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Name of the cookie carrying the session identifier
    pub cookie_name: String,
    /// How long a superseded identifier keeps resolving after rotation
    pub grace_seconds: u64,
    /// Chance, in percent, that a healthy session is rotated on a request
    pub rotation_probability_percent: u8,
    pub cookie_path: String,
    /// `None` means the domain of the inbound request host
    pub cookie_domain: Option<String>,
    pub http_only: bool,
    /// Store-side TTL applied on every write of a live record
    pub idle_timeout_seconds: u64,
    /// When non-zero, fresh sessions get an absolute expiry this far out
    pub lifetime_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "SessionId".to_string(),
            grace_seconds: 10,
            rotation_probability_percent: 5,
            cookie_path: "/".to_string(),
            cookie_domain: None,
            http_only: true,
            idle_timeout_seconds: 1440,
            lifetime_seconds: 0,
        }
    }
}

impl SessionConfig {
    /// Build a configuration from `SESSION_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            cookie_name: SESSION_COOKIE_NAME.clone(),
            grace_seconds: *SESSION_GRACE_SECONDS,
            rotation_probability_percent: *SESSION_ROTATION_PROBABILITY,
            cookie_path: SESSION_COOKIE_PATH.clone(),
            cookie_domain: SESSION_COOKIE_DOMAIN.clone(),
            http_only: *SESSION_COOKIE_HTTP_ONLY,
            idle_timeout_seconds: *SESSION_IDLE_TIMEOUT,
            lifetime_seconds: *SESSION_LIFETIME,
        }
    }

    pub fn with_grace_seconds(mut self, grace_seconds: u64) -> Self {
        self.grace_seconds = grace_seconds;
        self
    }

    pub fn with_rotation_probability(mut self, percent: u8) -> Self {
        self.rotation_probability_percent = percent;
        self
    }

    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    pub fn with_lifetime_seconds(mut self, lifetime_seconds: u64) -> Self {
        self.lifetime_seconds = lifetime_seconds;
        self
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.rotation_probability_percent > 100 {
            return Err(SessionError::Config(format!(
                "rotation probability must be within 0..=100, got {}",
                self.rotation_probability_percent
            )));
        }
        if self.grace_seconds == 0 {
            return Err(SessionError::Config(
                "grace window must be at least one second".to_string(),
            ));
        }
        for (name, seconds) in [
            ("grace window", self.grace_seconds),
            ("idle timeout", self.idle_timeout_seconds),
            ("lifetime", self.lifetime_seconds),
        ] {
            if seconds > MAX_CONFIG_SECONDS {
                return Err(SessionError::Config(format!(
                    "{name} must be at most {MAX_CONFIG_SECONDS} seconds, got {seconds}"
                )));
            }
        }
        if self.cookie_path.is_empty() {
            return Err(SessionError::Config("cookie path must not be empty".to_string()));
        }
        if self.cookie_name.is_empty() {
            return Err(SessionError::Config("cookie name must not be empty".to_string()));
        }
        Ok(())
    }

    /// TTL handed to the store for live records; never shorter than the grace window.
    pub(super) fn store_ttl(&self) -> usize {
        self.idle_timeout_seconds.max(self.grace_seconds) as usize
    }
}
