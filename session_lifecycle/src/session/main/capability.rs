//! Clock and randomness, injected so that expiry and rotation decisions can
//! be replayed deterministically.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::session::errors::SessionError;
use crate::utils::random_bytes;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Draws used for probabilistic rotation.
pub trait RandomSource: Send + Sync {
    /// A uniformly distributed integer in `1..=100`.
    fn draw_percent(&self) -> Result<u8, SessionError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRandom;

impl RandomSource for SystemRandom {
    fn draw_percent(&self) -> Result<u8, SessionError> {
        loop {
            let [byte] = random_bytes::<1>()?;
            // 200 is the largest multiple of 100 below 256; rejecting the rest keeps the draw unbiased
            if byte < 200 {
                return Ok(byte % 100 + 1);
            }
        }
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Always draws the same value.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub u8);

impl RandomSource for FixedRandom {
    fn draw_percent(&self) -> Result<u8, SessionError> {
        Ok(self.0)
    }
}

/// Replays a fixed list of draws, then repeats the last one.
#[derive(Debug)]
pub struct SequenceRandom {
    draws: Mutex<VecDeque<u8>>,
    last: u8,
}

impl SequenceRandom {
    pub fn new(draws: impl IntoIterator<Item = u8>) -> Self {
        let draws: VecDeque<u8> = draws.into_iter().collect();
        let last = draws.back().copied().unwrap_or(100);
        Self {
            draws: Mutex::new(draws),
            last,
        }
    }
}

impl RandomSource for SequenceRandom {
    fn draw_percent(&self) -> Result<u8, SessionError> {
        let mut draws = self.draws.lock().unwrap_or_else(|e| e.into_inner());
        Ok(draws.pop_front().unwrap_or(self.last))
    }
}

/// `now + seconds`, or a `Config` error when the result leaves chrono's range.
pub(crate) fn seconds_after(
    now: DateTime<Utc>,
    seconds: u64,
) -> Result<DateTime<Utc>, SessionError> {
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|offset| now.checked_add_signed(offset))
        .ok_or_else(|| {
            SessionError::Config(format!("{seconds} seconds from {now} is out of range"))
        })
}

/// Whether a draw falls inside the configured rotation probability.
pub(crate) fn rotation_due(draw: u8, probability_percent: u8) -> bool {
    draw <= probability_percent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_random_range() {
        let random = SystemRandom;
        for _ in 0..1_000 {
            let draw = random.draw_percent().unwrap();
            assert!((1..=100).contains(&draw), "draw out of range: {draw}");
        }
    }

    #[test]
    fn test_rotation_due_boundaries() {
        assert!(rotation_due(1, 5));
        assert!(rotation_due(5, 5));
        assert!(!rotation_due(6, 5));
        // Zero disables routine rotation entirely
        assert!(!rotation_due(1, 0));
        // A hundred rotates on every draw
        assert!(rotation_due(100, 100));
    }

    #[test]
    fn test_rotation_probability_over_many_draws() {
        // Given the default 5% probability and the system random source
        let random = SystemRandom;
        let trials = 20_000;

        // When drawing many times
        let hits = (0..trials)
            .filter(|_| rotation_due(random.draw_percent().unwrap(), 5))
            .count();

        // Then the observed rate is within tolerance of 5%
        let rate = hits as f64 / trials as f64;
        assert!((0.035..=0.065).contains(&rate), "observed rate {rate}");
    }

    #[test]
    fn test_seconds_after() {
        let now = Utc::now();
        assert_eq!(seconds_after(now, 10).unwrap(), now + Duration::seconds(10));
        assert_eq!(seconds_after(now, 0).unwrap(), now);
    }

    #[test]
    fn test_seconds_after_out_of_range() {
        // Neither the duration nor the resulting timestamp may overflow
        let now = Utc::now();
        for seconds in [1_000_000_000_000_000, u64::MAX / 2, u64::MAX] {
            assert!(matches!(
                seconds_after(now, seconds),
                Err(SessionError::Config(_))
            ));
        }
    }

    #[test]
    fn test_manual_clock() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::seconds(11));
        assert_eq!(clock.now(), start + Duration::seconds(11));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_sequence_random_repeats_last() {
        let random = SequenceRandom::new([3, 50]);
        assert_eq!(random.draw_percent().unwrap(), 3);
        assert_eq!(random.draw_percent().unwrap(), 50);
        assert_eq!(random.draw_percent().unwrap(), 50);
    }
}
