//! Provider API quota cooldown.
//!
//! Pollers that call provider REST APIs report the quota headers they see
//! here; when remaining quota drops below the threshold, the gate asks
//! callers to pause until the provider's stated reset time. State is owned
//! by the gate instance, so each provider connection gets its own cooldown
//! and tests construct gates freely.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

/// Remaining-request threshold below which polling pauses.
pub const DEFAULT_QUOTA_THRESHOLD: u64 = 10;

/// Tracks one provider's remaining API quota.
#[derive(Debug)]
pub struct QuotaGate {
    threshold: u64,
    pause_until: Mutex<Option<Instant>>,
}

impl QuotaGate {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_QUOTA_THRESHOLD)
    }

    pub fn with_threshold(threshold: u64) -> Self {
        QuotaGate {
            threshold,
            pause_until: Mutex::new(None),
        }
    }

    /// Records the quota headers from a provider response. Starts a
    /// cooldown lasting `reset_after` when `remaining` is below the
    /// threshold.
    pub fn record_quota(&self, remaining: u64, reset_after: Duration) {
        if remaining >= self.threshold {
            return;
        }
        let until = Instant::now() + reset_after;
        let mut pause = self.pause_until.lock().expect("quota gate poisoned");
        // A later reset extends the pause; an earlier one never shortens it.
        if pause.is_none_or(|existing| until > existing) {
            warn!(
                remaining,
                pause_secs = reset_after.as_secs(),
                "provider quota low, pausing polling"
            );
            *pause = Some(until);
        }
    }

    /// True while a cooldown is in effect. Expired cooldowns clear on read.
    pub fn should_pause(&self) -> bool {
        let mut pause = self.pause_until.lock().expect("quota gate poisoned");
        match *pause {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                *pause = None;
                false
            }
            None => false,
        }
    }

    /// Clears any active cooldown.
    pub fn reset(&self) {
        *self.pause_until.lock().expect("quota gate poisoned") = None;
    }
}

impl Default for QuotaGate {
    fn default() -> Self {
        Self::new()
    }
}
