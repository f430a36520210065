//! Inactivity monitor: a two-phase watchdog over the last-activity instant.
//!
//! Phases:
//! - `Active` while idle time is below the threshold.
//! - `Expiring` for the warning duration once the threshold is crossed.
//! - `Expired` afterwards.
//!
//! Once expiring, new activity is ignored: the sign-out is already decided
//! and the warning screen is only shown before the redirect.

use crate::session::clock::duration_ms;
use log::info;
use std::time::Duration;

/// Input events the client reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Pointer,
    Keyboard,
    Scroll,
    Touch,
    /// Window focus changes. Not a user action.
    Focus,
}

impl ActivityKind {
    /// Whether the event resets the inactivity timer.
    pub fn qualifies(self) -> bool {
        !matches!(self, Self::Focus)
    }
}

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Active { idle: Duration },
    Expiring { remaining: Duration },
    Expired,
}

#[derive(Debug, Clone)]
pub struct InactivityMonitor {
    threshold: Duration,
    warning: Duration,
    last_activity_ms: i64,
    expiring_since_ms: Option<i64>,
}

impl InactivityMonitor {
    pub fn new(threshold: Duration, warning: Duration, started_at_ms: i64) -> Self {
        Self {
            threshold,
            warning,
            last_activity_ms: started_at_ms,
            expiring_since_ms: None,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn warning(&self) -> Duration {
        self.warning
    }

    pub fn last_activity_ms(&self) -> i64 {
        self.last_activity_ms
    }

    /// Records an input event. Returns whether it reset the idle timer.
    pub fn record_activity(&mut self, kind: ActivityKind, now_ms: i64) -> bool {
        if !kind.qualifies() || self.expiring_since_ms.is_some() {
            return false;
        }
        if now_ms > self.last_activity_ms {
            self.last_activity_ms = now_ms;
        }
        true
    }

    /// Evaluates the phase at `now_ms`, entering `Expiring` when due.
    pub fn poll(&mut self, now_ms: i64) -> WatchState {
        if self.expiring_since_ms.is_none() {
            let idle = elapsed(self.last_activity_ms, now_ms);
            if idle < self.threshold {
                return WatchState::Active { idle };
            }
            // The warning phase starts at the threshold crossing, not at the
            // poll that noticed it.
            let crossed_at = self
                .last_activity_ms
                .saturating_add(duration_ms(self.threshold));
            self.expiring_since_ms = Some(crossed_at);
            info!(
                "event=session_expiring module=session idle_ms={} warning_ms={}",
                idle.as_millis(),
                self.warning.as_millis()
            );
        }

        let since = self.expiring_since_ms.unwrap_or(now_ms);
        let in_warning = elapsed(since, now_ms);
        if in_warning >= self.warning {
            WatchState::Expired
        } else {
            WatchState::Expiring {
                remaining: self.warning - in_warning,
            }
        }
    }
}

fn elapsed(from_ms: i64, to_ms: i64) -> Duration {
    Duration::from_millis(to_ms.saturating_sub(from_ms).max(0) as u64)
}
