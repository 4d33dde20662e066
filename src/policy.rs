//! Sync policy
//!
//! Decides whether a sync should run now. The decision depends only on the
//! inputs: current time, last successful sync, whether the day pack changed
//! and whether the user forced it. Hours are read in the time zone of `now`,
//! while elapsed time is true wall-clock duration, so a window spanning
//! midnight measures correctly.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use log::info;

use crate::config::SyncPolicyConfig;
use crate::error::SyncError;

/// Why a sync was allowed or refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// Requested explicitly
    Forced,
    /// No previous sync on record
    NeverSynced,
    /// Minimum interval for the current window has passed
    IntervalElapsed,
    /// Content changed and the configuration lets that skip the gate
    ContentChanged,
    /// Gate still closed for `remaining`
    TooSoon { remaining: Duration },
}

impl SyncDecision {
    pub fn should_sync(&self) -> bool {
        !matches!(self, SyncDecision::TooSoon { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDecision::Forced => "forced",
            SyncDecision::NeverSynced => "never_synced",
            SyncDecision::IntervalElapsed => "interval_elapsed",
            SyncDecision::ContentChanged => "content_changed",
            SyncDecision::TooSoon { .. } => "too_soon",
        }
    }
}

/// Time-of-day aware sync gate
#[derive(Debug, Clone, Default)]
pub struct SyncPolicy {
    config: SyncPolicyConfig,
}

impl SyncPolicy {
    pub fn new(config: SyncPolicyConfig) -> Result<Self, SyncError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SyncPolicyConfig {
        &self.config
    }

    /// Whether a local hour falls in the night window.
    pub fn is_night_hour(&self, hour: u32) -> bool {
        let day = self.config.day_start_hour;
        let night = self.config.night_start_hour;
        if day < night {
            hour < day || hour >= night
        } else {
            hour >= night && hour < day
        }
    }

    /// Minimum spacing between syncs for the window containing `now`.
    pub fn interval_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Duration {
        let minutes = if self.is_night_hour(now.hour()) {
            self.config.night_interval_minutes
        } else {
            self.config.day_interval_minutes
        };
        Duration::minutes(minutes as i64)
    }

    /// Decide and explain.
    pub fn evaluate<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        last_sync: Option<DateTime<Utc>>,
        content_changed: bool,
        force: bool,
    ) -> SyncDecision {
        let decision = self.decide(now, last_sync, content_changed, force);
        info!(
            "sync decision: {} (content_changed={}, force={})",
            decision.as_str(),
            content_changed,
            force
        );
        decision
    }

    pub fn should_sync<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        last_sync: Option<DateTime<Utc>>,
        content_changed: bool,
        force: bool,
    ) -> bool {
        self.evaluate(now, last_sync, content_changed, force)
            .should_sync()
    }

    /// Earliest time the interval gate opens; `now` when never synced.
    pub fn next_sync_time<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        last_sync: Option<DateTime<Utc>>,
    ) -> DateTime<Utc> {
        match last_sync {
            Some(last) => last + self.interval_at(now),
            None => now.with_timezone(&Utc),
        }
    }

    /// Whether a device refresh request at `now` may force a sync, given
    /// the last request that was let through.
    pub fn allow_refresh_request(
        &self,
        now: DateTime<Utc>,
        last_refresh: Option<DateTime<Utc>>,
    ) -> bool {
        let min_interval = Duration::seconds(self.config.refresh_min_interval_secs as i64);
        match last_refresh {
            Some(last) => now - last >= min_interval,
            None => true,
        }
    }

    fn decide<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        last_sync: Option<DateTime<Utc>>,
        content_changed: bool,
        force: bool,
    ) -> SyncDecision {
        if force {
            return SyncDecision::Forced;
        }
        let Some(last) = last_sync else {
            return SyncDecision::NeverSynced;
        };
        if content_changed && self.config.content_change_bypasses_interval {
            return SyncDecision::ContentChanged;
        }

        let elapsed = now.with_timezone(&Utc) - last;
        let interval = self.interval_at(now);
        if elapsed >= interval {
            SyncDecision::IntervalElapsed
        } else {
            SyncDecision::TooSoon {
                remaining: interval - elapsed,
            }
        }
    }
}
