//! Fixed-window request quotas for provider calls
//!
//! Two counters: a short window (per minute by default) and a daily window.
//! Windows roll over lazily on the next check once their length has elapsed.

use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::config::RateLimitConfig;

/// Back-off applied when the provider throttles us
const PROVIDER_THROTTLE_BACKOFF: TimeDelta = TimeDelta::minutes(1);

/// Back-off applied when the provider reports quota exhaustion
const PROVIDER_QUOTA_BACKOFF: TimeDelta = TimeDelta::hours(1);

/// Which quota denied the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitReason {
    Minute,
    Daily,
}

/// Outcome of a quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub limited: bool,
    pub reason: Option<LimitReason>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitDecision {
    const fn allowed() -> Self {
        Self {
            limited: false,
            reason: None,
            reset_at: None,
        }
    }

    const fn denied(reason: LimitReason, reset_at: DateTime<Utc>) -> Self {
        Self {
            limited: true,
            reason: Some(reason),
            reset_at: Some(reset_at),
        }
    }
}

/// Counter state, exposed read-only through [`RateLimiter::snapshot`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitState {
    pub requests_in_window: u32,
    pub requests_today: u32,
    pub window_start: DateTime<Utc>,
    pub day_start: DateTime<Utc>,
    pub limited: bool,
    pub limit_reason: Option<LimitReason>,
    pub reset_at: Option<DateTime<Utc>>,
    pub daily_quota_exceeded: bool,
    /// Set when the provider itself throttled us; requests wait until then
    pub provider_backoff_until: Option<DateTime<Utc>>,
}

impl RateLimitState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            requests_in_window: 0,
            requests_today: 0,
            window_start: now,
            day_start: now,
            limited: false,
            limit_reason: None,
            reset_at: None,
            daily_quota_exceeded: false,
            provider_backoff_until: None,
        }
    }
}

/// Process-wide quota tracker
#[derive(Debug)]
pub struct RateLimiter {
    per_minute: u32,
    per_day: u32,
    window: TimeDelta,
    day: TimeDelta,
    state: Mutex<RateLimitState>,
}

impl RateLimiter {
    /// Create a limiter whose windows start now
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self::starting_at(config, Utc::now())
    }

    /// Create a limiter whose windows start at `now`
    #[must_use]
    pub fn starting_at(config: RateLimitConfig, now: DateTime<Utc>) -> Self {
        Self {
            per_minute: config.requests_per_minute,
            per_day: config.requests_per_day,
            window: TimeDelta::from_std(config.window).unwrap_or(TimeDelta::MAX),
            day: TimeDelta::from_std(config.day).unwrap_or(TimeDelta::MAX),
            state: Mutex::new(RateLimitState::new(now)),
        }
    }

    /// Count one request against both quotas
    pub fn check_and_consume(&self) -> RateLimitDecision {
        self.check_and_consume_at(Utc::now())
    }

    /// Count one request against both quotas at the given instant
    pub fn check_and_consume_at(&self, now: DateTime<Utc>) -> RateLimitDecision {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if now - state.window_start > self.window {
            state.requests_in_window = 0;
            state.window_start = now;
            if !state.daily_quota_exceeded {
                state.limited = false;
            }
        }

        if now - state.day_start > self.day {
            state.requests_today = 0;
            state.day_start = now;
            state.daily_quota_exceeded = false;
            state.limited = false;
        }

        if let Some(until) = state.provider_backoff_until {
            if now < until {
                let reason = if state.daily_quota_exceeded {
                    LimitReason::Daily
                } else {
                    LimitReason::Minute
                };
                tracing::debug!(%until, "provider back-off in effect");
                return RateLimitDecision::denied(reason, until);
            }
            state.provider_backoff_until = None;
            if state.requests_today <= self.per_day {
                state.daily_quota_exceeded = false;
                state.limited = false;
                state.limit_reason = None;
                state.reset_at = None;
            }
        }

        state.requests_in_window = state.requests_in_window.saturating_add(1);
        state.requests_today = state.requests_today.saturating_add(1);

        if state.requests_in_window > self.per_minute {
            let reset_at = state.window_start + self.window;
            state.limited = true;
            state.limit_reason = Some(LimitReason::Minute);
            state.reset_at = Some(reset_at);
            tracing::warn!(
                requests = state.requests_in_window,
                limit = self.per_minute,
                "per-minute request limit exceeded"
            );
            return RateLimitDecision::denied(LimitReason::Minute, reset_at);
        }

        if state.requests_today > self.per_day {
            let reset_at = state.day_start + self.day;
            state.limited = true;
            state.daily_quota_exceeded = true;
            state.limit_reason = Some(LimitReason::Daily);
            state.reset_at = Some(reset_at);
            tracing::warn!(
                requests = state.requests_today,
                limit = self.per_day,
                "daily request limit exceeded"
            );
            return RateLimitDecision::denied(LimitReason::Daily, reset_at);
        }

        RateLimitDecision::allowed()
    }

    /// Record that the provider throttled us (429 or quota exhaustion)
    ///
    /// Returns the instant requests may resume.
    pub fn note_provider_throttle(&self, daily: bool) -> DateTime<Utc> {
        self.note_provider_throttle_at(daily, Utc::now())
    }

    /// Record a provider throttle observed at `now`
    pub fn note_provider_throttle_at(&self, daily: bool, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let (reason, reset_at) = if daily {
            state.daily_quota_exceeded = true;
            (LimitReason::Daily, now + PROVIDER_QUOTA_BACKOFF)
        } else {
            (LimitReason::Minute, now + PROVIDER_THROTTLE_BACKOFF)
        };

        state.limited = true;
        state.limit_reason = Some(reason);
        state.reset_at = Some(reset_at);
        state.provider_backoff_until = Some(reset_at);

        tracing::warn!(?reason, %reset_at, "provider throttled requests");
        reset_at
    }

    /// Copy of the current counters
    #[must_use]
    pub fn snapshot(&self) -> RateLimitState {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
