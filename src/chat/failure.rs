//! Failure taxonomy for the chat cycle
//!
//! Every failure carries a short technical `error` and a speakable `reply`.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::provider::ProviderError;
use crate::rate_limit::LimitReason;

const PATIENCE_PROVERB: &str = "As the African proverb says, \"Patience is the mother of a beautiful child.\"";

const DAILY_LIMIT_REPLY: &str = "I've reached my daily message limit. Please try again tomorrow. In Africa, we say 'Tomorrow brings new opportunities.'";

/// Reply used when no extraction strategy produced text
pub const EMPTY_REPLY_APOLOGY: &str = "I apologize, but I couldn't generate a proper response. Could you please rephrase your question or try again?";

/// Kind of failure, which fixes the HTTP status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidInput,
    RateLimited,
    AuthError,
    SafetyBlocked,
    Timeout,
    /// Recovered locally with an apology; never surfaced as an error
    ExtractionFailure,
    Unknown,
}

impl FailureKind {
    /// HTTP status for this kind
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::InvalidInput | Self::SafetyBlocked => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::AuthError => StatusCode::UNAUTHORIZED,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::ExtractionFailure | Self::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classify a provider error, by status first and message keywords second
    #[must_use]
    pub fn classify(error: &ProviderError) -> Self {
        match error {
            ProviderError::Status { status: 429, .. } => return Self::RateLimited,
            ProviderError::Status {
                status: 401 | 403, ..
            } => return Self::AuthError,
            ProviderError::Status {
                status: 408 | 504, ..
            }
            | ProviderError::Timeout(_) => return Self::Timeout,
            ProviderError::Blocked(_) => return Self::SafetyBlocked,
            _ => {}
        }

        let message = error.to_string().to_lowercase();
        let mentions = |words: &[&str]| words.iter().any(|w| message.contains(w));

        if mentions(&["quota", "rate limit"]) {
            Self::RateLimited
        } else if mentions(&["auth", "api key"]) {
            Self::AuthError
        } else if mentions(&["block", "safety"]) {
            Self::SafetyBlocked
        } else if mentions(&["timeout", "timed out", "deadline"]) {
            Self::Timeout
        } else {
            Self::Unknown
        }
    }
}

/// Whether a provider throttle looks like daily quota exhaustion
#[must_use]
pub fn is_daily_quota(error: &ProviderError) -> bool {
    let message = error.to_string().to_lowercase();
    ["daily", "per day", "quota"]
        .iter()
        .any(|w| message.contains(w))
}

/// A failed chat cycle, ready to be rendered as a response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatFailure {
    pub kind: FailureKind,
    pub error: String,
    pub reply: String,
    pub reset_time: Option<DateTime<Utc>>,
}

impl ChatFailure {
    /// Missing, non-string or blank message
    #[must_use]
    pub fn invalid_input() -> Self {
        Self {
            kind: FailureKind::InvalidInput,
            error: "Invalid message format".to_string(),
            reply: "I didn't catch a message there. Please type or say something and I'll do my best to help.".to_string(),
            reset_time: None,
        }
    }

    /// Denied by the local rate limiter
    #[must_use]
    pub fn rate_limited(reason: LimitReason, reset_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let reply = match reason {
            LimitReason::Minute => {
                let wait = wait_seconds(reset_at, now);
                format!(
                    "I'm receiving too many requests right now. Please wait about {wait} seconds before trying again. {PATIENCE_PROVERB}"
                )
            }
            LimitReason::Daily => DAILY_LIMIT_REPLY.to_string(),
        };

        Self {
            kind: FailureKind::RateLimited,
            error: "API rate limit exceeded. Please try again later.".to_string(),
            reply,
            reset_time: Some(reset_at),
        }
    }

    /// A provider call failed after retries
    ///
    /// `throttled_until` is the back-off recorded with the rate limiter when
    /// the provider itself throttled us.
    #[must_use]
    pub fn from_provider(error: &ProviderError, throttled_until: Option<DateTime<Utc>>) -> Self {
        let kind = FailureKind::classify(error);
        let (message, reply) = match kind {
            FailureKind::RateLimited => (
                "API rate limit or quota exceeded. Please try again later.".to_string(),
                if is_daily_quota(error) {
                    DAILY_LIMIT_REPLY.to_string()
                } else {
                    format!(
                        "I'm receiving too many requests right now. Please wait about a minute before trying again. {PATIENCE_PROVERB}"
                    )
                },
            ),
            FailureKind::AuthError => (
                "Authentication error with the AI service. Please check your API configuration.".to_string(),
                "I'm having trouble with my connection. Please try again later.".to_string(),
            ),
            FailureKind::SafetyBlocked => (
                "Your request was blocked by the AI service safety filters. Please modify your request.".to_string(),
                "I cannot respond to that type of request. Please ask me something else about African culture, history, or languages.".to_string(),
            ),
            FailureKind::Timeout => (
                "The request timed out. Please try a shorter or simpler question.".to_string(),
                "That question is taking too long to answer. Could you ask something simpler? As we say in Africa, 'The simplest questions often have the wisest answers.'".to_string(),
            ),
            FailureKind::InvalidInput | FailureKind::ExtractionFailure | FailureKind::Unknown => (
                error.to_string(),
                "I'm having trouble connecting right now. As we say in Africa, 'Even the mightiest river sometimes stops flowing.' Please try again in a moment.".to_string(),
            ),
        };

        Self {
            kind,
            error: message,
            reply,
            reset_time: throttled_until.filter(|_| kind == FailureKind::RateLimited),
        }
    }

    /// HTTP status for this failure
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.kind.status()
    }

    /// Whether the failure is a rate limit (local or provider)
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.kind == FailureKind::RateLimited
    }

    /// JSON response body
    ///
    /// Invalid input carries only `error` and `reply`; every other failure
    /// adds `rateLimited` and `resetTime` (epoch millis or null).
    #[must_use]
    pub fn body(&self) -> Value {
        if self.kind == FailureKind::InvalidInput {
            return json!({ "error": self.error, "reply": self.reply });
        }

        json!({
            "error": self.error,
            "reply": self.reply,
            "rateLimited": self.is_rate_limited(),
            "resetTime": self.reset_time.map(|t| t.timestamp_millis()),
        })
    }
}

/// Whole seconds until `reset_at`, rounded up, at least one
fn wait_seconds(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (reset_at - now).num_milliseconds();
    ((millis + 999) / 1000).max(1)
}
