//! One request/response chat cycle
//!
//! Validation, rate limiting, language detection, intent shortcuts, the
//! session turn and reply extraction all happen here. The HTTP layer only
//! decodes the body and renders the outcome.

pub mod extract;
pub mod failure;
pub mod intent;

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use extract::{ExtractorChain, ReplyExtractor};
pub use failure::{ChatFailure, FailureKind};
pub use intent::Intent;

use crate::config::Config;
use crate::language::{DetectedLanguage, LanguageDetector};
use crate::prompt;
use crate::provider::{Provider, ProviderError, RetryPolicy};
use crate::rate_limit::{LimitReason, RateLimiter};
use crate::session::SessionStore;

/// Session used when the caller does not name one
pub const DEFAULT_SESSION_ID: &str = "default";

fn default_session_id() -> String {
    DEFAULT_SESSION_ID.to_string()
}

/// Incoming chat message
///
/// `message` is kept as raw JSON so a missing or non-string value can be
/// rejected as invalid input rather than as a decoding error.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Value,
    #[serde(default = "default_session_id")]
    pub session_id: String,
    #[serde(default)]
    pub clear_context: bool,
}

impl ChatRequest {
    /// A text message for the default session
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Value::String(message.into()),
            session_id: default_session_id(),
            clear_context: false,
        }
    }

    #[must_use]
    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    #[must_use]
    pub const fn clear_context(mut self, clear: bool) -> Self {
        self.clear_context = clear;
        self
    }

    /// The message text, if it is a non-blank string
    fn text(&self) -> Option<&str> {
        self.message.as_str().filter(|m| !m.trim().is_empty())
    }
}

/// Successful chat reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub reply: String,
    pub session_id: String,
    pub has_context: bool,
    pub language: DetectedLanguage,
}

/// Result of one chat cycle
pub type ChatOutcome = Result<ChatReply, ChatFailure>;

/// Runs chat cycles against shared sessions and quotas
#[derive(Debug)]
pub struct ChatService {
    limiter: Arc<RateLimiter>,
    sessions: Arc<SessionStore>,
    detector: LanguageDetector,
    extractors: ExtractorChain,
    retry: RetryPolicy,
}

impl ChatService {
    /// Build a service with fresh state from configuration
    #[must_use]
    pub fn new(provider: Arc<dyn Provider>, config: &Config) -> Self {
        Self::from_parts(
            Arc::new(RateLimiter::new(config.rate_limit)),
            Arc::new(SessionStore::new(Arc::clone(&provider), config.sessions)),
            LanguageDetector::new(provider),
            config.retry,
        )
    }

    /// Assemble a service from existing components
    #[must_use]
    pub fn from_parts(
        limiter: Arc<RateLimiter>,
        sessions: Arc<SessionStore>,
        detector: LanguageDetector,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            limiter,
            sessions,
            detector,
            extractors: ExtractorChain::default(),
            retry,
        }
    }

    #[must_use]
    pub const fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    #[must_use]
    pub const fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    #[must_use]
    pub const fn detector(&self) -> &LanguageDetector {
        &self.detector
    }

    /// Process one message
    ///
    /// # Errors
    ///
    /// Returns a [`ChatFailure`] carrying a speakable reply for invalid input,
    /// rate limiting and provider failures
    pub async fn handle_message(&self, request: ChatRequest) -> ChatOutcome {
        let Some(message) = request.text() else {
            tracing::debug!(session_id = %request.session_id, "rejecting invalid chat message");
            return Err(ChatFailure::invalid_input());
        };
        let session_id = request.session_id.clone();

        let now = Utc::now();
        let decision = self.limiter.check_and_consume_at(now);
        if decision.limited {
            let reason = decision.reason.unwrap_or(LimitReason::Minute);
            let reset_at = decision
                .reset_at
                .unwrap_or_else(|| now + TimeDelta::minutes(1));
            return Err(ChatFailure::rate_limited(reason, reset_at, now));
        }

        let language = self.detector.detect(message).await;

        let outgoing = match Intent::of(message) {
            Intent::IdentifyLanguage => {
                tracing::debug!(%session_id, "answering language question directly");
                return Ok(ChatReply {
                    reply: describe_language(&language),
                    session_id,
                    has_context: false,
                    language,
                });
            }
            Intent::Bilingual => prompt::with_bilingual_instruction(message),
            Intent::Converse => message.to_string(),
        };

        let handle = self
            .sessions
            .get_or_create(&session_id, request.clear_context)
            .await;
        let mut session = handle.lock().await;
        session.touch(Utc::now());

        if session.reminder_due(self.sessions.config().reminder_every) {
            session.send_reminder().await;
        }

        let response = session
            .send(&outgoing, &self.retry)
            .await
            .map_err(|e| self.provider_failure(&session_id, &e))?;
        let has_context = session.has_context();
        drop(session);

        let reply = self.extractors.extract(&response).unwrap_or_else(|| {
            tracing::warn!(%session_id, "no reply text in provider response");
            failure::EMPTY_REPLY_APOLOGY.to_string()
        });

        let language = self.detector.detect(&reply).await;

        Ok(ChatReply {
            reply,
            session_id,
            has_context,
            language,
        })
    }

    fn provider_failure(&self, session_id: &str, error: &ProviderError) -> ChatFailure {
        tracing::error!(session_id, error = %error, "chat turn failed");

        let throttled_until = (FailureKind::classify(error) == FailureKind::RateLimited)
            .then(|| {
                self.limiter
                    .note_provider_throttle(failure::is_daily_quota(error))
            });

        ChatFailure::from_provider(error, throttled_until)
    }
}

/// Direct answer to "what language am I using?"
fn describe_language(language: &DetectedLanguage) -> String {
    let family = if language.is_african_language {
        "which is an African language"
    } else {
        "which is not an African language"
    };
    format!(
        "The language you're using appears to be {} ({family}).",
        language.detected_language
    )
}
