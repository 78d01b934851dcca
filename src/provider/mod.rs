//! Generative language provider
//!
//! The [`Provider`] trait is the seam between the chat pipeline and the
//! hosted model. [`GeminiProvider`] talks to the Gemini REST API; tests plug
//! in scripted providers.

mod gemini;
pub mod retry;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use gemini::GeminiProvider;
pub use retry::{RetryPolicy, is_retryable_status, with_retry};
pub use types::{
    Content, GenerateRequest, GenerateResponse, GenerationConfig, HarmBlockThreshold,
    HarmCategory, Part, Role, SafetySetting, default_safety_settings,
};

/// Errors surfaced by a provider call
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Non-success HTTP status
    #[error("provider returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The request exceeded its deadline
    #[error("request timeout: {0}")]
    Timeout(String),

    /// The prompt was rejected by the provider's safety filters
    #[error("request blocked by safety filters: {0}")]
    Blocked(String),

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be decoded
    #[error("invalid provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// HTTP status carried by the error, if any
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the retry policy should try again
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.status().is_some_and(is_retryable_status)
    }
}

/// A hosted generative language model
#[async_trait]
pub trait Provider: Send + Sync {
    /// Run one `generateContent` call
    ///
    /// # Errors
    ///
    /// Returns error if the call fails or the provider rejects it
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ProviderError>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Provider-side conversation thread
///
/// Holds the turn history sent with every request. Turns are only recorded
/// once the provider answers, so a failed send leaves the history untouched.
#[derive(Clone)]
pub struct Conversation {
    provider: Arc<dyn Provider>,
    history: Vec<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("provider", &self.provider.name())
            .field("turns", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl Conversation {
    /// Start a conversation seeded with prior turns
    #[must_use]
    pub fn new(
        provider: Arc<dyn Provider>,
        history: Vec<Content>,
        generation_config: GenerationConfig,
        safety_settings: Vec<SafetySetting>,
    ) -> Self {
        Self {
            provider,
            history,
            generation_config,
            safety_settings,
        }
    }

    /// Turns recorded so far
    #[must_use]
    pub fn history(&self) -> &[Content] {
        &self.history
    }

    /// Send a user message, retrying per `policy`
    ///
    /// # Errors
    ///
    /// Returns the provider error once retries are exhausted or the error
    /// is not retryable
    pub async fn send_message(
        &mut self,
        text: &str,
        policy: &RetryPolicy,
    ) -> Result<GenerateResponse, ProviderError> {
        let mut contents = self.history.clone();
        contents.push(Content::user(text));

        let request = GenerateRequest {
            contents,
            generation_config: self.generation_config,
            safety_settings: self.safety_settings.clone(),
        };

        let provider = &self.provider;
        let response = with_retry(policy, || provider.generate(&request)).await?;

        self.history.push(Content::user(text));
        if let Some(reply) = response.first_content() {
            self.history.push(reply);
        }

        Ok(response)
    }
}
