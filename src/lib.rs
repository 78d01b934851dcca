//! Africon Gateway - chat gateway for an African languages and culture assistant
//!
//! This library provides the core functionality for the Africon gateway:
//! - Chat orchestration over a hosted generative model (Gemini)
//! - Session context with idle eviction
//! - Request quotas and best-effort language detection
//! - Engine-agnostic speech input and output state machines
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Interfaces                        │
//! │   HTTP (/chat, /status)  │  CLI  │  Console voice   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Chat Service                        │
//! │  Rate Limiter │ Sessions │ Language │ Extraction    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              Provider (Gemini REST)                  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod language;
pub mod prompt;
pub mod provider;
pub mod rate_limit;
pub mod session;
pub mod speech;

pub use chat::{ChatFailure, ChatReply, ChatRequest, ChatService};
pub use config::Config;
pub use error::{Error, Result};
pub use language::{DetectedLanguage, LanguageDetector};
pub use provider::{GeminiProvider, Provider, ProviderError};
pub use rate_limit::RateLimiter;
pub use session::SessionStore;
