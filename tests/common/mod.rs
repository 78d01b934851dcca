//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use africon_gateway::api::ApiServerBuilder;
use africon_gateway::config::{RateLimitConfig, SessionConfig};
use africon_gateway::provider::{GenerateRequest, GenerateResponse, RetryPolicy};
use africon_gateway::{
    ChatService, LanguageDetector, Provider, ProviderError, RateLimiter, SessionStore,
};

/// Provider answering detection prompts with JSON and chat turns with text
pub struct MockProvider {
    detection: String,
    reply: Result<String, ProviderError>,
    pub chat_calls: AtomicUsize,
}

impl MockProvider {
    /// Replies in English with a fixed detection of Yoruba
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            detection: r#"{"detectedLanguage":"Yoruba","languageCode":"yo","isAfricanLanguage":true,"confidence":0.92}"#
                .to_string(),
            reply: Ok(reply.to_string()),
            chat_calls: AtomicUsize::new(0),
        })
    }

    /// Fails every chat turn with `error`
    pub fn failing(error: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            detection: r#"{"detectedLanguage":"English","languageCode":"en","isAfricanLanguage":false,"confidence":0.95}"#
                .to_string(),
            reply: Err(error),
            chat_calls: AtomicUsize::new(0),
        })
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let text = request.last_user_text().unwrap_or_default();
        if text.ends_with("JSON response:") {
            return Ok(GenerateResponse::from_text(&self.detection));
        }

        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .as_ref()
            .map(|reply| GenerateResponse::from_text(reply))
            .map_err(Clone::clone)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Build a chat service over `provider` with default quotas
pub fn chat_service(provider: Arc<MockProvider>) -> Arc<ChatService> {
    Arc::new(ChatService::from_parts(
        Arc::new(RateLimiter::new(RateLimitConfig::default())),
        Arc::new(SessionStore::new(provider.clone(), SessionConfig::default())),
        LanguageDetector::new(provider),
        RetryPolicy::none(),
    ))
}

/// Build the full API router over `chat`
pub fn build_test_router(chat: Arc<ChatService>) -> Router {
    ApiServerBuilder::new(chat).build().router()
}

/// JSON POST to `/chat`
pub fn chat_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

/// Collect a response body as JSON
pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    serde_json::from_slice(&bytes).expect("json body")
}
