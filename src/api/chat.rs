//! `POST /chat`

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Response},
    routing::post,
};

use super::ApiState;
use crate::chat::{ChatFailure, ChatRequest};

/// Build the chat router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .with_state(state)
}

/// Run one chat cycle
///
/// Malformed bodies are answered like any other invalid input.
async fn chat(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "rejecting malformed chat body");
            return ChatFailure::invalid_input().into_response();
        }
    };

    match state.chat.handle_message(request).await {
        Ok(reply) => Json(reply).into_response(),
        Err(failure) => failure.into_response(),
    }
}

impl IntoResponse for ChatFailure {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
