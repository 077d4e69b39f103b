//! HTTP surface — router assembly, shared state, and error mapping.

pub mod chat;
pub mod todos;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::agent::orchestrator::TurnError;
use crate::agent::ChatOrchestrator;
use crate::auth::TokenVerifier;
use crate::convo::ConversationManager;
use crate::error::StoreError;
use crate::store::Database;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub conversations: Arc<ConversationManager>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub verifier: Arc<dyn TokenVerifier>,
}

/// Build the full API router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .merge(chat::routes())
        .merge(todos::routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error envelope returned by every endpoint.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        // Store detail goes to the log, never to the client.
        tracing::error!(error = %e, "Store error in handler");
        Self::internal()
    }
}

impl From<TurnError> for ApiError {
    fn from(e: TurnError) -> Self {
        match e {
            TurnError::UnknownConversation => Self::not_found("Conversation not found"),
            TurnError::Store(inner) => inner.into(),
            TurnError::Aborted(reason) => {
                tracing::error!(reason = %reason, "Turn task aborted");
                Self::internal()
            }
        }
    }
}
