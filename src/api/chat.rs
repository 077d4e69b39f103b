//! Chat and conversation endpoints.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{ApiError, AppState};
use crate::auth::AuthenticatedUser;
use crate::convo::model::{ChatMessage, Conversation, Role};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/chat/conversations", get(list_conversations))
        .route(
            "/api/chat/conversations/{id}",
            get(get_conversation).delete(delete_conversation),
        )
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    conversation_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    conversation_id: Uuid,
    reply: String,
    timestamp: DateTime<Utc>,
}

async fn chat(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::bad_request("Message cannot be empty"));
    }

    let turn = state
        .orchestrator
        .handle_message(&user.user_id, &request.message, request.conversation_id)
        .await?;

    Ok(Json(ChatResponse {
        conversation_id: turn.conversation_id,
        reply: turn.reply,
        timestamp: turn.timestamp,
    }))
}

#[derive(Debug, Serialize)]
struct ConversationSummary {
    id: Uuid,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationSummary {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            title: c.title,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

async fn list_conversations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let conversations = state.conversations.list(&user.user_id).await?;
    Ok(Json(
        conversations.into_iter().map(Into::into).collect(),
    ))
}

#[derive(Debug, Serialize)]
struct MessageView {
    id: Uuid,
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
}

impl From<ChatMessage> for MessageView {
    fn from(m: ChatMessage) -> Self {
        Self {
            id: m.id,
            role: m.role,
            content: m.content,
            timestamp: m.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
struct ConversationDetail {
    #[serde(flatten)]
    summary: ConversationSummary,
    messages: Vec<MessageView>,
}

async fn get_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationDetail>, ApiError> {
    let (conversation, messages) = state
        .conversations
        .load(&user.user_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Conversation not found"))?;

    Ok(Json(ConversationDetail {
        summary: conversation.into(),
        messages: messages.into_iter().map(Into::into).collect(),
    }))
}

#[derive(Debug, Serialize)]
struct DeletedBody {
    message: &'static str,
}

async fn delete_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedBody>, ApiError> {
    if !state.conversations.delete(&user.user_id, id).await? {
        return Err(ApiError::not_found("Conversation not found"));
    }
    Ok(Json(DeletedBody {
        message: "Conversation deleted",
    }))
}
