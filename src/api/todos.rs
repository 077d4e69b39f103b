//! Direct todo CRUD endpoints.
//!
//! Same store adapter as the chat path, so either path's writes are
//! immediately visible to the other.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use uuid::Uuid;

use crate::api::{ApiError, AppState};
use crate::auth::AuthenticatedUser;
use crate::todos::model::{Todo, TodoDraft, TodoFilter, TodoPatch};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/todos", get(list_todos).post(create_todo))
        .route(
            "/api/todos/{id}",
            get(get_todo).put(update_todo).delete(delete_todo),
        )
        .route("/api/todos/{id}/complete", axum::routing::patch(toggle_complete))
}

async fn list_todos(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filter): Query<TodoFilter>,
) -> Result<Json<Vec<Todo>>, ApiError> {
    let todos = state.db.list_by_owner(&user.user_id, &filter).await?;
    Ok(Json(todos))
}

async fn create_todo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(draft): Json<TodoDraft>,
) -> Result<Json<Todo>, ApiError> {
    if draft.title.trim().is_empty() {
        return Err(ApiError::bad_request("Title cannot be empty"));
    }
    let todo = state.db.create_todo(&user.user_id, &draft).await?;
    Ok(Json(todo))
}

async fn get_todo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Todo>, ApiError> {
    let todo = state
        .db
        .get_by_id(&user.user_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Todo not found"))?;
    Ok(Json(todo))
}

async fn update_todo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<TodoPatch>,
) -> Result<Json<Todo>, ApiError> {
    if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::bad_request("Title cannot be empty"));
    }
    let todo = state
        .db
        .update_todo(&user.user_id, id, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found("Todo not found"))?;
    Ok(Json(todo))
}

async fn toggle_complete(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Todo>, ApiError> {
    let current = state
        .db
        .get_by_id(&user.user_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Todo not found"))?;

    // The conditional update only transitions; losing a race with another
    // toggle reads back the winner's state instead of erroring.
    match state
        .db
        .update_completed(&user.user_id, id, !current.completed)
        .await?
    {
        Some(todo) => Ok(Json(todo)),
        None => {
            let todo = state
                .db
                .get_by_id(&user.user_id, id)
                .await?
                .ok_or_else(|| ApiError::not_found("Todo not found"))?;
            Ok(Json(todo))
        }
    }
}

#[derive(Serialize)]
struct DeletedBody {
    message: &'static str,
}

async fn delete_todo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedBody>, ApiError> {
    if !state.db.delete_todo(&user.user_id, id).await? {
        return Err(ApiError::not_found("Todo not found"));
    }
    Ok(Json(DeletedBody {
        message: "Todo deleted",
    }))
}
