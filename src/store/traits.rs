//! Unified `Database` trait — single async interface for all persistence.
//!
//! Covers the narrow todo CRUD contract consumed by both the chat path and
//! the direct path, plus conversation/message persistence. Every operation
//! is owner-scoped: a lookup with the wrong owner behaves as not-found and
//! never leaks another owner's rows.

use async_trait::async_trait;
use uuid::Uuid;

use crate::convo::model::{ChatMessage, Conversation};
use crate::error::StoreError;
use crate::todos::model::{Todo, TodoDraft, TodoFilter, TodoPatch};

/// Backend-agnostic database trait covering todos, conversations, and messages.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), StoreError>;

    // ── Todos ───────────────────────────────────────────────────────

    /// Insert a new todo for `owner`. The store assigns id and timestamps.
    async fn create_todo(&self, owner: &str, draft: &TodoDraft) -> Result<Todo, StoreError>;

    /// List `owner`'s todos in creation order, applying optional filters.
    async fn list_by_owner(
        &self,
        owner: &str,
        filter: &TodoFilter,
    ) -> Result<Vec<Todo>, StoreError>;

    /// Get one todo by id, scoped to `owner`.
    async fn get_by_id(&self, owner: &str, id: Uuid) -> Result<Option<Todo>, StoreError>;

    /// Flip the completed flag as a single conditional statement.
    ///
    /// The update only applies when the row exists, belongs to `owner`, and
    /// is not already in the target state. Returns the updated todo, or
    /// `None` when the condition did not hold (missing, foreign, or a
    /// concurrent writer got there first).
    async fn update_completed(
        &self,
        owner: &str,
        id: Uuid,
        completed: bool,
    ) -> Result<Option<Todo>, StoreError>;

    /// Apply a field patch (direct CRUD path). Last write wins per todo.
    async fn update_todo(
        &self,
        owner: &str,
        id: Uuid,
        patch: &TodoPatch,
    ) -> Result<Option<Todo>, StoreError>;

    /// Delete a todo. Returns `false` when no owned row matched.
    async fn delete_todo(&self, owner: &str, id: Uuid) -> Result<bool, StoreError>;

    // ── Conversations ───────────────────────────────────────────────

    /// Create a conversation owned by `owner`.
    async fn create_conversation(
        &self,
        owner: &str,
        title: &str,
    ) -> Result<Conversation, StoreError>;

    /// Get one conversation, scoped to `owner`.
    async fn get_conversation(
        &self,
        owner: &str,
        id: Uuid,
    ) -> Result<Option<Conversation>, StoreError>;

    /// List `owner`'s conversations, most recently updated first.
    async fn list_conversations(&self, owner: &str) -> Result<Vec<Conversation>, StoreError>;

    /// Delete a conversation and (via cascade) its messages.
    async fn delete_conversation(&self, owner: &str, id: Uuid) -> Result<bool, StoreError>;

    // ── Messages ────────────────────────────────────────────────────

    /// Highest seq appended to the conversation, or `None` when empty.
    ///
    /// Callers serialize seq assignment per conversation; the store only
    /// reports and enforces (unique index) the sequence.
    async fn max_message_seq(&self, conversation_id: Uuid) -> Result<Option<i64>, StoreError>;

    /// Append one message and touch the owning conversation's `updated_at`.
    async fn append_message(&self, message: &ChatMessage) -> Result<(), StoreError>;

    /// List a conversation's messages in seq order, oldest first.
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<ChatMessage>, StoreError>;
}
