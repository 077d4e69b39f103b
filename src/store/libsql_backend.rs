//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Mutations that must be
//! atomic with respect to concurrent writers (`update_completed`,
//! `delete_todo`) are single conditional statements guarded on owner and
//! current state.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::convo::model::{ChatMessage, Conversation, Role};
use crate::error::StoreError;
use crate::store::migrations;
use crate::store::traits::Database;
use crate::todos::model::{Todo, TodoDraft, TodoFilter, TodoPatch};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp write format: RFC 3339, fixed microsecond width,
/// so text ordering matches time ordering.
fn fmt_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a libsql Row to a Todo.
///
/// Column order matches TODO_COLUMNS:
/// 0:id, 1:user_id, 2:title, 3:description, 4:priority, 5:category,
/// 6:due_date, 7:completed, 8:created_at, 9:updated_at
fn row_to_todo(row: &libsql::Row) -> Result<Todo, libsql::Error> {
    let id_str: String = row.get(0)?;
    let priority_str: String = row.get(4)?;
    let due_str: Option<String> = row.get(6).ok();
    let completed: i64 = row.get(7)?;
    let created_str: String = row.get(8)?;
    let updated_str: String = row.get(9)?;

    Ok(Todo {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3).ok(),
        priority: priority_str.parse().unwrap_or_default(),
        category: row.get(5).ok(),
        due_date: due_str.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        completed: completed != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to a Conversation.
fn row_to_conversation(row: &libsql::Row) -> Result<Conversation, libsql::Error> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(3)?;
    let updated_str: String = row.get(4)?;

    Ok(Conversation {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to a ChatMessage.
fn row_to_message(row: &libsql::Row) -> Result<ChatMessage, libsql::Error> {
    let id_str: String = row.get(0)?;
    let conversation_str: String = row.get(1)?;
    let role_str: String = row.get(2)?;
    let created_str: String = row.get(4)?;

    Ok(ChatMessage {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        conversation_id: Uuid::parse_str(&conversation_str).unwrap_or_else(|_| Uuid::nil()),
        role: role_str.parse().unwrap_or(Role::User),
        content: row.get(3)?,
        timestamp: parse_datetime(&created_str),
        seq: row.get(5)?,
    })
}

// ── Trait implementation ────────────────────────────────────────────

const TODO_COLUMNS: &str =
    "id, user_id, title, description, priority, category, due_date, completed, created_at, updated_at";

const CONVERSATION_COLUMNS: &str = "id, user_id, title, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, created_at, seq";

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), StoreError> {
        migrations::init_schema(self.conn()).await
    }

    // ── Todos ───────────────────────────────────────────────────────

    async fn create_todo(&self, owner: &str, draft: &TodoDraft) -> Result<Todo, StoreError> {
        let now = Utc::now();
        let todo = Todo {
            id: Uuid::new_v4(),
            user_id: owner.to_string(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            priority: draft.priority.unwrap_or_default(),
            category: draft.category.clone(),
            due_date: draft.due_date,
            completed: false,
            created_at: now,
            updated_at: now,
        };

        self.conn()
            .execute(
                "INSERT INTO todos (id, user_id, title, description, priority, category, due_date, completed, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8)",
                params![
                    todo.id.to_string(),
                    todo.user_id.clone(),
                    todo.title.clone(),
                    opt_text(todo.description.as_deref()),
                    todo.priority.to_string(),
                    opt_text(todo.category.as_deref()),
                    opt_text(todo.due_date.map(|d| d.to_string()).as_deref()),
                    fmt_datetime(now),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("create_todo: {e}")))?;

        debug!(id = %todo.id, title = %todo.title, "Todo inserted");
        Ok(todo)
    }

    async fn list_by_owner(
        &self,
        owner: &str,
        filter: &TodoFilter,
    ) -> Result<Vec<Todo>, StoreError> {
        // Creation order; id breaks timestamp ties deterministically.
        let mut sql = format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE user_id = ?1"
        );
        let mut args: Vec<libsql::Value> = vec![libsql::Value::Text(owner.to_string())];

        if let Some(completed) = filter.completed {
            args.push(libsql::Value::Integer(completed as i64));
            sql.push_str(&format!(" AND completed = ?{}", args.len()));
        }
        if let Some(ref category) = filter.category {
            args.push(libsql::Value::Text(category.clone()));
            sql.push_str(&format!(" AND category = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC");

        let mut rows = self
            .conn()
            .query(&sql, args)
            .await
            .map_err(|e| StoreError::Query(format!("list_by_owner: {e}")))?;

        let mut todos = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_todo(&row) {
                Ok(todo) => todos.push(todo),
                Err(e) => tracing::warn!("Skipping todo row: {e}"),
            }
        }
        Ok(todos)
    }

    async fn get_by_id(&self, owner: &str, id: Uuid) -> Result<Option<Todo>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1 AND user_id = ?2"),
                params![id.to_string(), owner],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_by_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let todo = row_to_todo(&row)
                    .map_err(|e| StoreError::Query(format!("get_by_id row parse: {e}")))?;
                Ok(Some(todo))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get_by_id: {e}"))),
        }
    }

    async fn update_completed(
        &self,
        owner: &str,
        id: Uuid,
        completed: bool,
    ) -> Result<Option<Todo>, StoreError> {
        // Single conditional statement: resolve-then-mutate races with a
        // concurrent writer collapse to zero affected rows, never a blind
        // overwrite.
        let changed = self
            .conn()
            .execute(
                "UPDATE todos SET completed = ?1, updated_at = ?2
                 WHERE id = ?3 AND user_id = ?4 AND completed != ?1",
                params![
                    completed as i64,
                    fmt_datetime(Utc::now()),
                    id.to_string(),
                    owner,
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("update_completed: {e}")))?;

        if changed == 0 {
            return Ok(None);
        }

        debug!(id = %id, completed, "Todo completion updated");
        self.get_by_id(owner, id).await
    }

    async fn update_todo(
        &self,
        owner: &str,
        id: Uuid,
        patch: &TodoPatch,
    ) -> Result<Option<Todo>, StoreError> {
        let Some(prev) = self.get_by_id(owner, id).await? else {
            return Ok(None);
        };

        // updated_at must strictly increase even under a stalled clock.
        let now = Utc::now();
        let updated_at = if now > prev.updated_at {
            now
        } else {
            prev.updated_at + chrono::Duration::microseconds(1)
        };

        let next = Todo {
            title: patch.title.clone().unwrap_or(prev.title),
            description: patch.description.clone().or(prev.description),
            priority: patch.priority.unwrap_or(prev.priority),
            category: patch.category.clone().or(prev.category),
            due_date: patch.due_date.or(prev.due_date),
            completed: patch.completed.unwrap_or(prev.completed),
            updated_at,
            ..prev
        };

        self.conn()
            .execute(
                "UPDATE todos SET title = ?1, description = ?2, priority = ?3, category = ?4,
                        due_date = ?5, completed = ?6, updated_at = ?7
                 WHERE id = ?8 AND user_id = ?9",
                params![
                    next.title.clone(),
                    opt_text(next.description.as_deref()),
                    next.priority.to_string(),
                    opt_text(next.category.as_deref()),
                    opt_text(next.due_date.map(|d| d.to_string()).as_deref()),
                    next.completed as i64,
                    fmt_datetime(next.updated_at),
                    id.to_string(),
                    owner,
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("update_todo: {e}")))?;

        debug!(id = %id, "Todo updated");
        Ok(Some(next))
    }

    async fn delete_todo(&self, owner: &str, id: Uuid) -> Result<bool, StoreError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM todos WHERE id = ?1 AND user_id = ?2",
                params![id.to_string(), owner],
            )
            .await
            .map_err(|e| StoreError::Query(format!("delete_todo: {e}")))?;

        if count > 0 {
            debug!(id = %id, "Todo deleted");
        }
        Ok(count > 0)
    }

    // ── Conversations ───────────────────────────────────────────────

    async fn create_conversation(
        &self,
        owner: &str,
        title: &str,
    ) -> Result<Conversation, StoreError> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id: owner.to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };

        self.conn()
            .execute(
                "INSERT INTO conversations (id, user_id, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![
                    conversation.id.to_string(),
                    owner,
                    title,
                    fmt_datetime(now),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("create_conversation: {e}")))?;

        debug!(id = %conversation.id, "Conversation created");
        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        owner: &str,
        id: Uuid,
    ) -> Result<Option<Conversation>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1 AND user_id = ?2"
                ),
                params![id.to_string(), owner],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_conversation: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let conversation = row_to_conversation(&row)
                    .map_err(|e| StoreError::Query(format!("get_conversation row parse: {e}")))?;
                Ok(Some(conversation))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get_conversation: {e}"))),
        }
    }

    async fn list_conversations(&self, owner: &str) -> Result<Vec<Conversation>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_id = ?1
                     ORDER BY updated_at DESC"
                ),
                params![owner],
            )
            .await
            .map_err(|e| StoreError::Query(format!("list_conversations: {e}")))?;

        let mut conversations = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_conversation(&row) {
                Ok(c) => conversations.push(c),
                Err(e) => tracing::warn!("Skipping conversation row: {e}"),
            }
        }
        Ok(conversations)
    }

    async fn delete_conversation(&self, owner: &str, id: Uuid) -> Result<bool, StoreError> {
        // Messages go explicitly as well: cascade only fires when the
        // connection has foreign keys enabled.
        let count = self
            .conn()
            .execute(
                "DELETE FROM conversations WHERE id = ?1 AND user_id = ?2",
                params![id.to_string(), owner],
            )
            .await
            .map_err(|e| StoreError::Query(format!("delete_conversation: {e}")))?;

        if count > 0 {
            self.conn()
                .execute(
                    "DELETE FROM conversation_messages WHERE conversation_id = ?1",
                    params![id.to_string()],
                )
                .await
                .map_err(|e| StoreError::Query(format!("delete_conversation messages: {e}")))?;
            debug!(id = %id, "Conversation deleted");
        }
        Ok(count > 0)
    }

    // ── Messages ────────────────────────────────────────────────────

    async fn max_message_seq(&self, conversation_id: Uuid) -> Result<Option<i64>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT MAX(seq) FROM conversation_messages WHERE conversation_id = ?1",
                params![conversation_id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("max_message_seq: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).ok()),
            _ => Ok(None),
        }
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO conversation_messages (id, conversation_id, role, content, created_at, seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id.to_string(),
                    message.conversation_id.to_string(),
                    message.role.as_str(),
                    message.content.clone(),
                    fmt_datetime(message.timestamp),
                    message.seq,
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("append_message: {e}")))?;

        self.conn()
            .execute(
                "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
                params![
                    message.conversation_id.to_string(),
                    fmt_datetime(message.timestamp),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("append_message touch: {e}")))?;

        Ok(())
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<ChatMessage>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM conversation_messages
                     WHERE conversation_id = ?1 ORDER BY seq ASC"
                ),
                params![conversation_id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("list_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_message(&row) {
                Ok(m) => messages.push(m),
                Err(e) => tracing::warn!("Skipping message row: {e}"),
            }
        }
        Ok(messages)
    }
}
