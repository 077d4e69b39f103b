//! Conversation lifecycle — creation, ordered appends, loading.
//!
//! Appends for a given conversation are serialized through a keyed mutex
//! registry: the seq read-and-insert happens under that conversation's
//! lock, so two racing appends can never interleave their sequence
//! assignment. Unrelated conversations proceed fully in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::convo::model::{derive_title, ChatMessage, Conversation, Role};
use crate::error::StoreError;
use crate::store::Database;

/// Owns conversation and message lifecycle.
pub struct ConversationManager {
    db: Arc<dyn Database>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ConversationManager {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Load an existing conversation or create a fresh one.
    ///
    /// With an id, the lookup is owner-scoped; a missing or foreign id
    /// yields `None`. Without one, a new conversation is created with a
    /// title derived from the first user message.
    pub async fn start_or_continue(
        &self,
        owner: &str,
        conversation_id: Option<Uuid>,
        first_utterance: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        match conversation_id {
            Some(id) => self.db.get_conversation(owner, id).await,
            None => {
                let title = derive_title(first_utterance);
                let conversation = self.db.create_conversation(owner, &title).await?;
                debug!(id = %conversation.id, title = %conversation.title, "Conversation started");
                Ok(Some(conversation))
            }
        }
    }

    /// Append one message, assigning the next seq under the conversation's lock.
    pub async fn append_message(
        &self,
        conversation_id: Uuid,
        role: Role,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        let lock = self.lock_for(conversation_id).await;
        let _guard = lock.lock().await;

        let seq = self
            .db
            .max_message_seq(conversation_id)
            .await?
            .map_or(0, |s| s + 1);

        let message = ChatMessage {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
            seq,
        };
        self.db.append_message(&message).await?;
        Ok(message)
    }

    /// The tail of a conversation, oldest first, at most `limit` messages.
    pub async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let mut messages = self.db.list_messages(conversation_id).await?;
        if messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
        Ok(messages)
    }

    /// Load a conversation with all its messages in order.
    pub async fn load(
        &self,
        owner: &str,
        conversation_id: Uuid,
    ) -> Result<Option<(Conversation, Vec<ChatMessage>)>, StoreError> {
        let Some(conversation) = self.db.get_conversation(owner, conversation_id).await? else {
            return Ok(None);
        };
        let messages = self.db.list_messages(conversation_id).await?;
        Ok(Some((conversation, messages)))
    }

    /// List an owner's conversations, most recently updated first.
    pub async fn list(&self, owner: &str) -> Result<Vec<Conversation>, StoreError> {
        self.db.list_conversations(owner).await
    }

    /// Delete a conversation and its messages.
    pub async fn delete(&self, owner: &str, conversation_id: Uuid) -> Result<bool, StoreError> {
        let deleted = self.db.delete_conversation(owner, conversation_id).await?;
        if deleted {
            self.locks.lock().await.remove(&conversation_id);
        }
        Ok(deleted)
    }

    async fn lock_for(&self, conversation_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(conversation_id)
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}
