//! Chat orchestration — drives one turn through its state machine.
//!
//! `Received → Parsed → Dispatched → Replied → Persisted`, no phase skipped.
//! A classifier hard failure or store failure short-circuits the outcome to
//! an internal-error reply but the turn still runs to `Persisted`: the user
//! always finds their utterance (and what happened to it) in the history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::agent::dispatcher::{DispatchOutcome, Dispatcher};
use crate::agent::reply::compose_reply;
use crate::convo::model::Role;
use crate::convo::ConversationManager;
use crate::error::StoreError;
use crate::intent::IntentParser;

/// How many trailing messages the classifier sees as context.
const CONTEXT_MESSAGES: usize = 10;

/// Phases of one chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnPhase {
    Received,
    Parsed,
    Dispatched,
    Replied,
    Persisted,
}

impl TurnPhase {
    /// The turn advances strictly one phase at a time.
    pub fn can_advance_to(&self, target: TurnPhase) -> bool {
        use TurnPhase::*;

        matches!(
            (self, target),
            (Received, Parsed) | (Parsed, Dispatched) | (Dispatched, Replied) | (Replied, Persisted)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Persisted)
    }
}

impl std::fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Parsed => "parsed",
            Self::Dispatched => "dispatched",
            Self::Replied => "replied",
            Self::Persisted => "persisted",
        };
        write!(f, "{s}")
    }
}

/// The completed turn handed back to the endpoint.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub conversation_id: Uuid,
    pub reply: String,
    pub timestamp: DateTime<Utc>,
}

/// Failures the caller has to handle itself (everything else becomes a
/// composed reply inside the turn).
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// The supplied conversation id is missing or belongs to someone else.
    #[error("conversation not found")]
    UnknownConversation,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("turn task aborted: {0}")]
    Aborted(String),
}

/// Entry point wiring parser, dispatcher, composer, and conversation
/// manager together per incoming message.
#[derive(Clone)]
pub struct ChatOrchestrator {
    conversations: Arc<ConversationManager>,
    parser: Arc<IntentParser>,
    dispatcher: Arc<Dispatcher>,
}

impl ChatOrchestrator {
    pub fn new(
        conversations: Arc<ConversationManager>,
        parser: Arc<IntentParser>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            conversations,
            parser,
            dispatcher,
        }
    }

    /// Handle one incoming chat message for an authenticated owner.
    ///
    /// The turn body runs on its own task: if the caller is dropped
    /// mid-request (client disconnect), a turn that already mutated the
    /// store still runs to `Persisted` instead of leaving the store and the
    /// conversation log divergent.
    pub async fn handle_message(
        &self,
        owner: &str,
        utterance: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<ChatTurn, TurnError> {
        let this = self.clone();
        let owner = owner.to_string();
        let utterance = utterance.to_string();

        tokio::spawn(async move { this.run_turn(&owner, &utterance, conversation_id).await })
            .await
            .map_err(|e| TurnError::Aborted(e.to_string()))?
    }

    async fn run_turn(
        &self,
        owner: &str,
        utterance: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<ChatTurn, TurnError> {
        let mut phase = TurnPhase::Received;

        let conversation = self
            .conversations
            .start_or_continue(owner, conversation_id, utterance)
            .await?
            .ok_or(TurnError::UnknownConversation)?;

        // Context for the classifier is the history *before* this turn.
        let context = self
            .conversations
            .recent_messages(conversation.id, CONTEXT_MESSAGES)
            .await
            .unwrap_or_default();

        // Persist the user message first: whatever happens from here on,
        // the utterance is on record.
        self.conversations
            .append_message(conversation.id, Role::User, utterance)
            .await?;

        let outcome = match self.parser.resolve(utterance, &context).await {
            Ok(intent) => {
                advance(&mut phase, TurnPhase::Parsed);
                debug!(
                    conversation_id = %conversation.id,
                    intent = %intent.kind(),
                    "Utterance parsed"
                );
                self.dispatcher.execute(&intent, owner).await
            }
            Err(e) => {
                // Parser blew up rather than degrading; the turn continues
                // with an internal-error outcome.
                error!(conversation_id = %conversation.id, error = %e, "Classifier failure");
                advance(&mut phase, TurnPhase::Parsed);
                DispatchOutcome::InternalError
            }
        };
        advance(&mut phase, TurnPhase::Dispatched);

        let reply = compose_reply(&outcome, utterance);
        advance(&mut phase, TurnPhase::Replied);

        let message = self
            .conversations
            .append_message(conversation.id, Role::Assistant, &reply)
            .await?;
        advance(&mut phase, TurnPhase::Persisted);

        info!(
            conversation_id = %conversation.id,
            status = ?outcome.status(),
            phase = %phase,
            "Turn completed"
        );

        Ok(ChatTurn {
            conversation_id: conversation.id,
            reply,
            timestamp: message.timestamp,
        })
    }
}

fn advance(phase: &mut TurnPhase, target: TurnPhase) {
    debug_assert!(
        phase.can_advance_to(target),
        "illegal turn transition {phase} -> {target}"
    );
    *phase = target;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::convo::model::ChatMessage;
    use crate::error::ClassifyError;
    use crate::intent::{Intent, IntentClassifier, RulesClassifier};
    use crate::store::{Database, LibSqlBackend};
    use crate::todos::model::TodoFilter;

    async fn orchestrator_with(
        classifier: Arc<dyn IntentClassifier>,
    ) -> (Arc<ChatOrchestrator>, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let conversations = Arc::new(ConversationManager::new(Arc::clone(&db)));
        let parser = Arc::new(IntentParser::new(classifier, Duration::from_secs(5)));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&db), Duration::from_secs(5)));
        (
            Arc::new(ChatOrchestrator::new(conversations, parser, dispatcher)),
            db,
        )
    }

    async fn orchestrator() -> (Arc<ChatOrchestrator>, Arc<dyn Database>) {
        orchestrator_with(Arc::new(RulesClassifier::new())).await
    }

    #[test]
    fn phases_advance_strictly_in_order() {
        assert!(TurnPhase::Received.can_advance_to(TurnPhase::Parsed));
        assert!(TurnPhase::Replied.can_advance_to(TurnPhase::Persisted));
        assert!(!TurnPhase::Received.can_advance_to(TurnPhase::Dispatched));
        assert!(!TurnPhase::Persisted.can_advance_to(TurnPhase::Received));
        assert!(TurnPhase::Persisted.is_terminal());
        assert!(!TurnPhase::Dispatched.is_terminal());
    }

    #[tokio::test]
    async fn create_turn_starts_conversation_and_persists_both_messages() {
        let (orchestrator, db) = orchestrator().await;

        let turn = orchestrator
            .handle_message("u1", "Add a task to buy groceries", None)
            .await
            .unwrap();
        assert!(turn.reply.contains("buy groceries"));

        let todos = db.list_by_owner("u1", &TodoFilter::default()).await.unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].title, "buy groceries");

        let messages = db.list_messages(turn.conversation_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "Add a task to buy groceries");
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn list_turn_enumerates_open_todo() {
        let (orchestrator, _db) = orchestrator().await;
        orchestrator
            .handle_message("u1", "Add a task to buy groceries", None)
            .await
            .unwrap();

        let turn = orchestrator
            .handle_message("u1", "What do I have to do?", None)
            .await
            .unwrap();
        assert!(turn.reply.contains("1 open of 1 task"));
        assert!(turn.reply.contains("buy groceries"));
    }

    #[tokio::test]
    async fn complete_with_no_todos_replies_not_found_and_mutates_nothing() {
        let (orchestrator, db) = orchestrator().await;

        let turn = orchestrator
            .handle_message("u1", "Mark task as complete", None)
            .await
            .unwrap();
        assert!(turn.reply.contains("couldn't find a matching task"));
        assert!(db.list_by_owner("u1", &TodoFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn turns_in_same_conversation_share_history() {
        let (orchestrator, db) = orchestrator().await;

        let first = orchestrator
            .handle_message("u1", "Add a task to water plants", None)
            .await
            .unwrap();
        let second = orchestrator
            .handle_message("u1", "What do I have to do?", Some(first.conversation_id))
            .await
            .unwrap();

        assert_eq!(first.conversation_id, second.conversation_id);
        let messages = db.list_messages(first.conversation_id).await.unwrap();
        assert_eq!(messages.len(), 4);
        let seqs: Vec<i64> = messages.iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn foreign_conversation_id_is_rejected_before_any_persist() {
        let (orchestrator, db) = orchestrator().await;
        let theirs = orchestrator
            .handle_message("other", "Add a task to hide", None)
            .await
            .unwrap();

        let result = orchestrator
            .handle_message("u1", "What do I have to do?", Some(theirs.conversation_id))
            .await;
        assert!(matches!(result, Err(TurnError::UnknownConversation)));

        // The foreign conversation saw nothing from u1.
        let messages = db.list_messages(theirs.conversation_id).await.unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn classifier_failure_still_persists_the_turn() {
        struct FailingClassifier;

        #[async_trait::async_trait]
        impl IntentClassifier for FailingClassifier {
            fn name(&self) -> &str {
                "failing"
            }

            async fn classify(
                &self,
                _utterance: &str,
                _context: &[ChatMessage],
            ) -> Result<Intent, ClassifyError> {
                Err(ClassifyError::Backend {
                    backend: "failing".into(),
                    reason: "boom".into(),
                })
            }
        }

        let (orchestrator, db) = orchestrator_with(Arc::new(FailingClassifier)).await;
        let turn = orchestrator
            .handle_message("u1", "Add a task to buy milk", None)
            .await
            .unwrap();

        assert!(turn.reply.contains("Sorry"));
        let messages = db.list_messages(turn.conversation_id).await.unwrap();
        assert_eq!(messages.len(), 2, "failed turn is still recorded");
        assert_eq!(messages[0].content, "Add a task to buy milk");
    }

    #[tokio::test]
    async fn unknown_utterance_gets_help_reply() {
        let (orchestrator, _db) = orchestrator().await;
        let turn = orchestrator
            .handle_message("u1", "how is the weather today", None)
            .await
            .unwrap();
        assert!(turn.reply.contains("add a task"));
    }

    #[tokio::test]
    async fn conversation_title_derived_from_first_message() {
        let (orchestrator, db) = orchestrator().await;
        let turn = orchestrator
            .handle_message("u1", "Add a task to buy groceries", None)
            .await
            .unwrap();

        let conversation = db
            .get_conversation("u1", turn.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.title, "Add a task to buy groceries");
    }
}
