//! Action dispatch — executes a resolved intent against the todo store.
//!
//! Target resolution runs against the owner's current todos (open only for
//! complete, everything for delete), then the mutation itself is a single
//! conditional store statement, so a concurrent writer racing the same todo
//! id collapses to a clean NotFound instead of a lost update.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::StoreError;
use crate::intent::model::{Intent, TargetRef};
use crate::store::Database;
use crate::todos::model::{Todo, TodoDraft, TodoFilter};

/// Five-way status classification of an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Success,
    NotFound,
    Ambiguous,
    Rejected,
    InternalError,
}

/// Structured result of executing one intent. Consumed by the composer only.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// A todo was created.
    Created { todo: Todo },
    /// The owner's (possibly filtered) list snapshot.
    Listed { todos: Vec<Todo> },
    /// Exactly one open todo matched and was completed.
    Completed { todo: Todo },
    /// Exactly one todo matched and was deleted.
    Deleted { todo: Todo },
    /// The reference matched nothing.
    NotFound,
    /// The reference matched several candidates; no mutation occurred.
    Ambiguous { candidates: Vec<Todo> },
    /// Unknown intent — a normal conversational outcome, not a failure.
    Rejected,
    /// Store failure or defensive validation failure.
    InternalError,
}

impl DispatchOutcome {
    pub fn status(&self) -> OutcomeStatus {
        match self {
            Self::Created { .. } | Self::Listed { .. } | Self::Completed { .. } | Self::Deleted { .. } => {
                OutcomeStatus::Success
            }
            Self::NotFound => OutcomeStatus::NotFound,
            Self::Ambiguous { .. } => OutcomeStatus::Ambiguous,
            Self::Rejected => OutcomeStatus::Rejected,
            Self::InternalError => OutcomeStatus::InternalError,
        }
    }
}

/// How a target reference resolved against the candidate set.
enum Resolution {
    None,
    One(Todo),
    Many(Vec<Todo>),
}

/// Resolve a reference against candidates in creation order.
fn resolve_target(candidates: Vec<Todo>, target: &TargetRef) -> Resolution {
    let mut matched: Vec<Todo> = match target {
        TargetRef::Text(needle) => {
            let needle = needle.to_lowercase();
            candidates
                .into_iter()
                .filter(|t| t.title.to_lowercase().contains(&needle))
                .collect()
        }
        TargetRef::Ordinal(n) => candidates.into_iter().skip(n - 1).take(1).collect(),
        TargetRef::Last => candidates.into_iter().last().into_iter().collect(),
        TargetRef::Any => candidates,
    };

    match matched.len() {
        0 => Resolution::None,
        1 => Resolution::One(matched.remove(0)),
        _ => Resolution::Many(matched),
    }
}

/// Executes intents against the store.
pub struct Dispatcher {
    db: Arc<dyn Database>,
    store_timeout: Duration,
}

impl Dispatcher {
    pub fn new(db: Arc<dyn Database>, store_timeout: Duration) -> Self {
        Self { db, store_timeout }
    }

    /// Execute one intent for `owner`, producing a structured outcome.
    ///
    /// Never returns an error: every failure mode maps to an outcome the
    /// composer can phrase.
    pub async fn execute(&self, intent: &Intent, owner: &str) -> DispatchOutcome {
        match intent {
            Intent::CreateTodo { draft } => self.create(owner, draft).await,
            Intent::ListTodos { filter } => self.list(owner, filter).await,
            Intent::CompleteTodo { target } => self.complete(owner, target).await,
            Intent::DeleteTodo { target } => self.delete(owner, target).await,
            Intent::Unknown => DispatchOutcome::Rejected,
        }
    }

    async fn create(&self, owner: &str, draft: &TodoDraft) -> DispatchOutcome {
        if draft.title.trim().is_empty() {
            // The parser degrades empty titles to Unknown; reaching this
            // point means a classifier contract violation.
            warn!(owner, "Create intent with empty title reached dispatch");
            return DispatchOutcome::InternalError;
        }

        match self.timed(self.db.create_todo(owner, draft)).await {
            Ok(todo) => {
                debug!(owner, id = %todo.id, title = %todo.title, "Dispatched create");
                DispatchOutcome::Created { todo }
            }
            Err(e) => {
                error!(owner, error = %e, "Create failed");
                DispatchOutcome::InternalError
            }
        }
    }

    async fn list(&self, owner: &str, filter: &TodoFilter) -> DispatchOutcome {
        match self.read_with_retry(|| self.db.list_by_owner(owner, filter)).await {
            Ok(todos) => DispatchOutcome::Listed { todos },
            Err(e) => {
                error!(owner, error = %e, "List failed");
                DispatchOutcome::InternalError
            }
        }
    }

    async fn complete(&self, owner: &str, target: &TargetRef) -> DispatchOutcome {
        // Candidates are open todos only: completing "buy milk" twice must
        // say "not found" the second time, not silently re-complete.
        let open_filter = TodoFilter {
            completed: Some(false),
            ..Default::default()
        };
        let candidates = match self
            .read_with_retry(|| self.db.list_by_owner(owner, &open_filter))
            .await
        {
            Ok(todos) => todos,
            Err(e) => {
                error!(owner, error = %e, "Candidate fetch for complete failed");
                return DispatchOutcome::InternalError;
            }
        };

        match resolve_target(candidates, target) {
            Resolution::None => DispatchOutcome::NotFound,
            Resolution::Many(candidates) => DispatchOutcome::Ambiguous { candidates },
            Resolution::One(todo) => {
                match self.timed(self.db.update_completed(owner, todo.id, true)).await {
                    Ok(Some(todo)) => {
                        debug!(owner, id = %todo.id, "Dispatched complete");
                        DispatchOutcome::Completed { todo }
                    }
                    // A concurrent writer completed or deleted it between
                    // resolution and mutation.
                    Ok(None) => DispatchOutcome::NotFound,
                    Err(e) => {
                        error!(owner, id = %todo.id, error = %e, "Complete failed");
                        DispatchOutcome::InternalError
                    }
                }
            }
        }
    }

    async fn delete(&self, owner: &str, target: &TargetRef) -> DispatchOutcome {
        let all_filter = TodoFilter::default();
        let candidates = match self
            .read_with_retry(|| self.db.list_by_owner(owner, &all_filter))
            .await
        {
            Ok(todos) => todos,
            Err(e) => {
                error!(owner, error = %e, "Candidate fetch for delete failed");
                return DispatchOutcome::InternalError;
            }
        };

        match resolve_target(candidates, target) {
            Resolution::None => DispatchOutcome::NotFound,
            Resolution::Many(candidates) => DispatchOutcome::Ambiguous { candidates },
            Resolution::One(todo) => {
                match self.timed(self.db.delete_todo(owner, todo.id)).await {
                    Ok(true) => {
                        debug!(owner, id = %todo.id, "Dispatched delete");
                        DispatchOutcome::Deleted { todo }
                    }
                    Ok(false) => DispatchOutcome::NotFound,
                    Err(e) => {
                        error!(owner, id = %todo.id, error = %e, "Delete failed");
                        DispatchOutcome::InternalError
                    }
                }
            }
        }
    }

    /// Bound one store call with the configured timeout.
    async fn timed<T>(
        &self,
        operation: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.store_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.store_timeout)),
        }
    }

    /// Reads are retried once; mutations never are.
    async fn read_with_retry<T, F, Fut>(&self, mut operation: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        match self.timed(operation()).await {
            Ok(value) => Ok(value),
            Err(first) => {
                warn!(error = %first, "Read failed; retrying once");
                self.timed(operation()).await
            }
        }
    }
}
