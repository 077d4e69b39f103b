//! Typed intents — the classification contract's output shape.
//!
//! An intent is transient: produced for one turn, consumed by dispatch,
//! never persisted.

use serde::{Deserialize, Serialize};

use crate::todos::model::{TodoDraft, TodoFilter};

/// The enumerated intent kinds. Used for logging and tests; the payload
/// lives on [`Intent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    CreateTodo,
    ListTodos,
    CompleteTodo,
    DeleteTodo,
    Unknown,
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CreateTodo => "create_todo",
            Self::ListTodos => "list_todos",
            Self::CompleteTodo => "complete_todo",
            Self::DeleteTodo => "delete_todo",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// How the user referred to an existing todo.
///
/// The classifier extracts the reference verbatim; resolving it against
/// the owner's current list is the dispatcher's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRef {
    /// Free-text fragment matched case-insensitively against titles.
    Text(String),
    /// 1-based position in creation order ("the first one").
    Ordinal(usize),
    /// The most recently created candidate ("the last one").
    Last,
    /// A bare reference ("the task", "it") that names no specific todo;
    /// matches every candidate, so anything but exactly one is ambiguous
    /// or not found.
    Any,
}

impl TargetRef {
    /// Short human description for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Text(s) => format!("\"{s}\""),
            Self::Ordinal(n) => format!("#{n}"),
            Self::Last => "last".to_string(),
            Self::Any => "any".to_string(),
        }
    }
}

/// A resolved user intent with its extracted parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    CreateTodo { draft: TodoDraft },
    ListTodos { filter: TodoFilter },
    CompleteTodo { target: TargetRef },
    DeleteTodo { target: TargetRef },
    Unknown,
}

impl Intent {
    pub fn kind(&self) -> IntentKind {
        match self {
            Self::CreateTodo { .. } => IntentKind::CreateTodo,
            Self::ListTodos { .. } => IntentKind::ListTodos,
            Self::CompleteTodo { .. } => IntentKind::CompleteTodo,
            Self::DeleteTodo { .. } => IntentKind::DeleteTodo,
            Self::Unknown => IntentKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let intent = Intent::CompleteTodo {
            target: TargetRef::Any,
        };
        assert_eq!(intent.kind(), IntentKind::CompleteTodo);
        assert_eq!(intent.kind().to_string(), "complete_todo");
    }

    #[test]
    fn intent_kind_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&IntentKind::CreateTodo).unwrap(),
            "\"create_todo\""
        );
    }
}
