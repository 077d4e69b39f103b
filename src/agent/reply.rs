//! Response composition — deterministic natural-language templates per
//! dispatch outcome.

use crate::agent::dispatcher::DispatchOutcome;
use crate::todos::model::Todo;

/// Turn a dispatch outcome into the assistant's reply.
///
/// Same outcome, same reply — the templates carry no randomness, and
/// internal failures never leak detail into the text.
pub fn compose_reply(outcome: &DispatchOutcome, _utterance: &str) -> String {
    match outcome {
        DispatchOutcome::Created { todo } => {
            format!("Added \"{}\" to your list.", todo.title)
        }
        DispatchOutcome::Listed { todos } => compose_list(todos),
        DispatchOutcome::Completed { todo } => {
            format!("Marked \"{}\" as complete. Nice work!", todo.title)
        }
        DispatchOutcome::Deleted { todo } => {
            format!("Deleted \"{}\".", todo.title)
        }
        DispatchOutcome::NotFound => {
            "I couldn't find a matching task on your list.".to_string()
        }
        DispatchOutcome::Ambiguous { candidates } => {
            let titles: Vec<String> = candidates
                .iter()
                .map(|t| format!("\"{}\"", t.title))
                .collect();
            format!(
                "I found more than one matching task. Which did you mean: {}?",
                titles.join(" or ")
            )
        }
        DispatchOutcome::Rejected => concat!(
            "I can manage your to-do list. Try \"add a task to buy groceries\", ",
            "\"what do I have to do?\", \"mark <task> as done\", or \"delete <task>\"."
        )
        .to_string(),
        DispatchOutcome::InternalError => {
            "Sorry, something went wrong on my end. Please try again.".to_string()
        }
    }
}

fn compose_list(todos: &[Todo]) -> String {
    if todos.is_empty() {
        return "You have no todos yet. Ask me to add one!".to_string();
    }

    let open = todos.iter().filter(|t| !t.completed).count();
    let mut reply = format!(
        "You have {open} open of {total} task{plural}:",
        total = todos.len(),
        plural = if todos.len() == 1 { "" } else { "s" },
    );
    for todo in todos {
        let marker = if todo.completed { "[x]" } else { "[ ]" };
        reply.push_str(&format!("\n{marker} {}", todo.title));
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use crate::todos::model::Priority;

    fn todo(title: &str, completed: bool) -> Todo {
        Todo {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            title: title.into(),
            description: None,
            priority: Priority::Medium,
            category: None,
            due_date: None,
            completed,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn created_reply_names_the_title() {
        let reply = compose_reply(
            &DispatchOutcome::Created {
                todo: todo("buy groceries", false),
            },
            "Add a task to buy groceries",
        );
        assert_eq!(reply, "Added \"buy groceries\" to your list.");
    }

    #[test]
    fn empty_list_reply_is_explicit() {
        let reply = compose_reply(&DispatchOutcome::Listed { todos: vec![] }, "list");
        assert!(reply.contains("no todos yet"));
    }

    #[test]
    fn list_reply_enumerates_counts_and_titles() {
        let todos = vec![todo("buy groceries", false), todo("file taxes", true)];
        let reply = compose_reply(&DispatchOutcome::Listed { todos }, "what do I have to do?");
        assert!(reply.starts_with("You have 1 open of 2 tasks:"));
        assert!(reply.contains("[ ] buy groceries"));
        assert!(reply.contains("[x] file taxes"));
    }

    #[test]
    fn ambiguous_reply_asks_naming_candidates() {
        let candidates = vec![todo("buy milk", false), todo("buy bread", false)];
        let reply = compose_reply(&DispatchOutcome::Ambiguous { candidates }, "complete buy");
        assert!(reply.contains("\"buy milk\" or \"buy bread\""));
        assert!(reply.ends_with('?'));
    }

    #[test]
    fn not_found_reply_states_it() {
        let reply = compose_reply(&DispatchOutcome::NotFound, "mark task as complete");
        assert!(reply.contains("couldn't find a matching task"));
    }

    #[test]
    fn rejected_reply_lists_supported_actions() {
        let reply = compose_reply(&DispatchOutcome::Rejected, "how is the weather");
        assert!(reply.contains("add a task"));
        assert!(reply.contains("what do I have to do?"));
    }

    #[test]
    fn internal_error_reply_leaks_nothing() {
        let reply = compose_reply(&DispatchOutcome::InternalError, "add a task to x");
        assert!(!reply.to_lowercase().contains("sql"));
        assert!(!reply.to_lowercase().contains("timeout"));
        assert!(reply.contains("Sorry"));
    }

    #[test]
    fn replies_are_deterministic() {
        let outcome = DispatchOutcome::Listed {
            todos: vec![todo("a", false)],
        };
        assert_eq!(
            compose_reply(&outcome, "list"),
            compose_reply(&outcome, "list")
        );
    }
}
