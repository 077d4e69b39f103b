//! Integration tests for the chat + todo HTTP API.
//!
//! Each test boots the real Axum app on a random port against an in-memory
//! database and drives it over HTTP with reqwest.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::timeout;

use todo_assist::agent::{ChatOrchestrator, Dispatcher};
use todo_assist::api::{api_routes, AppState};
use todo_assist::auth::{StaticTokenVerifier, TokenVerifier};
use todo_assist::convo::ConversationManager;
use todo_assist::intent::{IntentParser, RulesClassifier};
use todo_assist::store::{Database, LibSqlBackend};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const ALICE: &str = "alice-token";
const BOB: &str = "bob-token";

/// Start the app on a random port. Returns the base URL.
async fn start_server() -> String {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let conversations = Arc::new(ConversationManager::new(Arc::clone(&db)));
    let parser = Arc::new(IntentParser::new(
        Arc::new(RulesClassifier::new()),
        Duration::from_secs(5),
    ));
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&db), Duration::from_secs(5)));
    let orchestrator = Arc::new(ChatOrchestrator::new(
        Arc::clone(&conversations),
        parser,
        dispatcher,
    ));
    let verifier: Arc<dyn TokenVerifier> =
        Arc::new(StaticTokenVerifier::from_spec("alice-token:alice,bob-token:bob"));

    let app = api_routes(AppState {
        db,
        conversations,
        orchestrator,
        verifier,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://127.0.0.1:{port}")
}

async fn chat(base: &str, token: &str, message: &str, conversation_id: Option<&str>) -> Value {
    let mut body = json!({ "message": message });
    if let Some(id) = conversation_id {
        body["conversation_id"] = json!(id);
    }
    let response = reqwest::Client::new()
        .post(format!("{base}/api/chat"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert!(
        response.status().is_success(),
        "chat failed: {}",
        response.status()
    );
    response.json().await.unwrap()
}

async fn get_json(base: &str, token: &str, path: &str) -> Value {
    reqwest::Client::new()
        .get(format!("{base}{path}"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn add_task_creates_conversation_todo_and_two_messages() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;

        let turn = chat(&base, ALICE, "Add a task to buy groceries", None).await;
        assert!(turn["reply"].as_str().unwrap().contains("buy groceries"));
        let conversation_id = turn["conversation_id"].as_str().unwrap().to_string();

        let todos = get_json(&base, ALICE, "/api/todos").await;
        let todos = todos.as_array().unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0]["title"], "buy groceries");
        assert_eq!(todos[0]["completed"], false);

        let detail = get_json(
            &base,
            ALICE,
            &format!("/api/chat/conversations/{conversation_id}"),
        )
        .await;
        let messages = detail["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "Add a task to buy groceries");
        assert_eq!(messages[1]["role"], "assistant");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn list_reply_enumerates_the_open_todo() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        chat(&base, ALICE, "Add a task to buy groceries", None).await;

        let turn = chat(&base, ALICE, "What do I have to do?", None).await;
        let reply = turn["reply"].as_str().unwrap();
        assert!(reply.contains("1 open of 1 task"));
        assert!(reply.contains("buy groceries"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn complete_with_zero_todos_is_a_polite_not_found() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;

        let turn = chat(&base, ALICE, "Mark task as complete", None).await;
        assert!(turn["reply"]
            .as_str()
            .unwrap()
            .contains("couldn't find a matching task"));

        let todos = get_json(&base, ALICE, "/api/todos").await;
        assert!(todos.as_array().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn direct_crud_and_chat_share_one_store() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = reqwest::Client::new();

        // Create via the direct path...
        let created: Value = client
            .post(format!("{base}/api/todos"))
            .bearer_auth(ALICE)
            .json(&json!({ "title": "file taxes", "priority": "high" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(created["priority"], "high");

        // ...immediately visible to the chat path.
        let turn = chat(&base, ALICE, "What do I have to do?", None).await;
        assert!(turn["reply"].as_str().unwrap().contains("file taxes"));

        // Complete via chat, visible to the direct path.
        chat(&base, ALICE, "mark file taxes as done", None).await;
        let todos = get_json(&base, ALICE, "/api/todos").await;
        assert_eq!(todos.as_array().unwrap()[0]["completed"], true);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn toggle_update_and_delete_endpoints() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = reqwest::Client::new();

        let created: Value = client
            .post(format!("{base}/api/todos"))
            .bearer_auth(ALICE)
            .json(&json!({ "title": "walk dog" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        let toggled: Value = client
            .patch(format!("{base}/api/todos/{id}/complete"))
            .bearer_auth(ALICE)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(toggled["completed"], true);

        let updated: Value = client
            .put(format!("{base}/api/todos/{id}"))
            .bearer_auth(ALICE)
            .json(&json!({ "title": "walk the dog", "category": "chores" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(updated["title"], "walk the dog");
        assert_eq!(updated["category"], "chores");
        assert_eq!(updated["completed"], true);

        let deleted = client
            .delete(format!("{base}/api/todos/{id}"))
            .bearer_auth(ALICE)
            .send()
            .await
            .unwrap();
        assert!(deleted.status().is_success());

        let gone = client
            .get(format!("{base}/api/todos/{id}"))
            .bearer_auth(ALICE)
            .send()
            .await
            .unwrap();
        assert_eq!(gone.status(), reqwest::StatusCode::NOT_FOUND);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn owners_are_isolated_across_every_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = reqwest::Client::new();

        let turn = chat(&base, ALICE, "Add a task to plan the trip", None).await;
        let conversation_id = turn["conversation_id"].as_str().unwrap().to_string();

        // Bob sees no todos and cannot read Alice's conversation.
        let todos = get_json(&base, BOB, "/api/todos").await;
        assert!(todos.as_array().unwrap().is_empty());

        let response = client
            .get(format!("{base}/api/chat/conversations/{conversation_id}"))
            .bearer_auth(BOB)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

        // Bob's chat resolution never touches Alice's list.
        let turn = chat(&base, BOB, "mark plan the trip as done", None).await;
        assert!(turn["reply"].as_str().unwrap().contains("couldn't find"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn conversations_list_most_recent_first() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;

        let first = chat(&base, ALICE, "Add a task to buy milk", None).await;
        let second = chat(&base, ALICE, "Add a task to buy bread", None).await;
        // Touch the first conversation again.
        chat(
            &base,
            ALICE,
            "What do I have to do?",
            first["conversation_id"].as_str(),
        )
        .await;

        let listed = get_json(&base, ALICE, "/api/chat/conversations").await;
        let listed = listed.as_array().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0]["id"], first["conversation_id"]);
        assert_eq!(listed[1]["id"], second["conversation_id"]);
        assert_eq!(listed[0]["title"], "Add a task to buy milk");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn requests_without_a_valid_token_are_rejected() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = reqwest::Client::new();

        let missing = client
            .get(format!("{base}/api/todos"))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::UNAUTHORIZED);

        let wrong = client
            .post(format!("{base}/api/chat"))
            .bearer_auth("not-a-token")
            .json(&json!({ "message": "Add a task to hack" }))
            .send()
            .await
            .unwrap();
        assert_eq!(wrong.status(), reqwest::StatusCode::UNAUTHORIZED);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn empty_chat_message_is_a_bad_request() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/chat"))
            .bearer_auth(ALICE)
            .json(&json!({ "message": "   " }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn delete_conversation_removes_it_from_history() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = reqwest::Client::new();

        let turn = chat(&base, ALICE, "Add a task to buy stamps", None).await;
        let conversation_id = turn["conversation_id"].as_str().unwrap().to_string();

        let deleted = client
            .delete(format!("{base}/api/chat/conversations/{conversation_id}"))
            .bearer_auth(ALICE)
            .send()
            .await
            .unwrap();
        assert!(deleted.status().is_success());

        let listed = get_json(&base, ALICE, "/api/chat/conversations").await;
        assert!(listed.as_array().unwrap().is_empty());

        // The todo itself is unaffected — only the conversation log is gone.
        let todos = get_json(&base, ALICE, "/api/todos").await;
        assert_eq!(todos.as_array().unwrap().len(), 1);
    })
    .await
    .expect("test timed out");
}
