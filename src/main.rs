use std::sync::Arc;

use todo_assist::agent::{ChatOrchestrator, Dispatcher};
use todo_assist::api::{api_routes, AppState};
use todo_assist::auth::{StaticTokenVerifier, TokenVerifier};
use todo_assist::config::ServerConfig;
use todo_assist::convo::ConversationManager;
use todo_assist::intent::{
    create_classifier, ClassifierBackend, IntentClassifier, IntentParser, LlmClassifierConfig,
    RulesClassifier,
};
use todo_assist::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env()?;

    eprintln!("📋 Todo Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Chat API: http://{}/api/chat", config.bind_addr);
    eprintln!("   Todo API: http://{}/api/todos", config.bind_addr);

    // ── Database ────────────────────────────────────────────────────────
    let db_path = std::path::Path::new(&config.db_path);
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(db_path).await.unwrap_or_else(
        |e| {
            eprintln!("Error: Failed to open database at {}: {}", config.db_path, e);
            std::process::exit(1);
        },
    ));
    eprintln!("   Database: {}", config.db_path);

    // ── Intent classifier ───────────────────────────────────────────────
    let classifier: Arc<dyn IntentClassifier> = match config.model_api_key {
        Some(ref api_key) => {
            let classifier_config = LlmClassifierConfig {
                backend: ClassifierBackend::Anthropic,
                api_key: api_key.clone(),
                model: config.model.clone(),
                confidence_threshold: 0.5,
            };
            let classifier = create_classifier(&classifier_config)?;
            eprintln!("   Classifier: {} (LLM)", config.model);
            classifier
        }
        None => {
            eprintln!("   Classifier: rules (set TODO_ASSIST_API_KEY for the LLM classifier)");
            Arc::new(RulesClassifier::new())
        }
    };

    // ── Auth ────────────────────────────────────────────────────────────
    let verifier = StaticTokenVerifier::from_spec(&config.api_tokens);
    if verifier.is_empty() {
        eprintln!("   Warning: TODO_ASSIST_API_TOKENS is empty — every request will be rejected");
    }
    let verifier: Arc<dyn TokenVerifier> = Arc::new(verifier);

    // ── Core wiring ─────────────────────────────────────────────────────
    let conversations = Arc::new(ConversationManager::new(Arc::clone(&db)));
    let parser = Arc::new(IntentParser::new(classifier, config.classify_timeout));
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&db), config.store_timeout));
    let orchestrator = Arc::new(ChatOrchestrator::new(
        Arc::clone(&conversations),
        parser,
        dispatcher,
    ));

    let state = AppState {
        db,
        conversations,
        orchestrator,
        verifier,
    };

    let app = api_routes(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Server started");
    axum::serve(listener, app).await?;

    Ok(())
}
