//! LLM-backed intent classifier.
//!
//! Uses rig-core for HTTP transport, the same way the service would talk to
//! any completion provider. The model is prompted for a single JSON object;
//! anything the model gets wrong (bad JSON, unknown action, low confidence)
//! degrades to `Unknown` rather than failing the turn.

use std::sync::Arc;

use async_trait::async_trait;
use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::{CompletionModel, Prompt};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::convo::model::{ChatMessage, Role};
use crate::error::ClassifyError;
use crate::intent::model::{Intent, TargetRef};
use crate::intent::IntentClassifier;
use crate::todos::model::{TodoDraft, TodoFilter};

/// Supported classifier backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierBackend {
    Anthropic,
    OpenAi,
}

/// Configuration for creating an LLM classifier.
#[derive(Debug, Clone)]
pub struct LlmClassifierConfig {
    pub backend: ClassifierBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    /// Intents below this confidence degrade to `Unknown`.
    pub confidence_threshold: f32,
}

const CLASSIFY_PREAMBLE: &str = r#"You classify a user's message into exactly one to-do action.
Reply with a single JSON object and nothing else:
{"action": "create" | "list" | "complete" | "delete" | "none",
 "title": string or null,            // for create: the todo title, verbatim
 "description": string or null,      // for create: optional detail
 "target": string or null,           // for complete/delete: how the user referred to the todo
 "ordinal": integer or null,         // for complete/delete: 1-based position, if the user used one
 "completed_filter": boolean or null,// for list: true = completed only, false = open only
 "category": string or null,         // for list: category filter
 "confidence": number}               // 0.0 - 1.0
Use "none" when the message is not a to-do request. Never invent a title."#;

/// What the model is asked to emit.
#[derive(Debug, Deserialize)]
struct ModelReply {
    action: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    ordinal: Option<i64>,
    #[serde(default)]
    completed_filter: Option<bool>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// rig-backed classifier, generic over the provider's completion model.
pub struct LlmClassifier<M: CompletionModel> {
    agent: Agent<M>,
    model: String,
    threshold: f32,
}

/// Create an LLM classifier from configuration.
pub fn create_classifier(
    config: &LlmClassifierConfig,
) -> Result<Arc<dyn IntentClassifier>, ClassifyError> {
    match config.backend {
        ClassifierBackend::Anthropic => create_anthropic_classifier(config),
        ClassifierBackend::OpenAi => create_openai_classifier(config),
    }
}

fn create_anthropic_classifier(
    config: &LlmClassifierConfig,
) -> Result<Arc<dyn IntentClassifier>, ClassifyError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            ClassifyError::Backend {
                backend: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {e}"),
            }
        })?;

    let agent = client
        .agent(&config.model)
        .preamble(CLASSIFY_PREAMBLE)
        .temperature(0.0)
        .max_tokens(512)
        .build();
    tracing::info!("Using Anthropic classifier (model: {})", config.model);
    Ok(Arc::new(LlmClassifier {
        agent,
        model: config.model.clone(),
        threshold: config.confidence_threshold,
    }))
}

fn create_openai_classifier(
    config: &LlmClassifierConfig,
) -> Result<Arc<dyn IntentClassifier>, ClassifyError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            ClassifyError::Backend {
                backend: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {e}"),
            }
        })?;

    let agent = client
        .agent(&config.model)
        .preamble(CLASSIFY_PREAMBLE)
        .temperature(0.0)
        .max_tokens(512)
        .build();
    tracing::info!("Using OpenAI classifier (model: {})", config.model);
    Ok(Arc::new(LlmClassifier {
        agent,
        model: config.model.clone(),
        threshold: config.confidence_threshold,
    }))
}

#[async_trait]
impl<M: CompletionModel> IntentClassifier for LlmClassifier<M> {
    fn name(&self) -> &str {
        &self.model
    }

    async fn classify(
        &self,
        utterance: &str,
        context: &[ChatMessage],
    ) -> Result<Intent, ClassifyError> {
        let prompt = build_prompt(utterance, context);
        let raw = self
            .agent
            .prompt(prompt)
            .await
            .map_err(|e| ClassifyError::Backend {
                backend: self.model.clone(),
                reason: e.to_string(),
            })?;

        Ok(parse_model_reply(&raw, self.threshold))
    }
}

/// Render the recent conversation plus the current utterance for the model.
fn build_prompt(utterance: &str, context: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    if !context.is_empty() {
        prompt.push_str("Recent conversation:\n");
        for message in context {
            let speaker = match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            prompt.push_str(&format!("{speaker}: {}\n", message.content));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!("Message to classify: {utterance}"));
    prompt
}

/// Map the model's JSON reply to an intent. Anything unusable is `Unknown`.
fn parse_model_reply(raw: &str, threshold: f32) -> Intent {
    let Some(json) = extract_json_object(raw) else {
        warn!(reply = %raw.chars().take(120).collect::<String>(), "Classifier reply had no JSON object");
        return Intent::Unknown;
    };

    let reply: ModelReply = match serde_json::from_str(json) {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "Classifier reply failed to parse");
            return Intent::Unknown;
        }
    };

    if reply.confidence.unwrap_or(0.0) < threshold {
        debug!(confidence = reply.confidence, "Classifier confidence below threshold");
        return Intent::Unknown;
    }

    match reply.action.as_str() {
        "create" => {
            let title = reply.title.map(|t| t.trim().to_string()).unwrap_or_default();
            if title.is_empty() {
                return Intent::Unknown;
            }
            let mut draft = TodoDraft::new(title);
            draft.description = reply.description.filter(|d| !d.trim().is_empty());
            Intent::CreateTodo { draft }
        }
        "list" => Intent::ListTodos {
            filter: TodoFilter {
                completed: reply.completed_filter,
                category: reply.category,
            },
        },
        "complete" => Intent::CompleteTodo {
            target: reply_target(reply.target, reply.ordinal),
        },
        "delete" => Intent::DeleteTodo {
            target: reply_target(reply.target, reply.ordinal),
        },
        _ => Intent::Unknown,
    }
}

fn reply_target(target: Option<String>, ordinal: Option<i64>) -> TargetRef {
    if let Some(n) = ordinal {
        if n >= 1 {
            return TargetRef::Ordinal(n as usize);
        }
    }
    match target.map(|t| t.trim().to_string()) {
        Some(text) if text.eq_ignore_ascii_case("last") => TargetRef::Last,
        Some(text) if !text.is_empty() => TargetRef::Text(text),
        _ => TargetRef::Any,
    }
}

/// Pull the first balanced-looking JSON object out of a model reply that
/// may be wrapped in prose or code fences.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}
