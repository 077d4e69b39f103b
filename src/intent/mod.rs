//! Intent resolution — the classifier contract and the parser that fronts it.
//!
//! The classifier is an external collaborator behind [`IntentClassifier`]:
//! the rules implementation is fully deterministic, the LLM implementation
//! talks to a model through rig-core. [`IntentParser`] is what the
//! orchestrator calls: it bounds the classification with a timeout and
//! degrades a timeout to `Unknown` so a slow model can never hang a turn.

pub mod llm;
pub mod model;
pub mod rules;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::convo::model::ChatMessage;
use crate::error::ClassifyError;

pub use llm::{create_classifier, ClassifierBackend, LlmClassifierConfig};
pub use model::{Intent, IntentKind, TargetRef};
pub use rules::RulesClassifier;

/// Contract the natural-language model must satisfy.
///
/// Implementations classify one utterance (plus recent context) into exactly
/// one intent. Unrecognizable text is `Intent::Unknown`, never an error;
/// errors are reserved for the classifier itself failing. Given identical
/// input, output must be repeatable.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Implementation name, for logs.
    fn name(&self) -> &str;

    async fn classify(
        &self,
        utterance: &str,
        context: &[ChatMessage],
    ) -> Result<Intent, ClassifyError>;
}

/// Timeout-bounded front for a classifier.
pub struct IntentParser {
    classifier: Arc<dyn IntentClassifier>,
    timeout: Duration,
}

impl IntentParser {
    pub fn new(classifier: Arc<dyn IntentClassifier>, timeout: Duration) -> Self {
        Self {
            classifier,
            timeout,
        }
    }

    /// Resolve an utterance into an intent.
    ///
    /// A classification that exceeds the timeout degrades to `Unknown`.
    /// A classifier hard failure propagates for the orchestrator to turn
    /// into an internal-error reply.
    pub async fn resolve(
        &self,
        utterance: &str,
        context: &[ChatMessage],
    ) -> Result<Intent, ClassifyError> {
        match tokio::time::timeout(self.timeout, self.classifier.classify(utterance, context)).await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    classifier = self.classifier.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Classification timed out; degrading to unknown intent"
                );
                Ok(Intent::Unknown)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowClassifier;

    #[async_trait]
    impl IntentClassifier for SlowClassifier {
        fn name(&self) -> &str {
            "slow"
        }

        async fn classify(
            &self,
            _utterance: &str,
            _context: &[ChatMessage],
        ) -> Result<Intent, ClassifyError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Intent::Unknown)
        }
    }

    struct FailingClassifier;

    #[async_trait]
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

    #[tokio::test]
    async fn timeout_degrades_to_unknown() {
        let parser = IntentParser::new(Arc::new(SlowClassifier), Duration::from_millis(20));
        let intent = parser.resolve("anything", &[]).await.unwrap();
        assert_eq!(intent, Intent::Unknown);
    }

    #[tokio::test]
    async fn hard_failure_propagates() {
        let parser = IntentParser::new(Arc::new(FailingClassifier), Duration::from_secs(1));
        assert!(parser.resolve("anything", &[]).await.is_err());
    }
}
