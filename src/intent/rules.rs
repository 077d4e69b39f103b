//! Deterministic rules classifier — compiled regex tables, first match wins.
//!
//! Covers the common task-management phrasings without any model call.
//! Identical input always yields an identical intent, which is what the
//! test suite runs against.

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::convo::model::ChatMessage;
use crate::error::ClassifyError;
use crate::intent::model::{Intent, TargetRef};
use crate::intent::IntentClassifier;
use crate::todos::model::{Priority, TodoDraft, TodoFilter};

/// Regex-table classifier.
pub struct RulesClassifier {
    complete_patterns: Vec<Regex>,
    delete_patterns: Vec<Regex>,
    create_patterns: Vec<Regex>,
    list_patterns: Vec<Regex>,
    priority: Regex,
    completed_filter: Regex,
    open_filter: Regex,
    category_filter: Regex,
    lead_words: Regex,
    noun_words: Regex,
    ordinal: Regex,
    last_ref: Regex,
}

impl RulesClassifier {
    pub fn new() -> Self {
        Self {
            // Group 1 of each pattern captures the target reference.
            complete_patterns: vec![
                Regex::new(r"(?i)^(?:please\s+)?mark\s+(.+?)\s+as\s+(?:complete|completed|done|finished)[\s.!?]*$")
                    .unwrap(),
                Regex::new(r"(?i)^(?:please\s+)?(?:complete|finish|check\s+off)\s+(.+)$").unwrap(),
                Regex::new(r"(?i)^i(?:'ve|\s+have)?\s+(?:finished|completed|done)\s+(.+)$").unwrap(),
            ],
            delete_patterns: vec![
                Regex::new(r"(?i)^(?:please\s+)?(?:delete|remove|drop|get\s+rid\s+of)\s+(.+)$")
                    .unwrap(),
            ],
            // Group 1 captures the title.
            create_patterns: vec![
                Regex::new(
                    r"(?i)^(?:please\s+)?(?:add|create|make)\s+(?:a\s+|another\s+|new\s+)*(?:task|todo|to-do|item|reminder)\s*(?:to\s+|for\s+|called\s+|named\s+|titled\s+|:\s*)?(.*)$",
                )
                .unwrap(),
                Regex::new(r"(?i)^(?:please\s+)?remind\s+me\s+to\s+(.+)$").unwrap(),
                Regex::new(r"(?i)^(?:a\s+)?new\s+(?:task|todo|to-do)\s*[:\-]?\s*(.+)$").unwrap(),
                Regex::new(r"(?i)^(?:please\s+)?(?:add|create)\s+(.+)$").unwrap(),
            ],
            list_patterns: vec![
                Regex::new(
                    r"(?i)^what(?:'s|\s+is)?\s+(?:do\s+i\s+(?:have|need)\s+to\s+do|on\s+my\s+(?:list|plate)|left\s+to\s+do)",
                )
                .unwrap(),
                Regex::new(r"(?i)\b(?:list|show|display|view)\b.*\b(?:tasks?|todos?|to-dos?|list)\b")
                    .unwrap(),
                Regex::new(r"(?i)^what\s+(?:are\s+my|do\s+i\s+have)\b").unwrap(),
            ],
            priority: Regex::new(r"(?i)\b(high|low)\s+priority\b").unwrap(),
            completed_filter: Regex::new(r"(?i)\b(?:completed|done|finished)\b").unwrap(),
            open_filter: Regex::new(r"(?i)\b(?:open|pending|remaining|left|unfinished)\b").unwrap(),
            category_filter: Regex::new(
                r"(?i)\b(?:in|under)\s+(?:the\s+)?([a-z0-9_-]+)\s+category\b",
            )
            .unwrap(),
            lead_words: Regex::new(r"(?i)^(?:the|my|that|this)\s+").unwrap(),
            noun_words: Regex::new(
                r"(?i)^(?:task|todo|to-do|item)\b\s*(?:called\s+|named\s+|titled\s+)?",
            )
            .unwrap(),
            ordinal: Regex::new(
                r"(?i)^(first|second|third|fourth|fifth|sixth|seventh|eighth|ninth|tenth|\d+(?:st|nd|rd|th))(?:\s+(?:one|task|todo|item))?$",
            )
            .unwrap(),
            last_ref: Regex::new(r"(?i)^last(?:\s+(?:one|task|todo|item))?$").unwrap(),
        }
    }

    /// Normalize a captured reference fragment into a [`TargetRef`].
    fn parse_target(&self, raw: &str) -> TargetRef {
        let mut fragment = raw
            .trim()
            .trim_matches(|c| matches!(c, '"' | '\'' | '.' | '!' | '?' | ','))
            .trim()
            .to_string();

        if let Some(m) = self.lead_words.find(&fragment) {
            fragment = fragment[m.end()..].to_string();
        }
        if let Some(m) = self.noun_words.find(&fragment) {
            fragment = fragment[m.end()..].to_string();
        }
        let fragment = fragment.trim();

        if fragment.is_empty()
            || matches!(
                fragment.to_lowercase().as_str(),
                "task" | "todo" | "to-do" | "item" | "it" | "one" | "that" | "this"
            )
        {
            return TargetRef::Any;
        }
        if self.last_ref.is_match(fragment) {
            return TargetRef::Last;
        }
        if let Some(caps) = self.ordinal.captures(fragment) {
            if let Some(n) = ordinal_value(&caps[1]) {
                return TargetRef::Ordinal(n);
            }
        }
        TargetRef::Text(fragment.to_string())
    }

    /// Extract a title for a create intent; empty means not extractable.
    fn parse_title(&self, raw: &str) -> (String, Option<Priority>) {
        let priority = self.priority.captures(raw).map(|caps| {
            if caps[1].eq_ignore_ascii_case("high") {
                Priority::High
            } else {
                Priority::Low
            }
        });

        // The priority phrase is an instruction, not part of the title.
        let cleaned = if priority.is_some() {
            let stripped = self.priority.replace_all(raw, "");
            let stripped = stripped.trim();
            // "pay rent with high priority" leaves a dangling "with".
            stripped
                .strip_suffix("with")
                .unwrap_or(stripped)
                .to_string()
        } else {
            raw.to_string()
        };
        let title = cleaned
            .trim()
            .trim_matches(|c| matches!(c, '"' | '\'' | '.' | '!' | '?' | ','))
            .trim()
            .to_string();

        (title, priority)
    }

    fn parse_list_filter(&self, utterance: &str) -> TodoFilter {
        let completed = if self.completed_filter.is_match(utterance) {
            Some(true)
        } else if self.open_filter.is_match(utterance) {
            Some(false)
        } else {
            None
        };
        let category = self
            .category_filter
            .captures(utterance)
            .map(|caps| caps[1].to_string());
        TodoFilter {
            completed,
            category,
        }
    }
}

impl Default for RulesClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn ordinal_value(word: &str) -> Option<usize> {
    let lower = word.to_lowercase();
    let value = match lower.as_str() {
        "first" => 1,
        "second" => 2,
        "third" => 3,
        "fourth" => 4,
        "fifth" => 5,
        "sixth" => 6,
        "seventh" => 7,
        "eighth" => 8,
        "ninth" => 9,
        "tenth" => 10,
        _ => lower
            .trim_end_matches(|c: char| c.is_ascii_alphabetic())
            .parse()
            .ok()?,
    };
    (value >= 1).then_some(value)
}

#[async_trait]
impl IntentClassifier for RulesClassifier {
    fn name(&self) -> &str {
        "rules"
    }

    async fn classify(
        &self,
        utterance: &str,
        _context: &[ChatMessage],
    ) -> Result<Intent, ClassifyError> {
        let text = utterance.trim();

        for pattern in &self.complete_patterns {
            if let Some(caps) = pattern.captures(text) {
                let target = self.parse_target(&caps[1]);
                debug!(target = %target.describe(), "Matched complete pattern");
                return Ok(Intent::CompleteTodo { target });
            }
        }

        for pattern in &self.delete_patterns {
            if let Some(caps) = pattern.captures(text) {
                let target = self.parse_target(&caps[1]);
                debug!(target = %target.describe(), "Matched delete pattern");
                return Ok(Intent::DeleteTodo { target });
            }
        }

        for pattern in &self.create_patterns {
            if let Some(caps) = pattern.captures(text) {
                let (title, priority) = self.parse_title(&caps[1]);
                if title.is_empty() {
                    // No extractable title — never create an empty todo.
                    debug!("Create pattern matched without a title");
                    return Ok(Intent::Unknown);
                }
                debug!(title = %title, "Matched create pattern");
                let mut draft = TodoDraft::new(title);
                draft.priority = priority;
                return Ok(Intent::CreateTodo { draft });
            }
        }

        for pattern in &self.list_patterns {
            if pattern.is_match(text) {
                let filter = self.parse_list_filter(text);
                debug!(?filter, "Matched list pattern");
                return Ok(Intent::ListTodos { filter });
            }
        }

        Ok(Intent::Unknown)
    }
}
