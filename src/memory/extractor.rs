//! Heuristic memory extraction from user utterances
//!
//! Each rule maps a set of trigger phrases to a memory category and a
//! sentiment policy. Rules are not mutually exclusive: an utterance yields
//! one draft per rule it triggers, in rule order.

use std::sync::Arc;

use super::classifier::{Emotion, EmotionClassifier, KeywordClassifier};
use crate::db::{MemoryCategory, MemoryRecord};

/// How a rule derives the sentiment of its draft
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentimentPolicy {
    /// Always the same tag
    Fixed(Emotion),
    /// Run the shared classifier over the utterance
    Classified,
}

/// A single keyword-membership rule
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    pub category: MemoryCategory,
    pub triggers: &'static [&'static str],
    pub sentiment: SentimentPolicy,
    /// Store as `User said: <text>` rather than the bare utterance
    pub quote: bool,
}

/// Built-in rule set
#[must_use]
pub fn default_rules() -> Vec<ExtractionRule> {
    vec![
        ExtractionRule {
            category: MemoryCategory::Person,
            triggers: &[
                "my name is",
                "i'm called",
                "call me",
                "my wife",
                "my husband",
                "my partner",
                "my friend",
                "my mom",
                "my dad",
                "my sister",
                "my brother",
            ],
            sentiment: SentimentPolicy::Fixed(Emotion::Neutral),
            quote: true,
        },
        ExtractionRule {
            category: MemoryCategory::Preference,
            triggers: &[
                "i love",
                "i hate",
                "i enjoy",
                "i prefer",
                "i like",
                "my favorite",
            ],
            sentiment: SentimentPolicy::Fixed(Emotion::Curiosity),
            quote: false,
        },
        ExtractionRule {
            category: MemoryCategory::Event,
            triggers: &[
                "today",
                "yesterday",
                "tomorrow",
                "this morning",
                "last night",
                "i had",
                "i went",
            ],
            sentiment: SentimentPolicy::Classified,
            quote: false,
        },
        ExtractionRule {
            category: MemoryCategory::Feeling,
            triggers: &[
                "i feel",
                "feeling",
                "i'm sad",
                "i'm happy",
                "i'm anxious",
                "i'm stressed",
                "i'm tired",
                "lonely",
            ],
            sentiment: SentimentPolicy::Classified,
            quote: false,
        },
    ]
}

/// A memory record that has not been persisted yet
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryDraft {
    pub content: String,
    pub category: MemoryCategory,
    pub sentiment: Emotion,
}

impl MemoryDraft {
    /// Attach the draft to a session as a weight-1 record
    #[must_use]
    pub fn into_record(self, session_id: &str) -> MemoryRecord {
        MemoryRecord::new(session_id, self.category, self.content, self.sentiment)
    }
}

/// Rule-driven extractor over an injectable emotion classifier
#[derive(Clone)]
pub struct MemoryExtractor {
    classifier: Arc<dyn EmotionClassifier>,
    rules: Vec<ExtractionRule>,
}

impl MemoryExtractor {
    /// Create an extractor with the built-in rules
    #[must_use]
    pub fn new(classifier: Arc<dyn EmotionClassifier>) -> Self {
        Self::with_rules(classifier, default_rules())
    }

    /// Create an extractor with a custom rule set
    #[must_use]
    pub fn with_rules(classifier: Arc<dyn EmotionClassifier>, rules: Vec<ExtractionRule>) -> Self {
        Self { classifier, rules }
    }

    /// The classifier shared with callers that tag replies
    #[must_use]
    pub fn classifier(&self) -> &dyn EmotionClassifier {
        self.classifier.as_ref()
    }

    /// Extract memory drafts from one exchange
    ///
    /// Only the user's utterance is mined; the reply is accepted so rule sets
    /// that look at both sides can be swapped in without changing callers.
    #[must_use]
    pub fn extract(&self, user_text: &str, _reply_text: &str) -> Vec<MemoryDraft> {
        let trimmed = user_text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let lower = trimmed.to_lowercase().replace('\u{2019}', "'");

        self.rules
            .iter()
            .filter(|rule| rule.triggers.iter().any(|t| lower.contains(t)))
            .map(|rule| MemoryDraft {
                content: if rule.quote {
                    format!("User said: {trimmed}")
                } else {
                    trimmed.to_string()
                },
                category: rule.category,
                sentiment: match rule.sentiment {
                    SentimentPolicy::Fixed(tag) => tag,
                    SentimentPolicy::Classified => self.classifier.classify(trimmed),
                },
            })
            .collect()
    }
}

impl Default for MemoryExtractor {
    fn default() -> Self {
        Self::new(Arc::new(KeywordClassifier))
    }
}

impl std::fmt::Debug for MemoryExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryExtractor")
            .field("rules", &self.rules.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories(drafts: &[MemoryDraft]) -> Vec<MemoryCategory> {
        drafts.iter().map(|d| d.category).collect()
    }

    #[test]
    fn name_yields_single_person_record() {
        let drafts = MemoryExtractor::default().extract("my name is Alex", "Hi Alex");
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].category, MemoryCategory::Person);
        assert_eq!(drafts[0].sentiment, Emotion::Neutral);
        assert_eq!(drafts[0].content, "User said: my name is Alex");
    }

    #[test]
    fn rules_are_not_exclusive() {
        let drafts = MemoryExtractor::default()
            .extract("Today I went hiking and I love the mountains", "");
        assert_eq!(
            categories(&drafts),
            vec![MemoryCategory::Preference, MemoryCategory::Event]
        );
        // Event sentiment comes from the classifier ("love" -> affectionate)
        assert_eq!(drafts[1].sentiment, Emotion::Affectionate);
        assert_eq!(drafts[0].sentiment, Emotion::Curiosity);
    }

    #[test]
    fn feeling_uses_classifier() {
        let drafts = MemoryExtractor::default().extract("I feel sad and I miss home", "");
        assert_eq!(categories(&drafts), vec![MemoryCategory::Feeling]);
        assert_eq!(drafts[0].sentiment, Emotion::Tender);
    }

    #[test]
    fn curly_apostrophe_matches() {
        let drafts = MemoryExtractor::default().extract("I\u{2019}m called Jo", "");
        assert_eq!(categories(&drafts), vec![MemoryCategory::Person]);
    }

    #[test]
    fn small_talk_yields_nothing() {
        assert!(MemoryExtractor::default().extract("hey there", "hi!").is_empty());
        assert!(MemoryExtractor::default().extract("   ", "").is_empty());
    }

    #[test]
    fn extraction_is_deterministic() {
        let extractor = MemoryExtractor::default();
        let text = "Yesterday I had a wonderful dinner, I feel amazing, call me Sam";
        let first = extractor.extract(text, "");
        for _ in 0..10 {
            assert_eq!(extractor.extract(text, ""), first);
        }
    }

    #[test]
    fn classifier_is_swappable() {
        struct AlwaysTender;
        impl EmotionClassifier for AlwaysTender {
            fn classify(&self, _text: &str) -> Emotion {
                Emotion::Tender
            }
        }

        let extractor = MemoryExtractor::new(Arc::new(AlwaysTender));
        let drafts = extractor.extract("today was great", "");
        assert_eq!(drafts[0].sentiment, Emotion::Tender);
    }
}
