//! Keyword-bucket emotion classification

use serde::{Deserialize, Serialize};

/// Emotion / sentiment tag attached to messages and memory records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Laughing,
    Affectionate,
    Thinking,
    Tender,
    Excited,
    /// Never produced by the classifier; used as a fixed sentiment for
    /// preferences and inner-life output
    Curiosity,
    Neutral,
}

impl Emotion {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Laughing => "laughing",
            Self::Affectionate => "affectionate",
            Self::Thinking => "thinking",
            Self::Tender => "tender",
            Self::Excited => "excited",
            Self::Curiosity => "curiosity",
            Self::Neutral => "neutral",
        }
    }

    /// Parse a stored tag, falling back to `Neutral` for unknown values
    #[must_use]
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "laughing" => Self::Laughing,
            "affectionate" => Self::Affectionate,
            "thinking" => Self::Thinking,
            "tender" => Self::Tender,
            "excited" => Self::Excited,
            "curiosity" => Self::Curiosity,
            _ => Self::Neutral,
        }
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classifies free text into an emotion tag
///
/// Implementations must be deterministic: the same text always yields the
/// same tag.
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Emotion;
}

/// Ordered keyword buckets; the first bucket with a matching keyword wins
const BUCKETS: &[(Emotion, &[&str])] = &[
    (
        Emotion::Laughing,
        &["haha", "laugh", "funny", "hilarious", "hehe", "lol"],
    ),
    (
        Emotion::Affectionate,
        &["love", "adore", "beautiful", "wonderful", "heart"],
    ),
    (
        Emotion::Thinking,
        &["think", "wonder", "curious", "fascinating", "interesting"],
    ),
    (Emotion::Tender, &["sorry", "miss", "wish", "sad", "hard day"]),
    (
        Emotion::Excited,
        &["excited", "amazing", "wow", "incredible", "yes"],
    ),
];

/// Default classifier: lower-cased substring lookup over fixed buckets
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl EmotionClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Emotion {
        let lower = text.to_lowercase();
        BUCKETS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map_or(Emotion::Neutral, |(emotion, _)| *emotion)
    }
}
