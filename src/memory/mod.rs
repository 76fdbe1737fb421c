//! Memory extraction for the live turn pipeline
//!
//! - Emotion classification (keyword buckets, swappable)
//! - Heuristic extraction of memory drafts from user utterances

mod classifier;
mod extractor;

pub use classifier::{Emotion, EmotionClassifier, KeywordClassifier};
pub use extractor::{ExtractionRule, MemoryDraft, MemoryExtractor, SentimentPolicy, default_rules};
