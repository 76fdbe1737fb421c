//! Context assembly for companion turns
//!
//! Combines:
//! - Recent dialogue
//! - Extracted memory records and long-term search hits
//! - The latest weekly reflection
//! - A time-of-day mood

mod builder;
mod mood;

pub use builder::{ContextAssembler, ContextConfig, NOTHING_YET};
pub use mood::Mood;
