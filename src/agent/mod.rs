//! Model collaborator and the live turn pipeline

mod model;
mod turn;

pub use model::{ContextSegment, ModelClient, OpenAiChatClient, SegmentRole};
pub use turn::ChatService;
