//! Live client channel: wire events and the connection registry

mod registry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{Message, MessageRole, ProactiveTrigger};
use crate::memory::Emotion;

pub use registry::{ConnectionHandle, ConnectionRegistry};

/// Advisory avatar state; never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrbState {
    Idle,
    Listening,
    Thinking,
    Speaking,
}

/// Outgoing frame on the live channel
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    /// Socket attached
    Connected { session_id: String },
    /// Reply to a client ping
    Pong,
    /// Avatar state change
    OrbState { state: OrbState },
    /// A persisted dialogue message
    Message {
        id: String,
        role: MessageRole,
        content: String,
        emotion: Emotion,
        timestamp: DateTime<Utc>,
    },
    /// Agent-initiated outreach
    Proactive {
        content: String,
        emotion: Emotion,
        trigger: ProactiveTrigger,
    },
    /// Something went wrong; the socket stays open
    Error { message: String },
}

impl LiveEvent {
    #[must_use]
    pub const fn orb(state: OrbState) -> Self {
        Self::OrbState { state }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

impl From<&Message> for LiveEvent {
    fn from(message: &Message) -> Self {
        Self::Message {
            id: message.id.clone(),
            role: message.role,
            content: message.content.clone(),
            emotion: message.emotion,
            timestamp: message.created_at,
        }
    }
}

/// Incoming frame on the live channel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LiveAction {
    Ping,
    Typing,
    Chat { text: String },
}
