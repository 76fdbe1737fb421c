//! Sam - a memory-augmented companion gateway
//!
//! This library provides the core functionality for the companion backend:
//! - Live turns over WebSocket and REST with memory extraction
//! - Context assembly from history, memories, reflections and long-term search
//! - Background rumination and proactive heartbeat loops
//! - Weekly reflections
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Interfaces                        │
//! │        WebSocket /ws/{session}  │  REST /api         │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Companion core                      │
//! │  ChatService │ ContextAssembler │ Rumination │ Heartbeat │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Collaborators                        │
//! │  SessionStore (SQLite) │ ModelClient │ LongTermMemory │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod context;
pub mod daemon;
pub mod db;
pub mod error;
pub mod inner_life;
pub mod live;
pub mod longterm;
pub mod memory;
pub mod persona;

pub use config::Config;
pub use daemon::Daemon;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
pub use persona::Persona;
