//! Sam's inner life: what happens between conversations
//!
//! - Rumination: periodic private thoughts per session
//! - Heartbeat: periodic proactive outreach to quiet sessions
//! - Reflection: on-demand weekly reflection with evolution notes
//!
//! Both loops run on their own tasks, share nothing with live turns beyond
//! the store and the connection registry, and stop at the next await point
//! once their cancellation token fires.

mod heartbeat;
mod reflection;
mod rumination;

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub use heartbeat::{Heartbeat, HeartbeatConfig, select_trigger};
pub use reflection::{ReflectionService, split_evolution};
pub use rumination::{Rumination, RuminationConfig, next_thought_type};

use crate::agent::ContextSegment;
use crate::db::{MemoryRecord, Message, MessageRole};

/// Drive a periodic pass until cancelled
///
/// Sleeps `startup_delay`, then runs `pass` every `interval`. A pass that
/// overruns its interval delays the next one instead of bursting.
pub(crate) async fn run_periodic<F, Fut>(
    name: &'static str,
    startup_delay: Duration,
    interval: Duration,
    cancel: CancellationToken,
    mut pass: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = usize>,
{
    tracing::info!(
        task = name,
        startup_delay_secs = startup_delay.as_secs(),
        interval_secs = interval.as_secs(),
        "background loop scheduled"
    );

    tokio::select! {
        () = cancel.cancelled() => {
            tracing::info!(task = name, "background loop cancelled before first pass");
            return;
        }
        () = tokio::time::sleep(startup_delay) => {}
    }

    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            produced = pass() => {
                tracing::debug!(task = name, produced, "background pass finished");
            }
        }
    }

    tracing::info!(task = name, "background loop stopped");
}

/// Pause between sessions within a pass
pub(crate) async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Render messages as a plain transcript
pub(crate) fn transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| match m.role {
            MessageRole::User => format!("Them: {}", m.content),
            MessageRole::Agent => format!("You: {}", m.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render memories as a bullet list, or a placeholder when there are none
pub(crate) fn memory_excerpt(memories: &[MemoryRecord]) -> String {
    if memories.is_empty() {
        return "Nothing specific yet.".to_string();
    }
    memories
        .iter()
        .map(|m| format!("- {}", m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Persona plus a task instruction as the system segment
pub(crate) fn private_prompt(persona: &str, instruction: &str, material: String) -> Vec<ContextSegment> {
    let system = if persona.is_empty() {
        instruction.to_string()
    } else {
        format!("{}\n\n{instruction}", persona.trim_end())
    };
    vec![ContextSegment::system(system), ContextSegment::user(material)]
}
