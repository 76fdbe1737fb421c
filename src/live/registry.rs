//! Registry of live client connections keyed by session

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use super::LiveEvent;

/// Outbound half of one attached client
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    connection_id: String,
    tx: mpsc::Sender<LiveEvent>,
}

impl ConnectionHandle {
    /// Wrap a sender with a fresh connection id
    #[must_use]
    pub fn new(tx: mpsc::Sender<LiveEvent>) -> Self {
        Self {
            connection_id: Uuid::new_v4().to_string(),
            tx,
        }
    }

    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }
}

/// Routes asynchronously produced events to whichever client is attached
///
/// At most one handle per session; registering again replaces the old one.
/// Contents are process-local and start empty on every boot.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    handles: Arc<RwLock<HashMap<String, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a handle, returning the one it replaced
    pub async fn register(&self, session_id: &str, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let replaced = self
            .handles
            .write()
            .await
            .insert(session_id.to_string(), handle);

        if let Some(old) = &replaced {
            tracing::debug!(
                session_id,
                connection_id = %old.connection_id,
                "replaced live connection"
            );
        }
        replaced
    }

    /// Detach whatever handle the session has; no-op when none
    pub async fn unregister(&self, session_id: &str) -> bool {
        self.handles.write().await.remove(session_id).is_some()
    }

    /// Detach only if the session's handle is still `connection_id`
    ///
    /// A socket that closes after being replaced must not evict its successor.
    pub async fn unregister_connection(&self, session_id: &str, connection_id: &str) -> bool {
        let mut handles = self.handles.write().await;
        if handles
            .get(session_id)
            .is_some_and(|h| h.connection_id == connection_id)
        {
            handles.remove(session_id);
            true
        } else {
            false
        }
    }

    /// Deliver to the session's client if one is attached
    ///
    /// Never blocks: a full buffer drops the event, a closed handle is
    /// unregistered. Returns whether the event was queued.
    pub async fn send(&self, session_id: &str, event: LiveEvent) -> bool {
        let Some(handle) = self.handles.read().await.get(session_id).cloned() else {
            return false;
        };

        match handle.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(session_id, "live connection buffer full, dropping event");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.unregister_connection(session_id, &handle.connection_id)
                    .await;
                tracing::debug!(session_id, "live connection closed, unregistered");
                false
            }
        }
    }

    /// Best-effort delivery to every attached client; returns how many queued it
    pub async fn broadcast(&self, event: &LiveEvent) -> usize {
        let snapshot: Vec<(String, ConnectionHandle)> = self
            .handles
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut delivered = 0;
        for (session_id, handle) in snapshot {
            match handle.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(session_id = %session_id, "live connection buffer full, dropping broadcast");
                }
                Err(TrySendError::Closed(_)) => {
                    self.unregister_connection(&session_id, &handle.connection_id)
                        .await;
                }
            }
        }
        delivered
    }

    pub async fn is_connected(&self, session_id: &str) -> bool {
        self.handles.read().await.contains_key(session_id)
    }

    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.read().await.is_empty()
    }
}
