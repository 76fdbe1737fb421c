//! WebSocket handler for the live channel

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::ApiState;
use crate::Error;
use crate::live::{ConnectionHandle, LiveAction, LiveEvent, OrbState};

/// Outbound frames buffered per socket
const OUTBOUND_BUFFER: usize = 32;

/// Build WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/{session_id}", get(ws_upgrade))
        .with_state(state)
}

/// Handle WebSocket upgrade request
async fn ws_upgrade(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<ApiState>, session_id: String) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending events back to client
    let (tx, mut rx) = mpsc::channel::<LiveEvent>(OUTBOUND_BUFFER);

    // Register for proactive delivery; a newer socket for the same session wins
    let handle = ConnectionHandle::new(tx.clone());
    let connection_id = handle.connection_id().to_string();
    if state.registry.register(&session_id, handle).await.is_some() {
        tracing::debug!(session_id = %session_id, "replaced previous live connection");
    }

    let _ = tx
        .send(LiveEvent::Connected {
            session_id: session_id.clone(),
        })
        .await;

    tracing::info!(session_id = %session_id, connection_id = %connection_id, "WebSocket connected");

    // Spawn task to forward events from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to encode live event"),
            }
        }
    });

    // Handle incoming frames
    let recv_state = Arc::clone(&state);
    let recv_session = session_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    // Detached: aborting this loop must not cut a turn between its writes
                    let _turn = handle_frame(&text, &recv_state, &recv_session, &tx).await;
                }
                Message::Close(_) => {
                    tracing::info!(session_id = %recv_session, "WebSocket closed by client");
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state
        .registry
        .unregister_connection(&session_id, &connection_id)
        .await;

    tracing::info!(session_id = %session_id, "WebSocket disconnected");
}

/// Handle a single incoming frame; the socket stays open whatever happens
///
/// Pings and typing hints are answered inline. A chat frame runs as its own
/// task, whose handle is returned.
async fn handle_frame(
    text: &str,
    state: &Arc<ApiState>,
    session_id: &str,
    tx: &mpsc::Sender<LiveEvent>,
) -> Option<JoinHandle<()>> {
    let action: LiveAction = match serde_json::from_str(text) {
        Ok(action) => action,
        Err(e) => {
            tracing::debug!(session_id, error = %e, "malformed live frame");
            let _ = tx.send(LiveEvent::error(format!("invalid frame: {e}"))).await;
            return None;
        }
    };

    match action {
        LiveAction::Ping => {
            let _ = tx.send(LiveEvent::Pong).await;
            None
        }
        LiveAction::Typing => {
            let _ = tx.send(LiveEvent::orb(OrbState::Listening)).await;
            None
        }
        LiveAction::Chat { text } => {
            let _ = tx.send(LiveEvent::orb(OrbState::Thinking)).await;

            let state = Arc::clone(state);
            let session_id = session_id.to_string();
            let tx = tx.clone();
            Some(tokio::spawn(async move {
                chat_turn(&state, &session_id, &text, &tx).await;
            }))
        }
    }
}

/// Run one turn and report the outcome on the socket, if it is still there
async fn chat_turn(state: &ApiState, session_id: &str, text: &str, tx: &mpsc::Sender<LiveEvent>) {
    match state.chat.run_turn(session_id, text).await {
        Ok(reply) => {
            let _ = tx.send(LiveEvent::from(&reply)).await;
            let _ = tx.send(LiveEvent::orb(OrbState::Speaking)).await;
        }
        Err(e) => {
            let _ = tx.send(LiveEvent::error(user_facing(&e))).await;
            let _ = tx.send(LiveEvent::orb(OrbState::Idle)).await;
        }
    }
}

/// Error text shown to the person on the other end
fn user_facing(err: &Error) -> String {
    match err {
        Error::Model(_) | Error::Timeout(_) => {
            "Sorry, I lost my train of thought for a second. Could you say that again?".to_string()
        }
        Error::InvalidFrame(msg) => msg.clone(),
        _ => "Something went wrong on my side. Your message wasn't saved.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::{Notify, oneshot};

    use super::*;
    use crate::agent::{ChatService, ContextSegment, ModelClient};
    use crate::context::{ContextAssembler, ContextConfig};
    use crate::db::{RecordKind, SessionStore, SqliteStore, init_memory};
    use crate::inner_life::ReflectionService;
    use crate::live::ConnectionRegistry;
    use crate::longterm::{LongTermMemory, NoopMemory};
    use crate::memory::MemoryExtractor;

    struct Fixed(Option<&'static str>);

    #[async_trait]
    impl ModelClient for Fixed {
        async fn generate(&self, _segments: &[ContextSegment]) -> crate::Result<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| Error::Model("unavailable".to_string()))
        }
    }

    /// Replies only once released
    struct Gated(Arc<Notify>);

    #[async_trait]
    impl ModelClient for Gated {
        async fn generate(&self, _segments: &[ContextSegment]) -> crate::Result<String> {
            self.0.notified().await;
            Ok("sorry, I was miles away".to_string())
        }
    }

    fn state_with(model: Arc<dyn ModelClient>) -> Arc<ApiState> {
        let store: Arc<dyn SessionStore> =
            Arc::new(SqliteStore::new(init_memory().unwrap(), Duration::from_secs(10)));
        let long_term: Arc<dyn LongTermMemory> = Arc::new(NoopMemory);
        let assembler = Arc::new(ContextAssembler::new(
            Arc::clone(&store),
            Arc::clone(&long_term),
            "persona",
            ContextConfig::default(),
        ));
        Arc::new(ApiState {
            store: Arc::clone(&store),
            registry: ConnectionRegistry::new(),
            chat: Arc::new(ChatService::new(
                Arc::clone(&store),
                Arc::clone(&model),
                Arc::clone(&long_term),
                assembler,
                MemoryExtractor::default(),
                Duration::from_secs(5),
            )),
            reflection: Arc::new(ReflectionService::new(
                store,
                model,
                long_term,
                "persona",
                Duration::from_secs(5),
            )),
        })
    }

    fn state(reply: Option<&'static str>) -> Arc<ApiState> {
        state_with(Arc::new(Fixed(reply)))
    }

    fn drain(rx: &mut mpsc::Receiver<LiveEvent>) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(event) = rx.try_recv() {
            frames.push(serde_json::to_value(event).unwrap());
        }
        frames
    }

    const CHAT: &str = r#"{"action":"chat","text":"hello"}"#;

    #[tokio::test]
    async fn chat_frame_emits_thinking_message_speaking() {
        let state = state(Some("oh, tell me more"));
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);

        let turn = handle_frame(CHAT, &state, "s1", &tx).await.unwrap();
        turn.await.unwrap();

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["state"], "thinking");
        assert_eq!(frames[1]["type"], "message");
        assert_eq!(frames[1]["content"], "oh, tell me more");
        assert_eq!(frames[2]["state"], "speaking");
    }

    #[tokio::test]
    async fn model_failure_emits_error_then_idle() {
        let state = state(None);
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);

        let turn = handle_frame(CHAT, &state, "s1", &tx).await.unwrap();
        turn.await.unwrap();

        let frames = drain(&mut rx);
        let kinds: Vec<&str> = frames.iter().filter_map(|f| f["type"].as_str()).collect();
        assert_eq!(kinds, vec!["orb_state", "error", "orb_state"]);
        assert_eq!(frames[2]["state"], "idle");
        assert_eq!(state.store.count("s1", RecordKind::Messages).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ping_typing_and_garbage() {
        let state = state(Some("hi"));
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);

        assert!(handle_frame(r#"{"action":"ping"}"#, &state, "s1", &tx).await.is_none());
        assert!(handle_frame(r#"{"action":"typing"}"#, &state, "s1", &tx).await.is_none());
        assert!(handle_frame("not json", &state, "s1", &tx).await.is_none());
        assert!(handle_frame(r#"{"action":"dance"}"#, &state, "s1", &tx).await.is_none());

        let frames = drain(&mut rx);
        assert_eq!(frames[0], serde_json::json!({"type": "pong"}));
        assert_eq!(frames[1], serde_json::json!({"type": "orb_state", "state": "listening"}));
        assert_eq!(frames[2]["type"], "error");
        assert_eq!(frames[3]["type"], "error");
    }

    #[tokio::test]
    async fn ping_is_answered_while_a_turn_is_running() {
        let release = Arc::new(Notify::new());
        let state = state_with(Arc::new(Gated(Arc::clone(&release))));
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);

        let turn = handle_frame(CHAT, &state, "s1", &tx).await.unwrap();
        handle_frame(r#"{"action":"ping"}"#, &state, "s1", &tx).await;

        let frames = drain(&mut rx);
        assert_eq!(frames[0]["state"], "thinking");
        assert_eq!(frames[1], serde_json::json!({"type": "pong"}));
        assert_eq!(frames.len(), 2);

        release.notify_one();
        turn.await.unwrap();
        let frames = drain(&mut rx);
        assert_eq!(frames[0]["type"], "message");
        assert_eq!(frames[1]["state"], "speaking");
    }

    #[tokio::test]
    async fn closed_socket_does_not_cut_a_turn_short() {
        let release = Arc::new(Notify::new());
        let state = state_with(Arc::new(Gated(Arc::clone(&release))));
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (turn_tx, turn_rx) = oneshot::channel();

        // Stand-in for the socket's receive loop, torn down mid-turn
        let socket_state = Arc::clone(&state);
        let recv_task = tokio::spawn(async move {
            let turn = handle_frame(CHAT, &socket_state, "s1", &tx).await;
            let _ = turn_tx.send(turn);
            std::future::pending::<()>().await;
        });

        let turn = turn_rx.await.unwrap().unwrap();
        recv_task.abort();
        drop(rx);

        release.notify_one();
        turn.await.unwrap();

        let history = state.store.recent_messages("s1", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "sorry, I was miles away");
    }
}
