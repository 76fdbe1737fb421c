//! REST endpoints: chat, stats, sessions, memory graph, inner life

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiState, ErrorResponse, error_response};
use crate::db::{MemoryCategory, MemoryRecord, SessionSummary, StoreStats, truncate_chars};
use crate::live::LiveEvent;
use crate::memory::Emotion;

/// Memories shown in one graph
const GRAPH_LIMIT: usize = 200;

/// Graph label length before truncation
const LABEL_CHARS: usize = 40;

type ApiResult<T> = std::result::Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

// --- Request/Response types ---

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub id: String,
    pub session_id: String,
    pub response: String,
    pub emotion: Emotion,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub totals: StoreStats,
    pub sam_online: bool,
}

#[derive(Debug, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub sentiment: Emotion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<MemoryCategory>,
    pub size: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct GraphLink {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Serialize)]
pub struct MemoryGraph {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

#[derive(Debug, Serialize)]
pub struct ReflectionResponse {
    pub session_id: String,
    /// `false` when another request already wrote this week
    pub created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reflection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evolution_notes: Option<String>,
}

/// Build the memory graph: one hub per category, one node per memory
#[must_use]
pub fn build_graph(memories: &[MemoryRecord]) -> MemoryGraph {
    let categories: BTreeSet<MemoryCategory> = memories.iter().map(|m| m.category).collect();

    let mut nodes: Vec<GraphNode> = categories
        .iter()
        .map(|category| GraphNode {
            id: format!("cat-{category}"),
            label: capitalize_first(category.as_str()),
            kind: "category",
            sentiment: Emotion::Neutral,
            category: None,
            size: 20.0,
            timestamp: None,
        })
        .collect();
    let mut links = Vec::with_capacity(memories.len());

    for memory in memories {
        nodes.push(GraphNode {
            id: memory.id.clone(),
            label: truncate_chars(&memory.content, LABEL_CHARS),
            kind: "memory",
            sentiment: memory.sentiment,
            category: Some(memory.category),
            size: memory.weight.mul_add(4.0, 8.0),
            timestamp: Some(memory.created_at),
        });
        links.push(GraphLink {
            source: format!("cat-{}", memory.category),
            target: memory.id.clone(),
        });
    }

    MemoryGraph { nodes, links }
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

// --- Handlers ---

async fn chat(State(state): State<Arc<ApiState>>, Json(req): Json<ChatRequest>) -> ApiResult<ChatResponse> {
    let reply = state
        .chat
        .run_turn(&req.session_id, &req.message)
        .await
        .map_err(|e| error_response(&e))?;

    // Mirror the reply to a live client attached to the same session
    if state.registry.send(&req.session_id, LiveEvent::from(&reply)).await {
        tracing::debug!(session_id = %req.session_id, "pushed REST reply to live connection");
    }

    Ok(Json(ChatResponse {
        id: reply.id,
        session_id: req.session_id,
        response: reply.content,
        emotion: reply.emotion,
        timestamp: reply.created_at,
    }))
}

async fn stats(State(state): State<Arc<ApiState>>) -> ApiResult<StatsResponse> {
    let totals = state.store.stats().await.map_err(|e| error_response(&e))?;
    Ok(Json(StatsResponse {
        totals,
        sam_online: true,
    }))
}

async fn sessions(State(state): State<Arc<ApiState>>) -> ApiResult<Vec<SessionSummary>> {
    let summaries = state
        .store
        .session_summaries()
        .await
        .map_err(|e| error_response(&e))?;
    Ok(Json(summaries))
}

async fn memory_graph(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<String>,
) -> ApiResult<MemoryGraph> {
    let memories = state
        .store
        .memory_graph(&session_id, GRAPH_LIMIT)
        .await
        .map_err(|e| error_response(&e))?;
    Ok(Json(build_graph(&memories)))
}

async fn inner_life(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<String>,
) -> ApiResult<ReflectionResponse> {
    let record = state
        .reflection
        .reflect(&session_id)
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(match record {
        Some(r) => ReflectionResponse {
            session_id,
            created: true,
            week_number: Some(r.week_number),
            reflection: Some(r.reflection_text),
            evolution_notes: Some(r.evolution_notes),
        },
        None => ReflectionResponse {
            session_id,
            created: false,
            week_number: None,
            reflection: None,
            evolution_notes: None,
        },
    }))
}

/// Build the REST router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/stats", get(stats))
        .route("/sessions", get(sessions))
        .route("/memories/{session_id}/graph", get(memory_graph))
        .route("/inner-life/{session_id}", post(inner_life))
        .with_state(state)
}
