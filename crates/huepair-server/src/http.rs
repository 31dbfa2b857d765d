//! HTTP request handlers
//!
//! The protocol itself runs over `/ws`; the JSON endpoints here are for
//! health checks and inspecting live sessions.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use huepair_auth::{SessionId, SessionInfo};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Pairing protocol
        .route("/ws", get(crate::websocket::ws_handler))
        // Session inspection
        .route("/api/sessions/:id", get(session_handler))
        // Server info
        .route("/api/info", get(server_info_handler))
        .route("/api/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Sessions
// ============================================================================

/// Look up one live session
async fn session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>, (StatusCode, String)> {
    state
        .store
        .session(&SessionId::from(id))
        .await
        .map(|session| Json(SessionInfo::from(&session)))
        .ok_or((StatusCode::NOT_FOUND, "Session not found".to_string()))
}

// ============================================================================
// Server Info
// ============================================================================

/// Server information response
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// Server version
    pub version: String,
    /// Live sessions
    pub sessions: usize,
    /// Indexed rotation keys across all sessions
    pub indexed_rotations: usize,
    /// Open WebSocket connections
    pub connections: usize,
    /// Challenge window length in seconds
    pub window_secs: u64,
    /// Steps per generated sequence
    pub sequence_length: usize,
    /// Symbols sequences are drawn from
    pub alphabet: String,
    /// Certificate fingerprint (for verification)
    pub cert_fingerprint: Option<String>,
}

/// Get server information
async fn server_info_handler(State(state): State<Arc<AppState>>) -> Json<ServerInfo> {
    Json(ServerInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: state.store.len().await,
        indexed_rotations: state.store.index_len().await,
        connections: state.connection_count().await,
        window_secs: state.config.window_secs,
        sequence_length: state.config.sequence_length,
        alphabet: state.config.alphabet.iter().map(|s| s.as_char()).collect(),
        cert_fingerprint: state.cert_fingerprint.clone(),
    })
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
}

async fn health_handler() -> Json<Health> {
    Json(Health { status: "ok" })
}
