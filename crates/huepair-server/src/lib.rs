//! HuePair Server - Axum-based HTTP and WebSocket server
//!
//! This crate carries the pairing protocol over WebSocket and exposes a few
//! JSON endpoints for inspecting the server.

pub mod http;
pub mod state;
pub mod tls;
pub mod websocket;

pub use http::create_router;
pub use state::{AppState, Outbox};
pub use tls::{
    calculate_cert_fingerprint, create_rustls_config, generate_self_signed_cert,
    ServerCertificate,
};
pub use websocket::{disconnect, handle_client_message, handle_socket, ws_handler};
