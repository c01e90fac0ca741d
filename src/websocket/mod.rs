//! WebSocket module for Daad Studio
//!
//! `/ws/session` - one UI window per connection: runs, stdin, file operations

pub mod handlers;
pub mod protocol;
pub mod session;


use axum::{extract::ws::WebSocketUpgrade, response::IntoResponse, routing::get, Extension, Router};
use daad_bridge::ProcessBridge;
use daad_files::FileStore;
use std::sync::Arc;

use crate::middleware::access::RequireTrustedClient;

/// WebSocket upgrade handler
pub async fn session_handler(
    _trusted: RequireTrustedClient,
    ws: WebSocketUpgrade,
    Extension(bridge): Extension<ProcessBridge>,
    Extension(files): Extension<Arc<FileStore>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session::handle_socket(socket, bridge, files))
}

/// Create the WebSocket router
pub fn websocket_router() -> Router {
    Router::new().route("/ws/session", get(session_handler))
}
