//! Server initialization and run loop

use anyhow::{Context, Result};
use axum::{routing::get, Extension, Router};
use daad_bridge::ProcessBridge;
use daad_files::FileStore;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use super::config::AppConfig;
use crate::api;
use crate::middleware::access::AccessPolicy;
use crate::websocket;

/// Shared services handed to every connection
#[derive(Clone)]
pub struct AppState {
    pub bridge: ProcessBridge,
    pub files: Arc<FileStore>,
    pub access: Arc<AccessPolicy>,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Self {
        let files = match &config.workspace.root {
            Some(root) => FileStore::with_root(root),
            None => FileStore::new(),
        };
        Self {
            bridge: ProcessBridge::new(config.bridge.clone()),
            files: Arc::new(files),
            access: Arc::new(AccessPolicy::from_config(&config.server)),
        }
    }
}

/// Assemble the HTTP + WebSocket router
pub fn build_router(state: AppState, web_ui_dir: Option<&Path>) -> Router {
    let app = Router::new()
        .merge(api::health_routes())
        .merge(websocket::websocket_router())
        .layer(Extension(state.bridge))
        .layer(Extension(state.files))
        .layer(Extension(state.access))
        .layer(TraceLayer::new_for_http());

    match web_ui_dir {
        // Serve static files, fallback to index.html for SPA routing
        Some(dir) => {
            let serve_dir = ServeDir::new(dir)
                .append_index_html_on_directories(true)
                .fallback(tower_http::services::ServeFile::new(dir.join("index.html")));
            app.fallback_service(serve_dir)
        }
        None => app.route("/", get(|| async { "Daad Studio" })),
    }
}

/// Start the server and block until a shutdown signal arrives
pub async fn run(config: AppConfig) -> Result<()> {
    let state = AppState::from_config(&config);

    info!(
        interpreter = %config.bridge.interpreter,
        workspace = ?config.workspace.root,
        "Process bridge ready"
    );

    let web_ui_dir = config.server.web_ui_dir.as_deref().map(Path::new);
    if let Some(dir) = web_ui_dir {
        if !dir.join("index.html").exists() {
            warn!("Web UI directory {} has no index.html", dir.display());
        }
    }

    let app = build_router(state.clone(), web_ui_dir);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    info!("HTTP server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .context("HTTP server error")?;

    // Connections are gone; kill anything they left running
    for run in state.bridge.active_runs().await {
        state.bridge.cancel_run(&run.session_id).await;
    }

    info!("Daad Studio shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
pub(crate) async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
