//! SketchRoom synchronization server
//!
//! Tracks per-room participants and a globally-ordered action history
//! (shared undo/redo, canvas snapshots) and relays drawing events between
//! the clients connected to each room.
//!
//! ## Protocol
//!
//! Messages are JSON with a `"type"` discriminator, e.g.
//! ```json
//! { "type": "join", "roomId": "r1", "userId": "...", "username": "ada", "color": "#ff0080" }
//! { "type": "undo", "roomId": "r1", "userId": "..." }
//! ```
//! See `sketchroom-core` for the full message set.

mod api;
mod config;
mod hub;
mod presence;
mod registry;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get, routing::post};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::Config;
use crate::hub::Hub;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sketchroom_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env();
    let hub = Arc::new(Hub::new());

    tokio::spawn(presence::run_idle_sweep(
        hub.clone(),
        config.sweep_every,
        config.max_idle,
    ));

    let app = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/ws", get(hub::ws_handler))
        .route("/api/room/{room_id}", get(api::room_info))
        .route("/api/room/{room_id}/join", post(api::room_join))
        .layer(CorsLayer::permissive())
        .with_state(hub);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("SketchRoom server listening on {}", addr);
    info!("WebSocket endpoint: ws://localhost:{}/ws", config.port);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Index page
async fn index() -> &'static str {
    "SketchRoom Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}
