//! # Excalicode Server Library
//!
//! Canvas storage API, realtime relay and code execution gateway.
//! This library is used by both the binary and integration tests.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::Router;
use canvas_core::{CanvasStore, FileTree, StoreError};

pub mod config;
pub mod error;
pub mod execution;
pub mod health;
pub mod metrics;
pub mod relay;
pub mod rooms;
pub mod routes;
pub mod validation;

pub use config::ServerConfig;
pub use error::ApiError;
pub use execution::{ExecutionError, ExecutionGateway};
pub use relay::RelayState;
pub use rooms::RoomRegistry;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Element store.
    pub store: CanvasStore,
    /// File/folder tree cascading into the store.
    pub files: FileTree,
    /// Room registry and broadcast hub.
    pub relay: RelayState,
    /// Code execution gateway.
    pub executor: ExecutionGateway,
}

impl AppState {
    /// Assemble state around an existing store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file tree cannot be loaded from the store's
    /// data directory.
    pub fn new(store: CanvasStore, executor: ExecutionGateway) -> Result<Self, StoreError> {
        let files = FileTree::open(store.clone())?;
        Ok(Self {
            store,
            files,
            relay: RelayState::new(),
            executor,
        })
    }

    /// Build state from configuration.
    ///
    /// # Errors
    ///
    /// Fails if the data directory cannot be opened or the execution URL is
    /// invalid.
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let store = match &config.data_dir {
            Some(dir) => CanvasStore::open(dir)?,
            None => {
                tracing::warn!("No data directory configured; canvases live in memory only");
                CanvasStore::new()
            }
        };
        let executor = ExecutionGateway::new(&config.execution_url, config.execution_timeout())?;
        Ok(Self::new(store, executor)?)
    }
}

/// Relay WebSocket endpoint.
#[tracing::instrument(name = "relay_connect", skip(ws, state))]
async fn relay_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay::handle_relay_socket(socket, state.relay))
}

/// Build the application router (without middleware layers).
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check endpoints
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/api/health", get(health::api_health))
        // Realtime relay
        .route("/ws", get(relay_handler))
        // Canvas
        .route(
            "/api/canvas/{file_id}",
            get(routes::get_canvas).put(routes::save_canvas),
        )
        .route("/api/canvas/{file_id}/element", post(routes::add_element))
        .route(
            "/api/canvas/{file_id}/element/{element_id}",
            put(routes::update_element).delete(routes::delete_element),
        )
        // File tree
        .route(
            "/api/files",
            get(routes::list_files).post(routes::create_file),
        )
        .route("/api/files/parent/{parent_id}", get(routes::list_children))
        .route(
            "/api/files/{id}",
            put(routes::rename_file).delete(routes::delete_file),
        )
        // Code execution
        .route("/api/code/execute", post(routes::execute_code))
        .route("/api/code/languages", get(routes::list_languages))
        .with_state(state)
}
