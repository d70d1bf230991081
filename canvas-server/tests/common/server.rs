//! Test server harness for integration tests.
//!
//! Spins up the real application router on a random port so tests can talk
//! to it over HTTP and WebSocket.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use canvas_core::CanvasStore;
use canvas_server::{AppState, ExecutionGateway};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

/// Execution URL for tests that never reach the execution service.
const UNREACHABLE_EXECUTION_URL: &str = "http://127.0.0.1:9/api/v2/piston";

/// A test server instance with control handles.
pub struct TestServer {
    addr: SocketAddr,
    state: AppState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start an in-memory server on a random available port.
    ///
    /// # Panics
    ///
    /// Panics if no port is available or the server fails to bind.
    pub async fn start() -> Self {
        Self::start_with(None, UNREACHABLE_EXECUTION_URL).await
    }

    /// Start a server persisting under `data_dir` (if given) and forwarding
    /// code execution to `execution_url`.
    pub async fn start_with(data_dir: Option<&Path>, execution_url: &str) -> Self {
        let store = match data_dir {
            Some(dir) => CanvasStore::open(dir).expect("failed to open store"),
            None => CanvasStore::new(),
        };
        let executor = ExecutionGateway::new(execution_url, Duration::from_secs(5))
            .expect("invalid execution url");
        let state = AppState::new(store, executor).expect("failed to build state");

        let app = canvas_server::router(state.clone())
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any));

        let port = portpicker::pick_unused_port().expect("no available port");
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(addr).await.expect("failed to bind");
        let actual_addr = listener.local_addr().expect("failed to get local addr");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("server error");
        });

        // Give the server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Self {
            addr: actual_addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    /// Get the server's socket address.
    #[allow(dead_code)]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base HTTP URL, without trailing slash.
    #[allow(dead_code)]
    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Absolute URL for an API path such as `/api/files`.
    #[allow(dead_code)]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Relay WebSocket URL.
    #[allow(dead_code)]
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Application state, for assertions against the store or rooms.
    #[allow(dead_code)]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Gracefully shut down the server.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}
