//! # Excalicode Server
//!
//! Canvas storage, realtime relay and code execution for the Excalicode
//! whiteboard.

use axum::{extract::State, routing::get, Router};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use canvas_server::config::LogFormat;
use canvas_server::{metrics, AppState, ServerConfig};

const DEFAULT_LOG_FILTER: &str = "info,canvas_server=debug,tower_http=debug";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt_layer.json()).init(),
        LogFormat::Text => registry.with(fmt_layer).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    init_tracing(config.log_format);

    let prometheus = metrics::init_metrics()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {e}"))?;

    let state = AppState::from_config(&config)?;
    tracing::info!(
        execution_url = %state.executor.base_url(),
        data_dir = ?config.data_dir,
        origins = ?config.allowed_origins,
        "Excalicode state ready"
    );

    let metrics_route = Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(prometheus);

    let app = canvas_server::router(state)
        .merge(metrics_route)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(config.cors_layer())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Relay at ws://{addr}/ws, API at http://{addr}/api");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_ctrl_c())
        .await?;

    tracing::info!("Excalicode server stopped");
    Ok(())
}

async fn render_metrics(State(prometheus): State<PrometheusHandle>) -> String {
    prometheus.render()
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Ctrl-C received, draining connections"),
        Err(e) => {
            tracing::error!("Cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    }
}
