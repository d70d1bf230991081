//! Server configuration from command-line arguments and environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use clap::{Parser, ValueEnum};
use tower_http::cors::CorsLayer;

/// Default upstream execution service.
pub const DEFAULT_EXECUTION_URL: &str = "https://emkc.org/api/v2/piston";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Command-line arguments for the Excalicode server.
#[derive(Debug, Clone, Parser)]
#[command(name = "excalicode-server")]
#[command(about = "Collaborative canvas server with realtime relay and code execution")]
#[command(version)]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "EXCALICODE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Directory for canvas and file tree persistence (memory-only if unset)
    #[arg(long, env = "EXCALICODE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the code execution service
    #[arg(long, env = "PISTON_API_URL", default_value = DEFAULT_EXECUTION_URL)]
    pub execution_url: String,

    /// Timeout for a single execution request, in seconds
    #[arg(long, env = "EXECUTION_TIMEOUT_SECS", default_value_t = 30)]
    pub execution_timeout_secs: u64,

    /// Allowed CORS origin (repeatable)
    #[arg(
        long = "allowed-origin",
        env = "EXCALICODE_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_values_t = [
            "http://localhost:5173".to_string(),
            "http://localhost:3000".to_string(),
        ]
    )]
    pub allowed_origins: Vec<String>,

    /// Log output format
    #[arg(long, env = "RUST_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not a valid IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    /// Upstream execution timeout.
    #[must_use]
    pub const fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    /// CORS policy admitting only the configured origins.
    ///
    /// Origins that are not valid header values are skipped with a warning.
    #[must_use]
    pub fn cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            data_dir: None,
            execution_url: DEFAULT_EXECUTION_URL.to_string(),
            execution_timeout_secs: 30,
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
            log_format: LogFormat::Text,
        }
    }
}
