//! Code execution gateway.
//!
//! Stateless proxy between the canvas's `(language, code, stdin)` requests
//! and an external Piston-compatible execution service. Language names are
//! resolved to `(runtime, version)` through a static table; unknown languages
//! are rejected before any upstream call.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// A runtime name and version understood by the execution service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Runtime {
    /// Upstream language name.
    pub language: &'static str,
    /// Upstream runtime version.
    pub version: &'static str,
}

/// Supported language identifiers and the runtime each resolves to.
pub const RUNTIMES: &[(&str, Runtime)] = &[
    ("javascript", Runtime { language: "javascript", version: "18.15.0" }),
    ("python", Runtime { language: "python", version: "3.10.0" }),
    ("java", Runtime { language: "java", version: "15.0.2" }),
    ("cpp", Runtime { language: "cpp", version: "10.2.0" }),
    ("c", Runtime { language: "c", version: "10.2.0" }),
    ("typescript", Runtime { language: "typescript", version: "5.0.3" }),
    ("go", Runtime { language: "go", version: "1.16.2" }),
    ("rust", Runtime { language: "rust", version: "1.68.2" }),
    ("ruby", Runtime { language: "ruby", version: "3.0.1" }),
    ("php", Runtime { language: "php", version: "8.2.3" }),
];

/// Resolve a language identifier (case-insensitive).
#[must_use]
pub fn resolve_runtime(language: &str) -> Option<Runtime> {
    let wanted = language.to_lowercase();
    RUNTIMES
        .iter()
        .find(|(id, _)| *id == wanted)
        .map(|(_, runtime)| *runtime)
}

/// All supported language identifiers, in table order.
#[must_use]
pub fn supported_languages() -> Vec<String> {
    RUNTIMES.iter().map(|(id, _)| (*id).to_string()).collect()
}

/// Errors produced by the execution gateway.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A required request field was missing or empty.
    #[error("Code and language are required (missing {0})")]
    MissingField(&'static str),
    /// The language is not in the runtime table.
    #[error("Unsupported language: {language}")]
    UnsupportedLanguage {
        /// The language that was requested.
        language: String,
        /// Every supported language identifier.
        supported: Vec<String>,
    },
    /// The execution service failed or answered with something unusable.
    #[error("Failed to execute code: {message}")]
    Upstream {
        /// Summary of the failure.
        message: String,
        /// Upstream diagnostic payload, forwarded verbatim.
        details: Value,
    },
    /// The configured service URL is invalid.
    #[error("invalid execution service URL: {0}")]
    InvalidUrl(String),
}

impl ExecutionError {
    fn upstream(message: impl Into<String>, details: Value) -> Self {
        Self::Upstream {
            message: message.into(),
            details,
        }
    }
}

/// Body of `POST /api/code/execute`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Source code to run.
    #[serde(default)]
    pub code: Option<String>,
    /// Language identifier.
    #[serde(default)]
    pub language: Option<String>,
    /// Standard input for the program.
    #[serde(default)]
    pub stdin: Option<String>,
}

impl ExecutionRequest {
    /// Build a request without stdin.
    #[must_use]
    pub fn new(code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            language: Some(language.into()),
            stdin: None,
        }
    }
}

/// Normalized execution outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Program output.
    pub output: String,
    /// Program standard error.
    pub stderr: String,
    /// Process exit code.
    pub exit_code: i64,
    /// Execution time as reported upstream.
    pub execution_time: f64,
}

#[derive(Debug, Serialize)]
struct UpstreamRequest<'a> {
    language: &'a str,
    version: &'a str,
    files: [UpstreamFile<'a>; 1],
    stdin: &'a str,
}

#[derive(Debug, Serialize)]
struct UpstreamFile<'a> {
    content: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamResponse {
    #[serde(default)]
    run: Option<UpstreamRun>,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamRun {
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    time: Option<Value>,
}

impl From<UpstreamRun> for ExecutionResult {
    fn from(run: UpstreamRun) -> Self {
        let output = run
            .output
            .filter(|o| !o.is_empty())
            .or(run.stdout)
            .unwrap_or_default();
        let execution_time = match run.time {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        };
        Self {
            output,
            stderr: run.stderr.unwrap_or_default(),
            exit_code: run.code.unwrap_or(0),
            execution_time,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpstreamRuntime {
    language: String,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Client for the external execution service.
#[derive(Clone)]
pub struct ExecutionGateway {
    inner: Arc<InnerGateway>,
}

struct InnerGateway {
    http: Client,
    base: Url,
}

impl std::fmt::Debug for ExecutionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionGateway")
            .field("base", &self.inner.base.as_str())
            .finish_non_exhaustive()
    }
}

impl ExecutionGateway {
    /// Create a gateway for the service at `base_url`.
    ///
    /// `timeout` bounds each upstream request; there is no retry.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::InvalidUrl`] if the URL is malformed or the
    /// HTTP client cannot be built.
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self, ExecutionError> {
        let mut base = Url::parse(base_url.as_ref())
            .map_err(|e| ExecutionError::InvalidUrl(e.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = Client::builder()
            .user_agent(concat!("excalicode/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ExecutionError::InvalidUrl(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(InnerGateway { http, base }),
        })
    }

    /// Base URL of the execution service.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, ExecutionError> {
        self.inner
            .base
            .join(path)
            .map_err(|e| ExecutionError::InvalidUrl(e.to_string()))
    }

    /// Run `request` on the execution service.
    ///
    /// # Errors
    ///
    /// - [`ExecutionError::MissingField`] if code or language is absent or empty
    /// - [`ExecutionError::UnsupportedLanguage`] if the language is unknown
    ///   (no upstream call is made)
    /// - [`ExecutionError::Upstream`] on network failure, non-2xx status or an
    ///   unparseable response
    #[tracing::instrument(name = "execute_code", skip(self, request), fields(language))]
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecutionError> {
        let code = request
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(ExecutionError::MissingField("code"))?;
        let language = request
            .language
            .as_deref()
            .filter(|l| !l.is_empty())
            .ok_or(ExecutionError::MissingField("language"))?;
        tracing::Span::current().record("language", language);

        let runtime =
            resolve_runtime(language).ok_or_else(|| ExecutionError::UnsupportedLanguage {
                language: language.to_string(),
                supported: supported_languages(),
            })?;

        let body = UpstreamRequest {
            language: runtime.language,
            version: runtime.version,
            files: [UpstreamFile { content: code }],
            stdin: request.stdin.as_deref().unwrap_or(""),
        };

        let response = self
            .inner
            .http
            .post(self.endpoint("execute")?)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Execution service unreachable: {e}");
                ExecutionError::upstream(e.to_string(), Value::String(e.to_string()))
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExecutionError::upstream(e.to_string(), Value::Null))?;

        if !status.is_success() {
            tracing::warn!(status = %status, "Execution service returned an error");
            let details = serde_json::from_str(&text).unwrap_or(Value::String(text));
            return Err(ExecutionError::upstream(
                format!("execution service returned {status}"),
                details,
            ));
        }

        let parsed: UpstreamResponse = serde_json::from_str(&text).map_err(|e| {
            ExecutionError::upstream(
                format!("malformed execution response: {e}"),
                Value::String(text.clone()),
            )
        })?;

        let result = ExecutionResult::from(parsed.run.unwrap_or_default());
        tracing::debug!(
            exit_code = result.exit_code,
            execution_time = result.execution_time,
            "Execution finished"
        );
        Ok(result)
    }

    /// Supported language identifiers that the service currently offers.
    ///
    /// Falls back to the full static table if the listing call fails.
    #[tracing::instrument(name = "list_languages", skip(self))]
    pub async fn languages(&self) -> Vec<String> {
        match self.fetch_runtimes().await {
            Ok(runtimes) => RUNTIMES
                .iter()
                .filter(|(_, runtime)| {
                    runtimes.iter().any(|r| {
                        r.language == runtime.language
                            || r.aliases.iter().any(|a| a == runtime.language)
                    })
                })
                .map(|(id, _)| (*id).to_string())
                .collect(),
            Err(e) => {
                tracing::warn!("Runtime listing failed, using static table: {e}");
                supported_languages()
            }
        }
    }

    async fn fetch_runtimes(&self) -> Result<Vec<UpstreamRuntime>, reqwest::Error> {
        let url = self
            .endpoint("runtimes")
            .unwrap_or_else(|_| self.inner.base.clone());
        self.inner
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}
