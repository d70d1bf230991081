//! HTTP client for the element store and code execution endpoints.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use canvas_core::{Canvas, Element, ElementId, ElementPatch, ViewportTransform};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::ClientError;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a code execution as returned by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunOutput {
    /// Program output.
    pub output: String,
    /// Program standard error.
    pub stderr: String,
    /// Process exit code.
    pub exit_code: i64,
    /// Execution time reported by the execution service.
    pub execution_time: f64,
}

/// Store and execution operations a session depends on.
#[async_trait]
pub trait CanvasApi: Send + Sync {
    /// Fetch a canvas, creating it empty if it does not exist.
    async fn get_canvas(&self, file_id: &str) -> Result<Canvas, ClientError>;

    /// Replace the whole element list (upsert).
    async fn save_canvas(
        &self,
        file_id: &str,
        elements: &[Element],
        viewport: Option<ViewportTransform>,
    ) -> Result<Canvas, ClientError>;

    /// Append one element to an existing canvas.
    async fn add_element(&self, file_id: &str, element: &Element) -> Result<Canvas, ClientError>;

    /// Merge-patch one element.
    async fn update_element(
        &self,
        file_id: &str,
        element_id: &ElementId,
        patch: &ElementPatch,
    ) -> Result<Canvas, ClientError>;

    /// Remove one element (idempotent).
    async fn delete_element(
        &self,
        file_id: &str,
        element_id: &ElementId,
    ) -> Result<Canvas, ClientError>;

    /// Run code through the execution gateway.
    async fn execute(&self, code: &str, language: &str) -> Result<RunOutput, ClientError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveBody<'a> {
    elements: &'a [Element],
    #[serde(skip_serializing_if = "Option::is_none")]
    viewport_transform: Option<ViewportTransform>,
}

#[derive(Serialize)]
struct ExecuteBody<'a> {
    code: &'a str,
    language: &'a str,
}

/// [`CanvasApi`] over the server's HTTP API.
#[derive(Clone)]
pub struct HttpCanvasApi {
    inner: Arc<InnerApi>,
}

struct InnerApi {
    http: Client,
    base: Url,
}

impl std::fmt::Debug for HttpCanvasApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCanvasApi")
            .field("base", &self.inner.base.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpCanvasApi {
    /// Create a client for the server at `base_url` (e.g. `http://localhost:5000`).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if the URL is malformed or cannot
    /// carry a path, and [`ClientError::Http`] if the HTTP client fails to
    /// build.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with a custom per-request timeout.
    ///
    /// # Errors
    ///
    /// See [`HttpCanvasApi::new`].
    pub fn with_timeout(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self, ClientError> {
        let base = Url::parse(base_url.as_ref())
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base.to_string()));
        }

        let http = Client::builder()
            .user_agent(concat!("excalicode-session/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(InnerApi { http, base }),
        })
    }

    /// Server base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.inner.base.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl(self.inner.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl CanvasApi for HttpCanvasApi {
    async fn get_canvas(&self, file_id: &str) -> Result<Canvas, ClientError> {
        let url = self.url(&["api", "canvas", file_id])?;
        Self::decode(self.inner.http.get(url).send().await?).await
    }

    async fn save_canvas(
        &self,
        file_id: &str,
        elements: &[Element],
        viewport: Option<ViewportTransform>,
    ) -> Result<Canvas, ClientError> {
        let url = self.url(&["api", "canvas", file_id])?;
        let body = SaveBody {
            elements,
            viewport_transform: viewport,
        };
        Self::decode(self.inner.http.put(url).json(&body).send().await?).await
    }

    async fn add_element(&self, file_id: &str, element: &Element) -> Result<Canvas, ClientError> {
        let url = self.url(&["api", "canvas", file_id, "element"])?;
        Self::decode(self.inner.http.post(url).json(element).send().await?).await
    }

    async fn update_element(
        &self,
        file_id: &str,
        element_id: &ElementId,
        patch: &ElementPatch,
    ) -> Result<Canvas, ClientError> {
        let url = self.url(&["api", "canvas", file_id, "element", element_id.as_str()])?;
        Self::decode(self.inner.http.put(url).json(patch).send().await?).await
    }

    async fn delete_element(
        &self,
        file_id: &str,
        element_id: &ElementId,
    ) -> Result<Canvas, ClientError> {
        let url = self.url(&["api", "canvas", file_id, "element", element_id.as_str()])?;
        Self::decode(self.inner.http.delete(url).send().await?).await
    }

    async fn execute(&self, code: &str, language: &str) -> Result<RunOutput, ClientError> {
        let url = self.url(&["api", "code", "execute"])?;
        let body = ExecuteBody { code, language };
        Self::decode(self.inner.http.post(url).json(&body).send().await?).await
    }
}
