//! HTTP route handlers.
//!
//! - `/api/canvas/{file_id}` - whole-canvas read (lazy create) and upsert
//! - `/api/canvas/{file_id}/element[/{element_id}]` - single-element writes
//! - `/api/files[...]` - file/folder tree
//! - `/api/code/*` - code execution gateway

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use canvas_core::{
    Canvas, Element, ElementId, ElementPatch, FileEntry, FileKind, StoreError, ViewportTransform,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::execution::{ExecutionRequest, ExecutionResult};
use crate::metrics::{record_code_execution, record_store_write, record_validation_failure};
use crate::validation::{
    validate_element, validate_element_id, validate_elements, validate_file_id,
    validate_file_name, ValidationError, MAX_ELEMENTS_PER_CANVAS,
};
use crate::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Body of `PUT /api/canvas/{file_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCanvasRequest {
    /// Full element list.
    pub elements: Vec<Element>,
    /// New viewport, or keep the current one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport_transform: Option<ViewportTransform>,
    /// New background, or keep the current one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

fn track<T>(operation: &'static str, result: Result<T, StoreError>) -> Result<T, ApiError> {
    record_store_write(operation, result.is_ok());
    result.map_err(ApiError::from)
}

// ---------------------------------------------------------------------------
// Canvas
// ---------------------------------------------------------------------------

/// `GET /api/canvas/{file_id}`
#[tracing::instrument(name = "get_canvas", skip(state))]
pub async fn get_canvas(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> ApiResult<Canvas> {
    validate_file_id(&file_id)?;
    Ok(Json(state.store.get(&file_id)?))
}

/// `PUT /api/canvas/{file_id}`
#[tracing::instrument(name = "save_canvas", skip(state, request), fields(elements = request.elements.len()))]
pub async fn save_canvas(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Json(request): Json<SaveCanvasRequest>,
) -> ApiResult<Canvas> {
    validate_file_id(&file_id)?;
    validate_elements(&request.elements)?;
    let canvas = track(
        "replace",
        state.store.replace(
            &file_id,
            request.elements,
            request.viewport_transform,
            request.background_color,
        ),
    )?;
    Ok(Json(canvas))
}

/// `POST /api/canvas/{file_id}/element`
#[tracing::instrument(name = "add_element", skip(state, element), fields(element_id = %element.id))]
pub async fn add_element(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Json(element): Json<Element>,
) -> ApiResult<Canvas> {
    validate_file_id(&file_id)?;
    validate_element(&element)?;
    let appended = state
        .store
        .append_element_within(&file_id, element, MAX_ELEMENTS_PER_CANVAS);
    if let Err(StoreError::ElementLimit { .. }) = appended {
        record_validation_failure(ValidationError::TooManyElements.kind());
        return Err(ValidationError::TooManyElements.into());
    }
    let canvas = track("append", appended)?;
    Ok(Json(canvas))
}

/// `PUT /api/canvas/{file_id}/element/{element_id}`
#[tracing::instrument(name = "update_element", skip(state, updates))]
pub async fn update_element(
    State(state): State<AppState>,
    Path((file_id, element_id)): Path<(String, String)>,
    Json(updates): Json<Value>,
) -> ApiResult<Canvas> {
    validate_file_id(&file_id)?;
    validate_element_id(&element_id)?;
    let patch = ElementPatch::from_value(updates).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let canvas = track(
        "patch",
        state
            .store
            .patch_element(&file_id, &ElementId::from(element_id), &patch),
    )?;
    Ok(Json(canvas))
}

/// `DELETE /api/canvas/{file_id}/element/{element_id}`
#[tracing::instrument(name = "delete_element", skip(state))]
pub async fn delete_element(
    State(state): State<AppState>,
    Path((file_id, element_id)): Path<(String, String)>,
) -> ApiResult<Canvas> {
    validate_file_id(&file_id)?;
    let canvas = track(
        "remove",
        state
            .store
            .remove_element(&file_id, &ElementId::from(element_id)),
    )?;
    Ok(Json(canvas))
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Body of `POST /api/files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileRequest {
    /// Display name.
    pub name: String,
    /// `file` or `folder`.
    #[serde(rename = "type")]
    pub kind: FileKind,
    /// Parent folder, root if absent.
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Body of `PUT /api/files/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameFileRequest {
    /// New display name.
    pub name: String,
}

/// Response of `DELETE /api/files/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFileResponse {
    /// Confirmation text.
    pub message: String,
    /// Number of entries removed, descendants included.
    pub removed: usize,
}

/// `GET /api/files`
pub async fn list_files(State(state): State<AppState>) -> Json<Vec<FileEntry>> {
    Json(state.files.list())
}

/// `GET /api/files/parent/{parent_id}` (`null` lists the root)
pub async fn list_children(
    State(state): State<AppState>,
    Path(parent_id): Path<String>,
) -> Json<Vec<FileEntry>> {
    let parent = (parent_id != "null").then_some(parent_id.as_str());
    Json(state.files.list_children(parent))
}

/// `POST /api/files`
#[tracing::instrument(name = "create_file", skip(state, request), fields(name = %request.name))]
pub async fn create_file(
    State(state): State<AppState>,
    Json(request): Json<CreateFileRequest>,
) -> Result<(StatusCode, Json<FileEntry>), ApiError> {
    validate_file_name(&request.name)?;
    let parent = request.parent_id.filter(|p| !p.is_empty());
    let entry = state.files.create(request.name, request.kind, parent)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// `PUT /api/files/{id}`
#[tracing::instrument(name = "rename_file", skip(state, request))]
pub async fn rename_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RenameFileRequest>,
) -> ApiResult<FileEntry> {
    validate_file_name(&request.name)?;
    Ok(Json(state.files.rename(&id, request.name)?))
}

/// `DELETE /api/files/{id}`
#[tracing::instrument(name = "delete_file", skip(state))]
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DeleteFileResponse> {
    let removed = state.files.delete(&id)?;
    Ok(Json(DeleteFileResponse {
        message: "Deleted successfully".to_string(),
        removed: removed.len(),
    }))
}

// ---------------------------------------------------------------------------
// Code
// ---------------------------------------------------------------------------

/// `POST /api/code/execute`
pub async fn execute_code(
    State(state): State<AppState>,
    Json(request): Json<ExecutionRequest>,
) -> ApiResult<ExecutionResult> {
    let started = std::time::Instant::now();
    let result = state.executor.execute(&request).await;
    let outcome = match &result {
        Ok(_) => "success",
        Err(crate::execution::ExecutionError::Upstream { .. }) => "upstream_error",
        Err(_) => "rejected",
    };
    record_code_execution(
        request.language.as_deref().unwrap_or(""),
        outcome,
        started.elapsed().as_secs_f64(),
    );
    Ok(Json(result?))
}

/// `GET /api/code/languages`
pub async fn list_languages(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.executor.languages().await)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use canvas_core::CanvasStore;
    use serde_json::json;
    use tower::ServiceExt;

    use super::{Element, StatusCode, Value, MAX_ELEMENTS_PER_CANVAS};
    use crate::{router, AppState, ExecutionGateway};

    fn state() -> AppState {
        let executor = ExecutionGateway::new("http://127.0.0.1:9/api/v2/piston", Duration::from_secs(1))
            .expect("gateway");
        AppState::new(CanvasStore::new(), executor).expect("state")
    }

    fn app() -> axum::Router {
        router(state())
    }

    async fn call(app: &axum::Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1 << 20).await.expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_get_creates_empty_canvas() {
        let app = app();
        let (status, body) = call(&app, Method::GET, "/api/canvas/f1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fileId"], "f1");
        assert_eq!(body["elements"], json!([]));
        assert_eq!(body["viewportTransform"], json!([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]));
    }

    #[tokio::test]
    async fn test_append_then_patch_then_delete() {
        let app = app();
        call(&app, Method::GET, "/api/canvas/f1", None).await;

        let element = json!({"id": "e1", "type": "circle", "x": 1.0, "y": 2.0, "radius": 3.0});
        let (status, body) = call(&app, Method::POST, "/api/canvas/f1/element", Some(element)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["elements"].as_array().map(Vec::len), Some(1));

        let (status, body) = call(
            &app,
            Method::PUT,
            "/api/canvas/f1/element/e1",
            Some(json!({"x": 9.0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["elements"][0]["x"], 9.0);
        assert_eq!(body["elements"][0]["radius"], 3.0);

        let (status, body) = call(&app, Method::DELETE, "/api/canvas/f1/element/e1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["elements"], json!([]));
    }

    #[tokio::test]
    async fn test_append_to_missing_canvas_is_not_found() {
        let app = app();
        let element = json!({"id": "e1", "type": "circle", "x": 0.0, "y": 0.0, "radius": 1.0});
        let (status, body) = call(&app, Method::POST, "/api/canvas/ghost/element", Some(element)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_execute_rejects_unknown_language_without_upstream_call() {
        let app = app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/code/execute",
            Some(json!({"code": "x", "language": "cobol"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unsupported language: cobol");
    }

    #[tokio::test]
    async fn test_append_to_full_canvas_is_rejected() {
        let state = state();
        let full: Vec<Element> = (0..MAX_ELEMENTS_PER_CANVAS)
            .map(|i| {
                Element::new(canvas_core::ElementKind::Circle { radius: 1.0 })
                    .with_id(format!("e{i}"))
            })
            .collect();
        state.store.replace("f1", full, None, None).expect("fill");
        let app = router(state.clone());

        let element = json!({"id": "extra", "type": "circle", "x": 0.0, "y": 0.0, "radius": 1.0});
        let (status, body) = call(&app, Method::POST, "/api/canvas/f1/element", Some(element)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some_and(|e| e.contains("elements")), "{body}");
        assert_eq!(state.store.peek("f1").expect("canvas").len(), MAX_ELEMENTS_PER_CANVAS);
    }
}
