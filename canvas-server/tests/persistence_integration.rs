//! Durability across server restarts.

mod common;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use common::TestServer;

const NO_EXECUTION: &str = "http://127.0.0.1:9/api/v2/piston";

#[tokio::test]
async fn canvas_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = Client::new();

    let server = TestServer::start_with(Some(dir.path()), NO_EXECUTION).await;
    client
        .put(server.url("/api/canvas/board"))
        .json(&json!({
            "elements": [
                {"id": "c1", "type": "code", "x": 1.0, "y": 2.0, "code": "print(1)", "language": "python"},
                {"id": "r1", "type": "rectangle", "width": 4.0, "height": 5.0}
            ],
            "viewportTransform": [2.0, 0.0, 0.0, 2.0, 10.0, 20.0]
        }))
        .send()
        .await
        .expect("request");
    client
        .put(server.url("/api/canvas/board/element/c1"))
        .json(&json!({"code": "print(2)"}))
        .send()
        .await
        .expect("request");
    server.shutdown().await;

    assert!(dir.path().join("canvases").join("board.json").is_file());

    let server = TestServer::start_with(Some(dir.path()), NO_EXECUTION).await;
    assert!(server.state().store.contains("board"));

    let response = client
        .get(server.url("/api/canvas/board"))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let canvas: Value = response.json().await.expect("json body");

    assert_eq!(canvas["elements"][0]["code"], "print(2)");
    assert_eq!(canvas["elements"][0]["language"], "python");
    assert_eq!(canvas["elements"][1]["type"], "rectangle");
    assert_eq!(canvas["viewportTransform"], json!([2.0, 0.0, 0.0, 2.0, 10.0, 20.0]));

    server.shutdown().await;
}

#[tokio::test]
async fn file_tree_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = Client::new();

    let server = TestServer::start_with(Some(dir.path()), NO_EXECUTION).await;
    let file: Value = client
        .post(server.url("/api/files"))
        .json(&json!({"name": "Notes", "type": "file"}))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json body");
    server.shutdown().await;

    let server = TestServer::start_with(Some(dir.path()), NO_EXECUTION).await;
    let files: Value = client
        .get(server.url("/api/files"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json body");
    assert_eq!(files[0]["id"], file["id"]);
    assert_eq!(files[0]["name"], "Notes");

    let canvas_id = file["canvasId"].as_str().expect("canvasId");
    assert!(server.state().store.contains(canvas_id));

    server.shutdown().await;
}

#[tokio::test]
async fn readiness_reports_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let server = TestServer::start_with(Some(dir.path()), NO_EXECUTION).await;

    let response = Client::new()
        .get(server.url("/health/ready"))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["canvas_store"], true);

    server.shutdown().await;
}
