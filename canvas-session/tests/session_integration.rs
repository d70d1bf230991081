//! Two sessions against a real server: store writes and relay fan-out.

mod common;

use canvas_core::{Element, ElementId, ElementKind};
use canvas_session::{CanvasSession, CodeEdit};
use common::{eventually, TestServer};

async fn connect(server: &TestServer, file_id: &str) -> CanvasSession {
    let session = CanvasSession::connect(&server.http_url(), &server.ws_url())
        .await
        .expect("connect");
    session.activate(file_id).await.expect("activate");
    session.flush().await;
    session
}

fn rect(id: &str) -> Element {
    Element::new(ElementKind::Rectangle {
        width: 20.0,
        height: 10.0,
    })
    .with_id(id)
}

#[tokio::test]
async fn local_add_reaches_peer_and_store_without_echo() {
    let server = TestServer::start().await;
    let alice = connect(&server, "board").await;
    let bob = connect(&server, "board").await;
    assert!(eventually(|| alice.users_count() == 2).await);

    alice.add_element(rect("r1")).expect("add");
    alice.flush().await;

    assert!(eventually(|| bob.element(&ElementId::from("r1")).is_some()).await);
    let stored = server.state().store.peek("board").expect("canvas");
    assert_eq!(stored.elements.len(), 1);
    // The relay does not send an edit back to its author.
    assert_eq!(alice.elements().len(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn modify_and_delete_propagate() {
    let server = TestServer::start().await;
    let alice = connect(&server, "board").await;
    let bob = connect(&server, "board").await;
    assert!(eventually(|| bob.users_count() == 2).await);

    let id = ElementId::from("r1");
    alice.add_element(rect("r1")).expect("add");
    assert!(eventually(|| bob.element(&id).is_some()).await);

    bob.move_element(&id, 100.0, 200.0).expect("move");
    bob.flush().await;
    assert!(eventually(|| alice.element(&id).is_some_and(|e| e.x == 100.0)).await);
    let stored = server.state().store.peek("board").expect("canvas");
    assert_eq!(stored.elements[0].y, 200.0);

    alice.delete_element(&id).expect("delete");
    alice.flush().await;
    assert!(eventually(|| bob.elements().is_empty()).await);
    assert!(server.state().store.peek("board").expect("canvas").elements.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn code_edits_persist_once_flushed() {
    let server = TestServer::start().await;
    let alice = connect(&server, "board").await;
    let id = ElementId::from("c1");
    alice
        .add_element(
            Element::new(ElementKind::Code {
                code: String::new(),
                language: "python".into(),
                output: String::new(),
            })
            .with_id("c1"),
        )
        .expect("add");

    alice.edit_code(&id, CodeEdit::code("print(1)")).expect("edit");
    alice.edit_code(&id, CodeEdit::code("print(2)")).expect("edit");
    alice.flush_edits().await;

    let stored = server.state().store.peek("board").expect("canvas");
    match &stored.elements[0].kind {
        ElementKind::Code { code, .. } => assert_eq!(code, "print(2)"),
        other => panic!("expected code block, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn run_code_renders_gateway_failure_into_output() {
    let server = TestServer::start().await;
    let alice = connect(&server, "board").await;
    let id = ElementId::from("c1");
    alice
        .add_element(
            Element::new(ElementKind::Code {
                code: "print(1)".into(),
                language: "python".into(),
                output: String::new(),
            })
            .with_id("c1"),
        )
        .expect("add");

    let rendered = alice.run_code(&id).await.expect("run");
    assert_eq!(rendered, "Failed to execute code");
    assert!(!alice.is_running(&id));

    alice.flush_edits().await;
    let stored = server.state().store.peek("board").expect("canvas");
    match &stored.elements[0].kind {
        ElementKind::Code { output, .. } => assert_eq!(output, "Failed to execute code"),
        other => panic!("expected code block, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn switching_canvas_leaves_previous_room() {
    let server = TestServer::start().await;
    let alice = connect(&server, "first").await;
    let rooms = server.state().relay.rooms().clone();
    assert!(eventually(|| rooms.count("first") == 1).await);

    alice.activate("second").await.expect("activate");
    alice.flush().await;

    assert!(eventually(|| rooms.count("first") == 0 && rooms.count("second") == 1).await);
    assert_eq!(alice.file_id().as_deref(), Some("second"));

    server.shutdown().await;
}

#[tokio::test]
async fn events_from_other_canvases_do_not_leak() {
    let server = TestServer::start().await;
    let alice = connect(&server, "first").await;
    let bob = connect(&server, "second").await;

    alice.add_element(rect("r1")).expect("add");
    alice.save().expect("save");
    alice.flush().await;

    let carol = connect(&server, "first").await;
    assert!(eventually(|| carol.elements().len() == 1).await);
    assert!(bob.elements().is_empty());

    server.shutdown().await;
}
