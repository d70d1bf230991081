//! # Canvas Session
//!
//! Keeps the local element list of the active canvas consistent across local
//! edits, remote relay events and the element store.
//!
//! - Local edits apply to the local list immediately, then persist and are
//!   emitted to the relay by a single ordered worker. A failed persist is
//!   logged and not rolled back.
//! - Remote events apply the same merge rule (add, replace by id, remove by
//!   id) and are neither persisted nor re-emitted.
//! - [`CanvasSession::save`] writes the whole local list in one call.
//! - Code-block edits are debounced per element before they persist. The
//!   patch is built from the local list when the quiet period ends, so moves
//!   made in between are kept.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use canvas_core::{
    Canvas, ClientMessage, Element, ElementId, ElementKind, ElementPatch, ServerMessage,
    ViewportTransform, DEFAULT_BACKGROUND, IDENTITY_VIEWPORT,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::api::{CanvasApi, HttpCanvasApi, RunOutput};
use crate::debounce::{Debouncer, DEFAULT_QUIET_PERIOD};
use crate::error::{ClientError, SessionError, SessionResult};
use crate::relay::{RelayLink, WsRelayClient};

/// A remote user's pointer on the active canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCursor {
    /// Canvas X coordinate.
    pub x: f64,
    /// Canvas Y coordinate.
    pub y: f64,
    /// Cursor color chosen by that user.
    pub color: String,
}

/// A local change to a code block. Unset fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeEdit {
    /// New source text.
    pub code: Option<String>,
    /// New language identifier.
    pub language: Option<String>,
    /// New output text.
    pub output: Option<String>,
}

impl CodeEdit {
    /// Change the source text.
    #[must_use]
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::default()
        }
    }

    /// Change the language.
    #[must_use]
    pub fn language(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            ..Self::default()
        }
    }

    /// Change the output pane.
    #[must_use]
    pub fn output(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..Self::default()
        }
    }
}

/// Text shown in a code block's output pane after a run.
#[must_use]
pub fn render_run_output(result: &RunOutput) -> String {
    if result.stderr.is_empty() {
        result.output.clone()
    } else {
        format!("Error:\n{}", result.stderr)
    }
}

/// Text shown in a code block's output pane when the run itself failed.
#[must_use]
pub fn render_run_failure(error: &ClientError) -> String {
    match error {
        ClientError::Api { message, .. } => message.clone(),
        _ => "Failed to execute code".to_string(),
    }
}

/// Work for the outbound worker. Each item persists (if needed) and then
/// emits one relay message.
#[derive(Debug)]
enum Outbound {
    Add {
        file_id: String,
        element: Element,
    },
    Modify {
        file_id: String,
        patch: ElementPatch,
        element: Element,
    },
    Delete {
        file_id: String,
        element_id: ElementId,
    },
    Save {
        file_id: String,
        elements: Vec<Element>,
        viewport: ViewportTransform,
    },
    Emit(ClientMessage),
    Barrier(oneshot::Sender<()>),
}

struct SessionState {
    file_id: Option<String>,
    elements: Vec<Element>,
    viewport: ViewportTransform,
    background: String,
    connection_id: Option<String>,
    users_count: usize,
    cursors: HashMap<String, RemoteCursor>,
    running: HashSet<ElementId>,
    /// Code blocks with edits not yet persisted.
    dirty_code: HashSet<ElementId>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            file_id: None,
            elements: Vec::new(),
            viewport: IDENTITY_VIEWPORT,
            background: DEFAULT_BACKGROUND.to_string(),
            connection_id: None,
            users_count: 0,
            cursors: HashMap::new(),
            running: HashSet::new(),
            dirty_code: HashSet::new(),
        }
    }

    fn active(&self) -> SessionResult<String> {
        self.file_id.clone().ok_or(SessionError::NoActiveCanvas)
    }

    fn load(&mut self, canvas: Canvas) {
        self.file_id = Some(canvas.file_id);
        self.elements = canvas.elements;
        self.viewport = canvas.viewport_transform;
        self.background = canvas.background_color;
        self.users_count = 0;
        self.cursors.clear();
        self.running.clear();
        self.dirty_code.clear();
    }

    fn unload(&mut self) -> Option<String> {
        self.elements.clear();
        self.users_count = 0;
        self.cursors.clear();
        self.running.clear();
        self.dirty_code.clear();
        self.file_id.take()
    }
}

/// Insert `element`, replacing any element with the same id in place.
fn upsert(elements: &mut Vec<Element>, element: Element) {
    match elements.iter().position(|e| e.id == element.id) {
        Some(index) => elements[index] = element,
        None => elements.push(element),
    }
}

/// Replace the element with the same id; absent ids are left alone.
fn replace_existing(elements: &mut [Element], element: Element) -> bool {
    match elements.iter_mut().find(|e| e.id == element.id) {
        Some(slot) => {
            *slot = element;
            true
        }
        None => false,
    }
}

/// Patch persisting a code block's content and position, or `None` for
/// other kinds.
fn code_patch(element: &Element) -> Option<ElementPatch> {
    let ElementKind::Code {
        code,
        language,
        output,
    } = &element.kind
    else {
        return None;
    };
    Some(
        ElementPatch::new()
            .set("code", code.clone())
            .set("language", language.clone())
            .set("output", output.clone())
            .set("x", element.x)
            .set("y", element.y),
    )
}

fn remove_by_id(elements: &mut Vec<Element>, id: &ElementId) -> bool {
    let before = elements.len();
    elements.retain(|e| &e.id != id);
    elements.len() != before
}

struct Inner {
    api: Arc<dyn CanvasApi>,
    state: RwLock<SessionState>,
    outbound: mpsc::UnboundedSender<Outbound>,
    code_edits: Debouncer<CodeKey, CodeKey>,
}

/// Canvas and element of a debounced code edit.
type CodeKey = (String, ElementId);

/// Client-side session on one canvas at a time.
///
/// Cheap to clone; clones share state. Must be created within a Tokio
/// runtime.
#[derive(Clone)]
pub struct CanvasSession {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CanvasSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasSession")
            .field("file_id", &self.file_id())
            .finish_non_exhaustive()
    }
}

impl CanvasSession {
    /// Create a session with the default code-edit quiet period.
    #[must_use]
    pub fn new(api: Arc<dyn CanvasApi>, relay: Arc<dyn RelayLink>) -> Self {
        Self::with_quiet_period(api, relay, DEFAULT_QUIET_PERIOD)
    }

    /// Create a session debouncing code edits by `quiet`.
    #[must_use]
    pub fn with_quiet_period(
        api: Arc<dyn CanvasApi>,
        relay: Arc<dyn RelayLink>,
        quiet: Duration,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_outbound(Arc::clone(&api), relay, outbound_rx));

        let (quiet_tx, mut quiet_rx) = mpsc::unbounded_channel::<CodeKey>();
        let session = Self {
            inner: Arc::new(Inner {
                api,
                state: RwLock::new(SessionState::new()),
                code_edits: Debouncer::new(quiet, quiet_tx),
                outbound: outbound_tx,
            }),
        };

        let weak: Weak<Inner> = Arc::downgrade(&session.inner);
        tokio::spawn(async move {
            while let Some((file_id, element_id)) = quiet_rx.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                Self { inner }.persist_code_edit(&file_id, &element_id);
            }
        });

        session
    }

    /// Connect to a server over HTTP and WebSocket and start applying relay
    /// events.
    ///
    /// # Errors
    ///
    /// Returns an error if either URL is invalid or the relay handshake
    /// fails.
    pub async fn connect(http_url: &str, ws_url: &str) -> SessionResult<Self> {
        let api = HttpCanvasApi::new(http_url)?;
        let (relay, inbound) = WsRelayClient::connect(ws_url).await?;
        let session = Self::new(Arc::new(api), Arc::new(relay));
        session.attach(inbound);
        Ok(session)
    }

    /// Apply every message from `inbound` until it closes or the session is
    /// dropped.
    pub fn attach(&self, mut inbound: mpsc::UnboundedReceiver<ServerMessage>) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                Self { inner }.apply_remote(message);
            }
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, op: Outbound) {
        if self.inner.outbound.send(op).is_err() {
            tracing::warn!("Outbound worker stopped; dropping local change");
        }
    }

    // ------------------------------------------------------------------
    // Activation
    // ------------------------------------------------------------------

    /// Make `file_id` the active canvas.
    ///
    /// Leaves the previous room (after flushing its pending code edits),
    /// fetches the canvas, replaces the local list wholesale and joins the
    /// new room.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Client`] if the fetch fails; the session is
    /// then left without an active canvas.
    #[tracing::instrument(skip(self))]
    pub async fn activate(&self, file_id: &str) -> SessionResult<()> {
        self.leave();

        let canvas = self.inner.api.get_canvas(file_id).await?;
        let count = canvas.elements.len();
        self.write().load(canvas);
        self.enqueue(Outbound::Emit(ClientMessage::Join {
            file_id: file_id.to_string(),
        }));

        tracing::info!(file_id = %file_id, elements = count, "Canvas activated");
        Ok(())
    }

    /// Leave the active canvas, if any.
    ///
    /// Pending code edits are flushed first so they still reach the store.
    pub fn leave(&self) {
        let previous = {
            let mut state = self.write();
            self.drain_code_edits(&mut state);
            state.unload()
        };
        self.inner.code_edits.clear();
        if let Some(file_id) = previous {
            tracing::debug!(file_id = %file_id, "Leaving canvas");
            self.enqueue(Outbound::Emit(ClientMessage::Leave { file_id }));
        }
    }

    // ------------------------------------------------------------------
    // Local edits
    // ------------------------------------------------------------------

    /// Add an element (or replace one with the same id).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoActiveCanvas`] if no canvas is active.
    pub fn add_element(&self, element: Element) -> SessionResult<()> {
        let file_id = {
            let mut state = self.write();
            let file_id = state.active()?;
            upsert(&mut state.elements, element.clone());
            file_id
        };
        self.enqueue(Outbound::Add { file_id, element });
        Ok(())
    }

    /// Merge `patch` into an element and return the result.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ElementNotFound`] if the element is not in the
    /// local list, or [`SessionError::Patch`] if the patch is invalid.
    pub fn modify_element(
        &self,
        element_id: &ElementId,
        patch: ElementPatch,
    ) -> SessionResult<Element> {
        let (file_id, element) = {
            let mut state = self.write();
            let file_id = state.active()?;
            let slot = state
                .elements
                .iter_mut()
                .find(|e| &e.id == element_id)
                .ok_or_else(|| SessionError::ElementNotFound(element_id.clone()))?;
            let patched = patch.apply(slot)?;
            *slot = patched.clone();
            (file_id, patched)
        };
        self.enqueue(Outbound::Modify {
            file_id,
            patch,
            element: element.clone(),
        });
        Ok(element)
    }

    /// Move an element.
    ///
    /// # Errors
    ///
    /// See [`CanvasSession::modify_element`].
    pub fn move_element(&self, element_id: &ElementId, x: f64, y: f64) -> SessionResult<Element> {
        self.modify_element(element_id, ElementPatch::new().set("x", x).set("y", y))
    }

    /// Delete an element. Returns whether it was in the local list.
    ///
    /// The delete is persisted and emitted either way.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoActiveCanvas`] if no canvas is active.
    pub fn delete_element(&self, element_id: &ElementId) -> SessionResult<bool> {
        let (file_id, removed) = {
            let mut state = self.write();
            let file_id = state.active()?;
            state.running.remove(element_id);
            state.dirty_code.remove(element_id);
            (file_id, remove_by_id(&mut state.elements, element_id))
        };
        self.inner
            .code_edits
            .cancel(&(file_id.clone(), element_id.clone()));
        self.enqueue(Outbound::Delete {
            file_id,
            element_id: element_id.clone(),
        });
        Ok(removed)
    }

    /// Change a code block locally; persistence waits for the quiet period.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ElementNotFound`] or
    /// [`SessionError::NotCodeBlock`].
    pub fn edit_code(&self, element_id: &ElementId, edit: CodeEdit) -> SessionResult<Element> {
        self.stage_code_edit(None, element_id, edit)?
            .ok_or(SessionError::NoActiveCanvas)
    }

    /// Apply `edit` locally and schedule its persist. Returns `None` without
    /// touching anything when `only_in` is set and another canvas is active.
    fn stage_code_edit(
        &self,
        only_in: Option<&str>,
        element_id: &ElementId,
        edit: CodeEdit,
    ) -> SessionResult<Option<Element>> {
        let (file_id, element) = {
            let mut state = self.write();
            let file_id = state.active()?;
            if only_in.is_some_and(|expected| expected != file_id) {
                return Ok(None);
            }
            let element = state
                .elements
                .iter_mut()
                .find(|e| &e.id == element_id)
                .ok_or_else(|| SessionError::ElementNotFound(element_id.clone()))?;
            let ElementKind::Code {
                code,
                language,
                output,
            } = &mut element.kind
            else {
                return Err(SessionError::NotCodeBlock(element_id.clone()));
            };

            if let Some(new_code) = edit.code {
                *code = new_code;
            }
            if let Some(new_language) = edit.language {
                *language = new_language;
            }
            if let Some(new_output) = edit.output {
                *output = new_output;
            }

            let element = element.clone();
            state.dirty_code.insert(element_id.clone());
            (file_id, element)
        };

        let key = (file_id, element_id.clone());
        self.inner.code_edits.push(key.clone(), key);
        Ok(Some(element))
    }

    /// Queue the persist of one dirty code block, built from the local list
    /// as it is now. Skipped if the block was flushed, deleted or belongs to
    /// a canvas that is no longer active.
    fn persist_code_edit(&self, file_id: &str, element_id: &ElementId) {
        let mut state = self.write();
        if state.file_id.as_deref() != Some(file_id) || !state.dirty_code.remove(element_id) {
            tracing::trace!(file_id = %file_id, element_id = %element_id, "Code edit already settled");
            return;
        }
        let op = state
            .elements
            .iter()
            .find(|e| &e.id == element_id)
            .and_then(|element| {
                code_patch(element).map(|patch| Outbound::Modify {
                    file_id: file_id.to_string(),
                    patch,
                    element: element.clone(),
                })
            });
        if let Some(op) = op {
            self.enqueue(op);
        }
    }

    /// Queue the persist of every dirty code block on the active canvas.
    fn drain_code_edits(&self, state: &mut SessionState) {
        let Some(file_id) = state.file_id.clone() else {
            return;
        };
        let dirty: Vec<ElementId> = state.dirty_code.drain().collect();
        for element_id in dirty {
            let Some(element) = state.elements.iter().find(|e| e.id == element_id) else {
                continue;
            };
            if let Some(patch) = code_patch(element) {
                self.enqueue(Outbound::Modify {
                    file_id: file_id.clone(),
                    patch,
                    element: element.clone(),
                });
            }
        }
    }

    /// Run a code block and write the rendered result into its output pane.
    ///
    /// The block is marked running until the gateway answers. A failed run
    /// renders the error text instead of program output. The output is only
    /// written if the canvas the run started on is still active.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ElementNotFound`] or
    /// [`SessionError::NotCodeBlock`]; gateway failures are rendered, not
    /// returned.
    #[tracing::instrument(skip(self, element_id), fields(element_id = %element_id))]
    pub async fn run_code(&self, element_id: &ElementId) -> SessionResult<String> {
        let (file_id, code, language) = {
            let mut state = self.write();
            let file_id = state.active()?;
            let (code, language) = match state
                .elements
                .iter()
                .find(|e| &e.id == element_id)
                .map(|e| &e.kind)
            {
                Some(ElementKind::Code { code, language, .. }) => (code.clone(), language.clone()),
                Some(_) => return Err(SessionError::NotCodeBlock(element_id.clone())),
                None => return Err(SessionError::ElementNotFound(element_id.clone())),
            };
            state.running.insert(element_id.clone());
            (file_id, code, language)
        };

        let rendered = match self.inner.api.execute(&code, &language).await {
            Ok(result) => render_run_output(&result),
            Err(e) => {
                tracing::warn!("Code execution failed: {e}");
                render_run_failure(&e)
            }
        };

        {
            let mut state = self.write();
            if state.file_id.as_deref() == Some(file_id.as_str()) {
                state.running.remove(element_id);
            }
        }
        match self.stage_code_edit(
            Some(&file_id),
            element_id,
            CodeEdit::output(rendered.clone()),
        ) {
            Ok(Some(_)) => {}
            Ok(None) | Err(SessionError::NoActiveCanvas) => {
                tracing::debug!(file_id = %file_id, "Canvas changed during the run; output dropped");
            }
            Err(SessionError::ElementNotFound(_)) => {
                tracing::debug!("Code block gone before its run finished");
            }
            Err(e) => return Err(e),
        }
        Ok(rendered)
    }

    /// Set the local viewport; it is persisted by the next [`save`](Self::save).
    pub fn set_viewport(&self, viewport: ViewportTransform) {
        self.write().viewport = viewport;
    }

    /// Broadcast the local pointer position (not persisted).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoActiveCanvas`] if no canvas is active.
    pub fn move_cursor(&self, x: f64, y: f64, color: impl Into<String>) -> SessionResult<()> {
        let file_id = self.read().active()?;
        self.enqueue(Outbound::Emit(ClientMessage::CursorMove {
            file_id,
            x,
            y,
            color: color.into(),
        }));
        Ok(())
    }

    /// Write the entire local list to the store in one replace, then relay
    /// it as a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoActiveCanvas`] if no canvas is active.
    pub fn save(&self) -> SessionResult<()> {
        let op = {
            let state = self.read();
            Outbound::Save {
                file_id: state.active()?,
                elements: state.elements.clone(),
                viewport: state.viewport,
            }
        };
        self.enqueue(op);
        Ok(())
    }

    /// Wait until every change queued so far has been persisted and emitted.
    ///
    /// Code edits still inside their quiet period are not included; see
    /// [`flush_edits`](Self::flush_edits).
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.enqueue(Outbound::Barrier(tx));
        let _ = rx.await;
    }

    /// Release pending code edits immediately, then [`flush`](Self::flush).
    pub async fn flush_edits(&self) {
        {
            let mut state = self.write();
            self.drain_code_edits(&mut state);
        }
        self.inner.code_edits.clear();
        self.flush().await;
    }

    // ------------------------------------------------------------------
    // Remote events
    // ------------------------------------------------------------------

    /// Apply a message from the relay. Returns whether local state changed.
    ///
    /// Events for rooms other than the active canvas are ignored.
    pub fn apply_remote(&self, message: ServerMessage) -> bool {
        let mut state = self.write();

        if let Some(room) = message.file_id() {
            if state.file_id.as_deref() != Some(room) {
                tracing::trace!(room = %room, kind = message.type_name(), "Ignoring event for inactive room");
                return false;
            }
        }

        match message {
            ServerMessage::Welcome { connection_id, .. } => {
                tracing::debug!(connection_id = %connection_id, "Relay identity assigned");
                state.connection_id = Some(connection_id);
                false
            }
            ServerMessage::ElementAdded { element, .. } => {
                upsert(&mut state.elements, element);
                true
            }
            ServerMessage::ElementModified { element, .. } => {
                replace_existing(&mut state.elements, element)
            }
            ServerMessage::ElementDeleted { element_id, .. } => {
                remove_by_id(&mut state.elements, &element_id)
            }
            ServerMessage::CanvasUpdate { elements, .. } => {
                state.elements = elements;
                true
            }
            ServerMessage::CursorMove {
                x, y, color, user_id, ..
            } => {
                state.cursors.insert(user_id, RemoteCursor { x, y, color });
                true
            }
            ServerMessage::UserLeft { user_id, .. } => {
                state.cursors.remove(&user_id);
                true
            }
            ServerMessage::UsersCount { count, .. } => {
                state.users_count = count;
                true
            }
            ServerMessage::UserJoined { user_id, .. } => {
                tracing::debug!(user_id = %user_id, "User joined");
                false
            }
            ServerMessage::Pong { .. } => false,
            ServerMessage::Error { code, message } => {
                tracing::warn!(code = %code, "Relay rejected a frame: {message}");
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The active canvas, if any.
    #[must_use]
    pub fn file_id(&self) -> Option<String> {
        self.read().file_id.clone()
    }

    /// Snapshot of the local element list.
    #[must_use]
    pub fn elements(&self) -> Vec<Element> {
        self.read().elements.clone()
    }

    /// One local element.
    #[must_use]
    pub fn element(&self, element_id: &ElementId) -> Option<Element> {
        self.read()
            .elements
            .iter()
            .find(|e| &e.id == element_id)
            .cloned()
    }

    /// Local viewport.
    #[must_use]
    pub fn viewport(&self) -> ViewportTransform {
        self.read().viewport
    }

    /// Background color of the active canvas.
    #[must_use]
    pub fn background(&self) -> String {
        self.read().background.clone()
    }

    /// Identity assigned by the relay.
    #[must_use]
    pub fn connection_id(&self) -> Option<String> {
        self.read().connection_id.clone()
    }

    /// Last member count reported for the active room.
    #[must_use]
    pub fn users_count(&self) -> usize {
        self.read().users_count
    }

    /// Remote cursors by user.
    #[must_use]
    pub fn cursors(&self) -> HashMap<String, RemoteCursor> {
        self.read().cursors.clone()
    }

    /// Whether a code block is waiting for its run to finish.
    #[must_use]
    pub fn is_running(&self, element_id: &ElementId) -> bool {
        self.read().running.contains(element_id)
    }

    /// Number of code edits still inside their quiet period.
    #[must_use]
    pub fn pending_code_edits(&self) -> usize {
        self.read().dirty_code.len()
    }
}

/// Persist then emit each queued change, strictly in order.
async fn run_outbound(
    api: Arc<dyn CanvasApi>,
    relay: Arc<dyn RelayLink>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(op) = rx.recv().await {
        let (message, persisted) = match op {
            Outbound::Add { file_id, element } => {
                let persisted = api.add_element(&file_id, &element).await.map(|_| ());
                (ClientMessage::ElementAdded { file_id, element }, persisted)
            }
            Outbound::Modify {
                file_id,
                patch,
                element,
            } => {
                let persisted = api
                    .update_element(&file_id, &element.id, &patch)
                    .await
                    .map(|_| ());
                (ClientMessage::ElementModified { file_id, element }, persisted)
            }
            Outbound::Delete {
                file_id,
                element_id,
            } => {
                let persisted = api.delete_element(&file_id, &element_id).await.map(|_| ());
                (
                    ClientMessage::ElementDeleted {
                        file_id,
                        element_id,
                    },
                    persisted,
                )
            }
            Outbound::Save {
                file_id,
                elements,
                viewport,
            } => {
                let persisted = api
                    .save_canvas(&file_id, &elements, Some(viewport))
                    .await
                    .map(|_| ());
                (ClientMessage::CanvasUpdate { file_id, elements }, persisted)
            }
            Outbound::Emit(message) => (message, Ok(())),
            Outbound::Barrier(done) => {
                let _ = done.send(());
                continue;
            }
        };

        match persisted {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!(kind = message.type_name(), "Nothing to update in store: {e}");
            }
            Err(e) => {
                tracing::warn!(
                    kind = message.type_name(),
                    "Persisting local change failed; local state kept: {e}"
                );
            }
        }

        if let Err(e) = relay.send(message) {
            tracing::warn!("Relay emit failed: {e}");
        }
    }
    tracing::debug!("Outbound worker stopped");
}
