//! # Excalicode Canvas Session
//!
//! Client side of the collaborative whiteboard: one [`CanvasSession`] per
//! user, talking to the element store over HTTP and to the realtime relay
//! over WebSocket.
//!
//! ```text
//!   local edit ──► local list ──► outbound worker ──► store ──► relay
//!   relay event ─► local list
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod debounce;
pub mod error;
pub mod relay;
pub mod session;

pub use api::{CanvasApi, HttpCanvasApi, RunOutput};
pub use debounce::Debouncer;
pub use error::{ClientError, RelayError, SessionError, SessionResult};
pub use relay::{RelayLink, WsRelayClient};
pub use session::{CanvasSession, CodeEdit, RemoteCursor};
