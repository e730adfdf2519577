use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

/// Events fired by a persistent socket, in the order the platform
/// delivers them.
///
/// A connection attempt that fails produces `Closed` (usually preceded
/// by `Error`) without ever producing `Opened` — the same sequence a
/// platform WebSocket fires.
#[derive(Debug)]
pub enum SocketEvent {
    Opened,
    Message(Bytes),
    /// Text frames are tolerated but the engine never decodes them.
    Text(String),
    Error(String),
    Closed {
        code: Option<u16>,
        reason: String,
    },
}

/// Write side of an open socket.
pub trait SocketHandle: Send + Sync + 'static {
    /// Queue bytes onto the connection. Errors describe local send
    /// failure only; delivery is the transport's business.
    fn send(&self, data: Bytes) -> Result<()>;

    /// Ask the platform to close. Completion arrives as a
    /// [`SocketEvent::Closed`] on the event stream.
    fn close(&self, code: Option<u16>, reason: &str);
}

/// Persistent socket-like capability.
pub trait SocketProxy: Send + Sync + 'static {
    type Handle: SocketHandle;

    /// Start a connection attempt. Returns immediately with the write
    /// handle and the event stream; the outcome of the attempt arrives
    /// as the first event (`Opened`, or `Closed` on failure).
    fn open(&self, server: &str) -> Result<(Self::Handle, mpsc::UnboundedReceiver<SocketEvent>)>;
}
