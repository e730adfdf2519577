//! I/O proxy contracts.
//!
//! The correlation engine never touches a live network primitive; it
//! talks to one of two narrow capabilities defined here. A short-lived
//! "fetch-like" [`HttpProxy`] issues one request and resolves with the
//! response body or a network error. A persistent "socket-like"
//! [`SocketProxy`] opens a connection and feeds events through a
//! channel. Swapping in the [`memory`] transport makes the whole stack
//! testable in-process with no real sockets.

pub mod error;
pub mod http;
pub mod memory;
pub mod socket;

pub use error::{ProxyError, Result};
pub use http::{HttpProxy, HttpRequest, HttpResponseBody, ProgressFn, ResponseKind};
pub use memory::{memory_socket, MemoryConn, MemoryListener, MemorySocketProxy};
pub use socket::{SocketEvent, SocketHandle, SocketProxy};
