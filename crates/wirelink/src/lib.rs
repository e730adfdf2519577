//! Transport-agnostic RPC client engine.
//!
//! Wirelink turns typed API calls and one-way messages into framed,
//! schema-encoded envelopes, ships them over a pluggable transport, and
//! settles the matching in-flight call exactly once when a response —
//! or a terminal failure — arrives.
//!
//! # Crate Structure
//!
//! - [`proto`] — protocol description, service lookup, envelopes and
//!   the error taxonomy
//! - [`codec`] — payload codec contract, MessagePack and JSON wire
//!   modes, envelope encoding
//! - [`io`] — I/O proxy contracts and the in-memory transport
//! - [`client`] — pending-call table, flows, connection state machine
//!   and the HTTP/WebSocket adapters

/// Re-export protocol types.
pub mod proto {
    pub use wirelink_proto::*;
}

/// Re-export codec types.
pub mod codec {
    pub use wirelink_codec::*;
}

/// Re-export I/O proxy contracts.
pub mod io {
    pub use wirelink_io::*;
}

/// Re-export the client engine.
pub mod client {
    pub use wirelink_client::*;
}
