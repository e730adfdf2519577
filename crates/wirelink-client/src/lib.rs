//! Transport-agnostic RPC client engine.
//!
//! The engine turns typed API calls and one-way messages into framed
//! envelopes, ships them through an I/O proxy, and settles the matching
//! in-flight call when a response — or a terminal failure — arrives.
//! Every call settles exactly once, no matter how network completion,
//! timeout, explicit abort and connection loss race.
//!
//! Two adapters share the core: [`HttpClient`] issues one short-lived
//! request per call; [`WsClient`] drives a persistent socket through an
//! explicit connection state machine and a shared inbound stream.

pub mod core;
pub mod counter;
pub mod flow;
pub mod http;
pub mod options;
pub mod pending;
pub mod status;
pub mod ws;

pub use crate::core::{ClientCore, MsgHandle};
pub use counter::SerialCounter;
pub use flow::{
    ClientFlows, DisconnectData, Flow, PostConnectData, PreConnectData, SendBufferData,
};
pub use http::HttpClient;
pub use options::{CallApiOptions, ClientOptions, LostConnectionFn, StatusFn, WsClientOptions};
pub use pending::PendingCalls;
pub use status::ConnectionState;
pub use ws::WsClient;
