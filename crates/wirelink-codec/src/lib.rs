//! Payload codec contract and envelope encoding.
//!
//! The payload codec is the pluggable serialization layer: it encodes a
//! value against a schema id and hands back bytes. Two wire modes ship
//! here — MessagePack (binary, the default) and JSON text with optional
//! pruning of undeclared fields. The envelope functions wrap and unwrap
//! the two wire envelope shapes around already-encoded payloads.

pub mod envelope;
pub mod error;
pub mod json;
pub mod msgpack;
pub mod payload;

pub use envelope::{
    decode_api_res, decode_server_output, encode_api_req, encode_api_return, encode_client_msg,
    encode_server_msg, ParsedServerOutput,
};
pub use error::{CodecError, DecodeError, Result};
pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
pub use payload::PayloadCodec;
