//! The two wire envelope shapes.
//!
//! Envelopes are themselves schema-encoded structures (via the payload
//! codec, under the reserved schema ids below), not an ad hoc byte
//! layout, so the framing stays forward-compatible.

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::error::RpcError;

/// Reserved schema id for the request-direction envelope.
pub const SCHEMA_SERVER_INPUT: &str = "ServerInputData";

/// Reserved schema id for the response-direction envelope.
pub const SCHEMA_SERVER_OUTPUT: &str = "ServerOutputData";

/// Request-direction envelope: every API request and outbound message.
///
/// `sn` is present on API requests and absent on messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInput {
    pub service_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer: Option<ByteBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sn: Option<u64>,
}

/// Response-direction envelope: API responses and pushed messages.
///
/// For API responses exactly one of `buffer` (success) or `error`
/// (failure) is present. For pushed messages `buffer` is present and
/// `sn` absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sn: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer: Option<ByteBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}
