use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors raised while building a [`ServiceMap`](crate::ServiceMap).
///
/// These are fatal: a protocol description with duplicate names or ids
/// cannot be trusted for routing.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    /// Two services share the same numeric id.
    #[error("duplicate service id {0} in protocol description")]
    DuplicateId(u32),

    /// Two API services share the same name.
    #[error("duplicate api name '{0}' in protocol description")]
    DuplicateApiName(String),

    /// Two message services share the same name.
    #[error("duplicate msg name '{0}' in protocol description")]
    DuplicateMsgName(String),
}

pub type Result<T> = std::result::Result<T, ProtoError>;

/// Canonical settled shape of an API call: the typed response, or an
/// [`RpcError`] describing why there is none.
pub type ApiReturn<T> = std::result::Result<T, RpcError>;

/// Broad failure categories, shared with the companion server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcErrorKind {
    /// Connection refused, timeout, socket closed, connection lost.
    /// Recoverable by retrying the call.
    NetworkError,
    /// A business-level failure deliberately returned by the remote
    /// handler.
    ApiError,
    /// Caller-side misuse: invalid name, not connected, local encode or
    /// prune failure. Not retried automatically.
    ClientError,
    /// Unhandled exception on the remote side, or server output the
    /// client could not decode.
    ServerError,
}

impl fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NetworkError => "NetworkError",
            Self::ApiError => "ApiError",
            Self::ClientError => "ClientError",
            Self::ServerError => "ServerError",
        };
        f.write_str(name)
    }
}

/// Well-known machine-readable error codes.
pub mod codes {
    /// The per-call timeout elapsed before a response arrived.
    pub const TIMEOUT: &str = "TIMEOUT";
    /// The persistent connection dropped while the call was in flight.
    pub const CONNECTION_LOST: &str = "CONNECTION_LOST";
    /// The API or message name is not declared in the protocol.
    pub const INVALID_NAME: &str = "INVALID_NAME";
    /// A send was attempted while the socket is not open.
    pub const WS_NOT_OPEN: &str = "WS_NOT_OPEN";
    /// Writing onto the open socket failed locally.
    pub const SEND_BUF_ERR: &str = "SEND_BUF_ERR";
    /// The call was aborted by the caller.
    pub const CANCELED: &str = "CANCELED";
    /// A flow hook short-circuited the operation.
    pub const FLOW_CANCELED: &str = "FLOW_CANCELED";
    /// The response buffer could not be decoded against the response
    /// schema.
    pub const RES_DECODE_ERR: &str = "RES_DECODE_ERR";
}

/// The error value carried by every failed [`ApiReturn`].
///
/// Expected failures are returned, never panicked: network faults,
/// timeouts and business errors all travel as `RpcError` values so the
/// caller can branch on [`kind`](Self::kind) and [`code`](Self::code).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: RpcErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<serde_json::Value>,
}

impl RpcError {
    pub fn new(kind: RpcErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            code: None,
            info: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::NetworkError, message)
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::ClientError, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::ServerError, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::ApiError, message)
    }

    /// Attach a machine-readable code (see [`codes`]).
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach caller-defined structured detail.
    pub fn with_info(mut self, info: serde_json::Value) -> Self {
        self.info = Some(info);
        self
    }

    /// True when the code matches one of the well-known [`codes`].
    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}/{}] {}", self.kind, code, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for RpcError {}
