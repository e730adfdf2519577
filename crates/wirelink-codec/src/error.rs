/// Errors from a payload codec operation.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A value could not be encoded against its schema.
    #[error("encode failed for schema '{schema_id}': {message}")]
    Encode { schema_id: String, message: String },

    /// Bytes could not be decoded against their schema.
    #[error("decode failed for schema '{schema_id}': {message}")]
    Decode { schema_id: String, message: String },

    /// The payload is fundamentally incompatible with its declared
    /// shape (JSON mode only). Nothing is sent.
    #[error("prune failed for schema '{schema_id}': {message}")]
    Prune { schema_id: String, message: String },
}

impl CodecError {
    pub(crate) fn encode(schema_id: &str, err: impl std::fmt::Display) -> Self {
        Self::Encode {
            schema_id: schema_id.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(schema_id: &str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            schema_id: schema_id.to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors from unwrapping an inbound envelope, attributed to the layer
/// that failed: the outer envelope or the inner payload.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The outer envelope itself could not be decoded.
    #[error("envelope decode failed: {0}")]
    Envelope(#[source] CodecError),

    /// The envelope decoded but names a service id the protocol does
    /// not declare.
    #[error("unknown service id {0}")]
    UnknownService(u32),

    /// Neither the envelope nor the caller supplied a service id.
    #[error("missing service id in server output")]
    MissingServiceId,

    /// An API response with neither a success buffer nor an error.
    #[error("empty api return: neither buffer nor error present")]
    EmptyApiReturn,

    /// A pushed message without a payload buffer.
    #[error("empty msg buffer")]
    EmptyMsgBuffer,

    /// The inner payload could not be decoded against its schema.
    #[error("payload decode failed for schema '{schema_id}'")]
    Payload {
        schema_id: String,
        #[source]
        source: CodecError,
    },

    /// The service resolved to a message service where an API service
    /// was required, or vice versa.
    #[error("service '{0}' is not an api service")]
    NotApi(String),
}
