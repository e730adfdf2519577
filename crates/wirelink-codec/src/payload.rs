use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// The pluggable serialization layer.
///
/// Implementations encode a value against a schema id and return a byte
/// buffer, or a typed error. The engine treats this as a black box: the
/// same codec encodes application payloads and the wire envelopes
/// (under the reserved envelope schema ids).
///
/// Self-describing formats are free to ignore the schema id; schema-ful
/// formats use it to locate their schema.
pub trait PayloadCodec: Send + Sync + 'static {
    fn encode<T: Serialize + ?Sized>(&self, value: &T, schema_id: &str) -> Result<Bytes>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8], schema_id: &str) -> Result<T>;

    /// Strip fields not declared by the schema (JSON mode only).
    ///
    /// The default is a no-op for codecs whose wire format already
    /// matches the declared shape.
    fn prune(&self, value: &mut serde_json::Value, schema_id: &str) -> Result<()> {
        let _ = (value, schema_id);
        Ok(())
    }

    /// Whether encoded buffers are text (JSON mode) rather than binary.
    /// Transports use this to request the matching response delivery.
    fn is_text(&self) -> bool {
        false
    }
}
