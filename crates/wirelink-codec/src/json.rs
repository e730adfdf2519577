//! Text wire mode: JSON with optional pruning.
//!
//! JSON itself is schema-free, so the wire payload would otherwise carry
//! whatever extra fields the caller's value happens to have. Pruning
//! strips fields not declared in the schema shape table before encoding
//! and after decoding, keeping the wire payload aligned with the
//! declared shape.

use std::collections::HashMap;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use wirelink_proto::{SchemaShape, ServiceProto};

use crate::error::{CodecError, Result};
use crate::payload::PayloadCodec;

/// JSON payload codec.
///
/// Built from the protocol description's shape table; schema ids with
/// no declared shape pass through unpruned (the envelope schema ids
/// among them).
#[derive(Debug, Clone, Default)]
pub struct JsonCodec {
    shapes: HashMap<String, SchemaShape>,
    prune: bool,
}

impl JsonCodec {
    pub fn new(proto: &ServiceProto) -> Self {
        Self {
            shapes: proto.types.clone(),
            prune: true,
        }
    }

    /// Disable or re-enable pruning (default: enabled).
    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    fn prune_value(&self, value: &mut Value, schema_id: &str) -> Result<()> {
        let Some(shape) = self.shapes.get(schema_id) else {
            return Ok(());
        };
        let Value::Object(map) = value else {
            return Err(CodecError::Prune {
                schema_id: schema_id.to_string(),
                message: format!("expected an object, got {}", kind_of(value)),
            });
        };
        map.retain(|key, _| shape.fields.iter().any(|field| field == key));
        Ok(())
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl PayloadCodec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T, schema_id: &str) -> Result<Bytes> {
        let mut value =
            serde_json::to_value(value).map_err(|err| CodecError::encode(schema_id, err))?;
        if self.prune {
            self.prune_value(&mut value, schema_id)?;
        }
        serde_json::to_vec(&value)
            .map(Bytes::from)
            .map_err(|err| CodecError::encode(schema_id, err))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8], schema_id: &str) -> Result<T> {
        let mut value: Value =
            serde_json::from_slice(bytes).map_err(|err| CodecError::decode(schema_id, err))?;
        if self.prune {
            self.prune_value(&mut value, schema_id)?;
        }
        serde_json::from_value(value).map_err(|err| CodecError::decode(schema_id, err))
    }

    fn prune(&self, value: &mut Value, schema_id: &str) -> Result<()> {
        self.prune_value(value, schema_id)
    }

    fn is_text(&self) -> bool {
        true
    }
}
