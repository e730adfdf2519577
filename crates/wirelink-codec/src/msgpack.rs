//! Binary wire mode: MessagePack.
//!
//! Uses `rmp_serde::to_vec_named` so structs travel as maps with field
//! names, matching the envelope's camelCase wire contract across
//! implementations in other languages.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CodecError, Result};
use crate::payload::PayloadCodec;

/// Self-describing binary codec. Schema ids are accepted for error
/// attribution but not needed for encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl PayloadCodec for MsgPackCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T, schema_id: &str) -> Result<Bytes> {
        rmp_serde::to_vec_named(value)
            .map(Bytes::from)
            .map_err(|err| CodecError::encode(schema_id, err))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8], schema_id: &str) -> Result<T> {
        rmp_serde::from_slice(bytes).map_err(|err| CodecError::decode(schema_id, err))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct ReqTest {
        name: String,
    }

    #[test]
    fn roundtrip_struct() {
        let codec = MsgPackCodec;
        let req = ReqTest {
            name: "Req1".to_string(),
        };
        let bytes = codec.encode(&req, "PtlTest/ReqTest").unwrap();
        let back: ReqTest = codec.decode(&bytes, "PtlTest/ReqTest").unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn structs_encode_as_maps_not_arrays() {
        let codec = MsgPackCodec;
        let bytes = codec
            .encode(
                &ReqTest {
                    name: "x".to_string(),
                },
                "PtlTest/ReqTest",
            )
            .unwrap();
        // fixmap marker, not fixarray: field names are on the wire.
        assert_eq!(bytes[0] & 0xF0, 0x80);
    }

    #[test]
    fn decode_error_names_the_schema() {
        let codec = MsgPackCodec;
        let err = codec
            .decode::<ReqTest>(b"not msgpack", "PtlTest/ReqTest")
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::Decode { schema_id, .. } if schema_id == "PtlTest/ReqTest"
        ));
    }
}
