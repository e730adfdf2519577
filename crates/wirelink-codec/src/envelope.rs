//! Wrapping and unwrapping the wire envelopes.
//!
//! Outbound: the payload is encoded against its own schema, then the
//! envelope (service id, optional serial number, payload buffer) is
//! encoded as a schema-described structure of its own — through the
//! same payload codec, under the reserved envelope schema ids.
//!
//! Inbound: the envelope is decoded first, the service id resolved
//! against the service map, and only then is the inner payload touched.
//! Failures always name the layer that broke.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_bytes::ByteBuf;

use wirelink_proto::{
    ApiReturn, ServerInput, ServerOutput, ServiceDescriptor, ServiceMap, SCHEMA_SERVER_INPUT,
    SCHEMA_SERVER_OUTPUT,
};

use crate::error::{CodecError, DecodeError, Result};
use crate::payload::PayloadCodec;

/// A fully routed inbound frame.
#[derive(Debug)]
pub enum ParsedServerOutput {
    /// An API response. Success carries the raw response buffer; the
    /// typed decode happens at the call site via [`decode_api_res`].
    Api {
        service: Arc<ServiceDescriptor>,
        sn: Option<u64>,
        ret: ApiReturn<Bytes>,
    },
    /// A pushed message, decoded to a dynamic value for listener
    /// dispatch.
    Msg {
        service: Arc<ServiceDescriptor>,
        msg: serde_json::Value,
    },
}

/// Encode an API request envelope. `sn` correlates the eventual
/// response.
pub fn encode_api_req<C: PayloadCodec, T: Serialize + ?Sized>(
    codec: &C,
    service: &ServiceDescriptor,
    req: &T,
    sn: Option<u64>,
) -> Result<Bytes> {
    let ServiceDescriptor::Api { req_schema_id, .. } = service else {
        return Err(not_api(service));
    };
    let body = codec.encode(req, req_schema_id)?;
    let input = ServerInput {
        service_id: service.id(),
        buffer: Some(ByteBuf::from(body.to_vec())),
        sn,
    };
    codec.encode(&input, SCHEMA_SERVER_INPUT)
}

/// Encode an outbound one-way message envelope. No serial number.
pub fn encode_client_msg<C: PayloadCodec, T: Serialize + ?Sized>(
    codec: &C,
    service: &ServiceDescriptor,
    msg: &T,
) -> Result<Bytes> {
    let ServiceDescriptor::Msg { msg_schema_id, .. } = service else {
        return Err(CodecError::Encode {
            schema_id: service.name().to_string(),
            message: "not a msg service".to_string(),
        });
    };
    let body = codec.encode(msg, msg_schema_id)?;
    let input = ServerInput {
        service_id: service.id(),
        buffer: Some(ByteBuf::from(body.to_vec())),
        sn: None,
    };
    codec.encode(&input, SCHEMA_SERVER_INPUT)
}

/// Encode an API return envelope (the server side of a call).
///
/// The service id travels only alongside a serial number; short-lived
/// transports reply on the request's own channel and let the caller
/// supply the id as a hint when decoding.
pub fn encode_api_return<C: PayloadCodec, T: Serialize>(
    codec: &C,
    service: &ServiceDescriptor,
    ret: &ApiReturn<T>,
    sn: Option<u64>,
) -> Result<Bytes> {
    let output = match ret {
        Ok(res) => {
            let ServiceDescriptor::Api { res_schema_id, .. } = service else {
                return Err(not_api(service));
            };
            let body = codec.encode(res, res_schema_id)?;
            ServerOutput {
                service_id: sn.map(|_| service.id()),
                sn,
                buffer: Some(ByteBuf::from(body.to_vec())),
                error: None,
            }
        }
        Err(err) => ServerOutput {
            service_id: sn.map(|_| service.id()),
            sn,
            buffer: None,
            error: Some(err.clone()),
        },
    };
    codec.encode(&output, SCHEMA_SERVER_OUTPUT)
}

/// Encode a server-pushed message envelope.
pub fn encode_server_msg<C: PayloadCodec, T: Serialize + ?Sized>(
    codec: &C,
    service: &ServiceDescriptor,
    msg: &T,
) -> Result<Bytes> {
    let ServiceDescriptor::Msg { msg_schema_id, .. } = service else {
        return Err(CodecError::Encode {
            schema_id: service.name().to_string(),
            message: "not a msg service".to_string(),
        });
    };
    let body = codec.encode(msg, msg_schema_id)?;
    let output = ServerOutput {
        service_id: Some(service.id()),
        sn: None,
        buffer: Some(ByteBuf::from(body.to_vec())),
        error: None,
    };
    codec.encode(&output, SCHEMA_SERVER_OUTPUT)
}

/// Decode a response-direction envelope and route it.
///
/// `service_id_hint` fills in the service id when the envelope omits it
/// (short-lived transports, where the request owns the response
/// channel).
pub fn decode_server_output<C: PayloadCodec>(
    codec: &C,
    map: &ServiceMap,
    buf: &[u8],
    service_id_hint: Option<u32>,
) -> std::result::Result<ParsedServerOutput, DecodeError> {
    let output: ServerOutput = codec
        .decode(buf, SCHEMA_SERVER_OUTPUT)
        .map_err(DecodeError::Envelope)?;

    let service_id = output
        .service_id
        .or(service_id_hint)
        .ok_or(DecodeError::MissingServiceId)?;
    let service = map
        .by_id(service_id)
        .ok_or(DecodeError::UnknownService(service_id))?;

    let parsed = match service.as_ref() {
        ServiceDescriptor::Msg { msg_schema_id, .. } => {
            let buffer = output.buffer.ok_or(DecodeError::EmptyMsgBuffer)?;
            let msg = codec
                .decode::<serde_json::Value>(&buffer, msg_schema_id)
                .map_err(|source| DecodeError::Payload {
                    schema_id: msg_schema_id.clone(),
                    source,
                })?;
            ParsedServerOutput::Msg {
                service: Arc::clone(service),
                msg,
            }
        }
        ServiceDescriptor::Api { .. } => {
            let ret = match (output.error, output.buffer) {
                (Some(err), _) => Err(err),
                (None, Some(buffer)) => Ok(Bytes::from(buffer.into_vec())),
                (None, None) => return Err(DecodeError::EmptyApiReturn),
            };
            ParsedServerOutput::Api {
                service: Arc::clone(service),
                sn: output.sn,
                ret,
            }
        }
    };
    Ok(parsed)
}

/// Decode a successful API response buffer to its typed value.
pub fn decode_api_res<C: PayloadCodec, Res: DeserializeOwned>(
    codec: &C,
    service: &ServiceDescriptor,
    buf: &[u8],
) -> std::result::Result<Res, DecodeError> {
    let ServiceDescriptor::Api { res_schema_id, .. } = service else {
        return Err(DecodeError::NotApi(service.name().to_string()));
    };
    codec
        .decode(buf, res_schema_id)
        .map_err(|source| DecodeError::Payload {
            schema_id: res_schema_id.clone(),
            source,
        })
}

fn not_api(service: &ServiceDescriptor) -> CodecError {
    CodecError::Encode {
        schema_id: service.name().to_string(),
        message: "not an api service".to_string(),
    }
}
