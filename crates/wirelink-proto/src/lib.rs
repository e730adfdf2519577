//! Protocol description and wire-level data model for wirelink.
//!
//! Both sides of a deployment share a [`ServiceProto`]: the list of
//! declared APIs and messages with their numeric ids and schema ids.
//! This crate turns that description into an immutable [`ServiceMap`],
//! and defines the envelope structs and error taxonomy everything else
//! is built on.

pub mod envelope;
pub mod error;
pub mod service;

pub use envelope::{ServerInput, ServerOutput, SCHEMA_SERVER_INPUT, SCHEMA_SERVER_OUTPUT};
pub use error::{codes, ApiReturn, ProtoError, Result, RpcError, RpcErrorKind};
pub use service::{SchemaShape, ServiceDescriptor, ServiceKind, ServiceMap, ServiceProto};
