//! The transport-agnostic engine core shared by both adapters:
//! service resolution, envelope encoding, serial allocation, the
//! pending-call table, flows, message listeners and inbound routing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use wirelink_codec::{
    decode_api_res, decode_server_output, encode_api_req, encode_client_msg, ParsedServerOutput,
    PayloadCodec,
};
use wirelink_proto::{
    codes, ApiReturn, ProtoError, RpcError, ServiceDescriptor, ServiceMap, ServiceProto,
};

use crate::counter::SerialCounter;
use crate::flow::{ClientFlows, SendBufferData};
use crate::options::ClientOptions;
use crate::pending::PendingCalls;

/// Error settled when a flow hook vetoes an operation.
pub(crate) fn flow_canceled(op: &str) -> RpcError {
    RpcError::client(format!("{op} was canceled by a flow hook")).with_code(codes::FLOW_CANCELED)
}

pub type MsgListenerFn = Arc<dyn Fn(Value) + Send + Sync>;

/// Registration token returned by `listen_msg`, consumed by
/// `unlisten_msg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgHandle {
    name: String,
    id: u64,
}

struct MsgListenerEntry {
    id: u64,
    func: MsgListenerFn,
}

/// Engine state shared by the transport adapters.
pub struct ClientCore<C> {
    pub(crate) codec: C,
    pub(crate) service_map: ServiceMap,
    pub(crate) flows: ClientFlows,
    pub(crate) options: ClientOptions,
    pub(crate) pending: Arc<PendingCalls>,
    sn_counter: SerialCounter,
    listener_ids: AtomicU64,
    listeners: Mutex<HashMap<String, Vec<MsgListenerEntry>>>,
}

impl<C: PayloadCodec> ClientCore<C> {
    pub fn new(
        proto: &ServiceProto,
        codec: C,
        options: ClientOptions,
    ) -> Result<Self, ProtoError> {
        Ok(Self {
            service_map: ServiceMap::new(proto)?,
            codec,
            flows: ClientFlows::new(),
            options,
            pending: PendingCalls::new(),
            sn_counter: SerialCounter::new(),
            listener_ids: AtomicU64::new(1),
            listeners: Mutex::new(HashMap::new()),
        })
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn service_map(&self) -> &ServiceMap {
        &self.service_map
    }

    pub fn flows(&self) -> &ClientFlows {
        &self.flows
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn pending(&self) -> &Arc<PendingCalls> {
        &self.pending
    }

    pub fn next_sn(&self) -> u64 {
        self.sn_counter.next()
    }

    /// The most recently issued serial number.
    pub fn last_sn(&self) -> u64 {
        self.sn_counter.last()
    }

    pub fn resolve_api(&self, name: &str) -> ApiReturn<Arc<ServiceDescriptor>> {
        self.service_map.api_by_name(name).cloned().ok_or_else(|| {
            RpcError::client(format!("Invalid api name: {name}")).with_code(codes::INVALID_NAME)
        })
    }

    pub fn resolve_msg(&self, name: &str) -> ApiReturn<Arc<ServiceDescriptor>> {
        self.service_map.msg_by_name(name).cloned().ok_or_else(|| {
            RpcError::client(format!("Invalid msg name: {name}")).with_code(codes::INVALID_NAME)
        })
    }

    /// Encode a request envelope; failures are local client errors.
    pub fn encode_api_req<Req: Serialize>(
        &self,
        service: &ServiceDescriptor,
        req: &Req,
        sn: u64,
    ) -> ApiReturn<Bytes> {
        encode_api_req(&self.codec, service, req, Some(sn))
            .map_err(|err| RpcError::client(err.to_string()))
    }

    /// Encode a one-way message envelope; failures are local client
    /// errors.
    pub fn encode_msg<Msg: Serialize>(
        &self,
        service: &ServiceDescriptor,
        msg: &Msg,
    ) -> ApiReturn<Bytes> {
        encode_client_msg(&self.codec, service, msg)
            .map_err(|err| RpcError::client(err.to_string()))
    }

    /// Run the pre-send flow over an encoded buffer. `None` means a
    /// hook vetoed the send.
    pub async fn run_pre_send(&self, buf: Bytes, sn: Option<u64>) -> Option<Bytes> {
        let data = self.flows.pre_send_buffer.exec(SendBufferData { buf, sn }).await?;
        Some(data.buf)
    }

    /// Decode the settled raw return into the caller's typed response.
    pub fn finish_call<Res: DeserializeOwned>(
        &self,
        service: &ServiceDescriptor,
        ret: ApiReturn<Bytes>,
    ) -> ApiReturn<Res> {
        let buf = ret?;
        decode_api_res(&self.codec, service, &buf).map_err(|err| {
            RpcError::server(err.to_string()).with_code(codes::RES_DECODE_ERR)
        })
    }

    fn lock_listeners(&self) -> MutexGuard<'_, HashMap<String, Vec<MsgListenerEntry>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a dynamic listener for a message name. Multiple
    /// listeners per name are invoked in registration order.
    pub fn listen_msg(
        &self,
        name: &str,
        func: impl Fn(Value) + Send + Sync + 'static,
    ) -> MsgHandle {
        let id = self.listener_ids.fetch_add(1, Ordering::Relaxed);
        self.lock_listeners()
            .entry(name.to_string())
            .or_default()
            .push(MsgListenerEntry {
                id,
                func: Arc::new(func),
            });
        MsgHandle {
            name: name.to_string(),
            id,
        }
    }

    /// Register a typed listener; inbound messages that do not match
    /// the expected type are logged and dropped.
    pub fn listen_msg_typed<M: DeserializeOwned>(
        &self,
        name: &str,
        func: impl Fn(M) + Send + Sync + 'static,
    ) -> MsgHandle {
        let msg_name = name.to_string();
        self.listen_msg(name, move |value| {
            match serde_json::from_value::<M>(value) {
                Ok(msg) => func(msg),
                Err(err) => warn!(msg = %msg_name, %err, "dropping msg that does not match listener type"),
            }
        })
    }

    /// Remove one listener registration. Returns false when the handle
    /// no longer matches anything.
    pub fn unlisten_msg(&self, handle: &MsgHandle) -> bool {
        let mut listeners = self.lock_listeners();
        let Some(list) = listeners.get_mut(&handle.name) else {
            return false;
        };
        let before = list.len();
        list.retain(|entry| entry.id != handle.id);
        before != list.len()
    }

    /// Route one inbound frame from a shared stream.
    ///
    /// Decode failures are logged and dropped rather than propagated:
    /// once the serial number itself may be unreadable there is no
    /// caller left to attribute them to.
    pub fn on_recv(&self, buf: &[u8]) {
        if self.options.debug_buf {
            debug!(len = buf.len(), "[RecvBuf]");
        }
        match decode_server_output(&self.codec, &self.service_map, buf, None) {
            Ok(ParsedServerOutput::Api { service, sn, ret }) => {
                let Some(sn) = sn else {
                    warn!(api = service.name(), "dropping api response without sn");
                    return;
                };
                if !self.pending.resolve(sn, ret) {
                    debug!(sn, "dropping response for serial number no longer pending");
                }
            }
            Ok(ParsedServerOutput::Msg { service, msg }) => {
                self.dispatch_msg(service.name(), msg);
            }
            Err(err) => warn!(%err, "dropping undecodable inbound frame"),
        }
    }

    fn dispatch_msg(&self, name: &str, msg: Value) {
        let funcs: Vec<MsgListenerFn> = self
            .lock_listeners()
            .get(name)
            .map(|list| list.iter().map(|entry| Arc::clone(&entry.func)).collect())
            .unwrap_or_default();
        if funcs.is_empty() {
            debug!(msg = name, "no listeners registered for msg");
            return;
        }
        debug!(msg = name, listeners = funcs.len(), "[RecvMsg]");
        for func in funcs {
            func(msg.clone());
        }
    }
}
