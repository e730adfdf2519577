//! Persistent transport adapter.
//!
//! Owns the connection state machine: an explicit
//! [`ConnectionState`] drives every transition, fed by the socket
//! proxy's event stream. All inbound frames share one stream and are
//! routed by serial number (API) or name (message), regardless of which
//! call — if any — triggered them. Losing the connection always lands
//! in `Closed` and drains the pending table; there is no automatic
//! reconnect.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, warn};

use wirelink_codec::PayloadCodec;
use wirelink_io::{SocketEvent, SocketHandle, SocketProxy};
use wirelink_proto::{codes, ApiReturn, ProtoError, RpcError, ServiceProto};

use crate::core::{flow_canceled, ClientCore, MsgHandle};
use crate::flow::{ClientFlows, DisconnectData, PostConnectData, PreConnectData};
use crate::options::{CallApiOptions, LostConnectionFn, StatusFn, WsClientOptions};
use crate::status::ConnectionState;

/// RPC client over a persistent socket-like proxy.
pub struct WsClient<C: PayloadCodec, P: SocketProxy> {
    core: Arc<ClientCore<C>>,
    proxy: P,
    options: WsClientOptions,
    shared: Arc<Mutex<Shared<P::Handle>>>,
    status_tx: watch::Sender<ConnectionState>,
}

struct Shared<H> {
    state: ConnectionState,
    handle: Option<H>,
    /// Callers awaiting the in-flight connect attempt.
    connect_waiters: Vec<oneshot::Sender<ApiReturn<()>>>,
    /// The pending-disconnect continuation; present exactly while a
    /// manual close is in flight.
    disconnect_done: Option<oneshot::Sender<()>>,
}

fn lock_shared<H>(shared: &Mutex<Shared<H>>) -> MutexGuard<'_, Shared<H>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn publish_state(
    status_tx: &watch::Sender<ConnectionState>,
    observer: &Option<StatusFn>,
    state: ConnectionState,
) {
    status_tx.send_replace(state);
    if let Some(observer) = observer {
        observer(state);
    }
}

fn connect_failed() -> RpcError {
    RpcError::network("WebSocket connection to server failed")
}

fn not_open() -> RpcError {
    RpcError::client("WebSocket is not connected").with_code(codes::WS_NOT_OPEN)
}

impl<C: PayloadCodec, P: SocketProxy> WsClient<C, P> {
    pub fn new(
        proto: &ServiceProto,
        codec: C,
        proxy: P,
        options: WsClientOptions,
    ) -> Result<Self, ProtoError> {
        let core = ClientCore::new(proto, codec, options.client.clone())?;
        debug!(server = %core.options().server, "ws client ready");
        let (status_tx, _status_rx) = watch::channel(ConnectionState::Closed);
        Ok(Self {
            core: Arc::new(core),
            proxy,
            options,
            shared: Arc::new(Mutex::new(Shared {
                state: ConnectionState::Closed,
                handle: None,
                connect_waiters: Vec::new(),
                disconnect_done: None,
            })),
            status_tx,
        })
    }

    pub fn core(&self) -> &ClientCore<C> {
        &self.core
    }

    pub fn flows(&self) -> &ClientFlows {
        self.core.flows()
    }

    /// Current connection state.
    pub fn status(&self) -> ConnectionState {
        lock_shared(&self.shared).state
    }

    /// Watch channel mirroring every state change.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionState> {
        self.status_tx.subscribe()
    }

    /// The most recently issued serial number.
    pub fn last_sn(&self) -> u64 {
        self.core.last_sn()
    }

    /// Settle an in-flight call as canceled. No-op for settled calls.
    pub fn abort(&self, sn: u64) -> bool {
        self.core.pending.abort(sn)
    }

    pub fn listen_msg(
        &self,
        name: &str,
        func: impl Fn(Value) + Send + Sync + 'static,
    ) -> MsgHandle {
        self.core.listen_msg(name, func)
    }

    pub fn listen_msg_typed<M: DeserializeOwned>(
        &self,
        name: &str,
        func: impl Fn(M) + Send + Sync + 'static,
    ) -> MsgHandle {
        self.core.listen_msg_typed(name, func)
    }

    pub fn unlisten_msg(&self, handle: &MsgHandle) -> bool {
        self.core.unlisten_msg(handle)
    }

    /// Start connecting. Never panics on transport failure: resolves
    /// `Ok` once open, `Err` otherwise. Calling while `Opening` joins
    /// the in-flight attempt; while `Opened` it succeeds immediately.
    pub async fn connect(&self) -> ApiReturn<()> {
        let join_rx = {
            let mut shared = lock_shared(&self.shared);
            match shared.state {
                ConnectionState::Opened => return Ok(()),
                ConnectionState::Opening => {
                    let (tx, rx) = oneshot::channel();
                    shared.connect_waiters.push(tx);
                    Some(rx)
                }
                ConnectionState::Closing => {
                    return Err(RpcError::client("Connection is closing")
                        .with_code(codes::WS_NOT_OPEN))
                }
                ConnectionState::Closed => {
                    shared.state = ConnectionState::Opening;
                    None
                }
            }
        };
        if let Some(rx) = join_rx {
            return rx.await.unwrap_or_else(|_| Err(connect_failed()));
        }
        self.publish(ConnectionState::Opening);

        // The pre-connect flow may veto the attempt.
        let pre = self
            .core
            .flows
            .pre_connect
            .exec(PreConnectData {
                server: self.core.options.server.clone(),
            })
            .await;
        if pre.is_none() {
            let err = flow_canceled("connect");
            self.fail_connect(err.clone());
            return Err(err);
        }

        debug!(server = %self.core.options.server, "start connecting");
        let (handle, events) = match self.proxy.open(&self.core.options.server) {
            Ok(pair) => pair,
            Err(proxy_err) => {
                let err = RpcError::network(proxy_err.to_string());
                self.fail_connect(err.clone());
                return Err(err);
            }
        };

        let result_rx = {
            let mut shared = lock_shared(&self.shared);
            shared.handle = Some(handle);
            let (tx, rx) = oneshot::channel();
            shared.connect_waiters.push(tx);
            rx
        };

        // The event loop owns the connection from here on.
        tokio::spawn(run_connection(
            Arc::clone(&self.core),
            Arc::clone(&self.shared),
            self.status_tx.clone(),
            self.options.on_status_change.clone(),
            self.options.on_lost_connection.clone(),
            events,
        ));

        result_rx.await.unwrap_or_else(|_| Err(connect_failed()))
    }

    /// Disconnect and await the close. A no-op unless currently
    /// `Opened` (an attempt still `Opening` keeps running).
    pub async fn disconnect(&self) {
        let done_rx = {
            let mut shared = lock_shared(&self.shared);
            if shared.state != ConnectionState::Opened {
                return;
            }
            shared.state = ConnectionState::Closing;
            let (tx, rx) = oneshot::channel();
            shared.disconnect_done = Some(tx);
            rx
        };
        self.publish(ConnectionState::Closing);
        debug!("disconnecting");
        {
            let shared = lock_shared(&self.shared);
            if let Some(handle) = &shared.handle {
                handle.close(Some(1000), "Client disconnect");
            }
        }
        let _ = done_rx.await;
    }

    /// Call a declared API and await its settlement.
    pub async fn call_api<Req, Res>(
        &self,
        name: &str,
        req: &Req,
        options: CallApiOptions,
    ) -> ApiReturn<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let service = self.core.resolve_api(name)?;
        let sn = self.core.next_sn();
        let buf = self.core.encode_api_req(&service, req, sn)?;
        debug!(sn, api = name, "[ApiReq]");

        let timeout = options.timeout.or(self.core.options.timeout);
        let rx = self
            .core
            .pending
            .register(sn, Arc::clone(&service), timeout, None);

        match self.core.run_pre_send(buf, Some(sn)).await {
            Some(buf) => {
                if let Err(err) = self.send_on_socket(buf, Some(sn)) {
                    self.core.pending.cancel_with(sn, err);
                }
            }
            None => {
                self.core.pending.cancel_with(sn, flow_canceled("callApi"));
            }
        }

        let ret = rx.await.unwrap_or_else(|_| {
            Err(RpcError::client("Request was canceled").with_code(codes::CANCELED))
        });
        match &ret {
            Ok(_) => debug!(sn, api = name, "[ApiRes]"),
            Err(err) => debug!(sn, api = name, %err, "[ApiErr]"),
        }
        self.core.finish_call(&service, ret)
    }

    /// Send a one-way message onto the live connection. Fails
    /// immediately when not `Opened`; the outcome reflects only the
    /// local send attempt.
    pub async fn send_msg<Msg: Serialize>(&self, name: &str, msg: &Msg) -> ApiReturn<()> {
        let service = self.core.resolve_msg(name)?;
        let buf = self.core.encode_msg(&service, msg)?;
        debug!(msg = name, "[SendMsg]");

        let Some(buf) = self.core.run_pre_send(buf, None).await else {
            return Err(flow_canceled("sendMsg"));
        };
        self.send_on_socket(buf, None)
    }

    fn send_on_socket(&self, buf: Bytes, sn: Option<u64>) -> ApiReturn<()> {
        let shared = lock_shared(&self.shared);
        if shared.state != ConnectionState::Opened {
            return Err(not_open());
        }
        let Some(handle) = &shared.handle else {
            return Err(not_open());
        };
        if self.core.options.debug_buf {
            debug!(?sn, len = buf.len(), "[SendBuf]");
        }
        handle
            .send(buf)
            .map_err(|err| RpcError::network(err.to_string()).with_code(codes::SEND_BUF_ERR))
    }

    fn publish(&self, state: ConnectionState) {
        publish_state(&self.status_tx, &self.options.on_status_change, state);
    }

    fn fail_connect(&self, err: RpcError) {
        let waiters = {
            let mut shared = lock_shared(&self.shared);
            shared.state = ConnectionState::Closed;
            shared.handle = None;
            std::mem::take(&mut shared.connect_waiters)
        };
        self.publish(ConnectionState::Closed);
        for tx in waiters {
            let _ = tx.send(Err(err.clone()));
        }
    }
}

/// Drives one connection: pumps socket events until close, then tears
/// the connection down exactly once.
async fn run_connection<C: PayloadCodec, H: SocketHandle>(
    core: Arc<ClientCore<C>>,
    shared: Arc<Mutex<Shared<H>>>,
    status_tx: watch::Sender<ConnectionState>,
    on_status_change: Option<StatusFn>,
    on_lost_connection: Option<LostConnectionFn>,
    mut events: mpsc::UnboundedReceiver<SocketEvent>,
) {
    let server = core.options().server.clone();
    let mut close_info: Option<(Option<u16>, String)> = None;

    loop {
        let Some(event) = events.recv().await else {
            break;
        };
        match event {
            SocketEvent::Opened => {
                let waiters = {
                    let mut shared = lock_shared(&shared);
                    shared.state = ConnectionState::Opened;
                    std::mem::take(&mut shared.connect_waiters)
                };
                publish_state(&status_tx, &on_status_change, ConnectionState::Opened);
                debug!(server = %server, "websocket connection opened");
                for tx in waiters {
                    let _ = tx.send(Ok(()));
                }
                let _ = core
                    .flows()
                    .post_connect
                    .exec(PostConnectData {
                        server: server.clone(),
                    })
                    .await;
            }
            SocketEvent::Message(data) => core.on_recv(&data),
            SocketEvent::Text(text) => {
                debug!(len = text.len(), "dropping unexpected text frame")
            }
            SocketEvent::Error(message) => error!(%message, "websocket error"),
            SocketEvent::Closed { code, reason } => {
                close_info = Some((code, reason));
                break;
            }
        }
    }

    let (was_opened, is_manual, waiters, disconnect_done) = {
        let mut shared = lock_shared(&shared);
        let was_opened = matches!(
            shared.state,
            ConnectionState::Opened | ConnectionState::Closing
        );
        let is_manual = shared.disconnect_done.is_some();
        shared.state = ConnectionState::Closed;
        shared.handle = None;
        (
            was_opened,
            is_manual,
            std::mem::take(&mut shared.connect_waiters),
            shared.disconnect_done.take(),
        )
    };
    publish_state(&status_tx, &on_status_change, ConnectionState::Closed);

    let (code, reason) = close_info.unwrap_or((None, String::new()));
    // A close before Opened means the attempt itself failed.
    for tx in waiters {
        let _ = tx.send(Err(connect_failed()));
    }
    if let Some(done) = disconnect_done {
        debug!(?code, reason = %reason, "disconnected");
        let _ = done.send(());
    }
    if was_opened {
        if !is_manual {
            warn!(?code, reason = %reason, server = %server, "lost connection to server");
            if let Some(observer) = &on_lost_connection {
                observer();
            }
        }
        let _ = core
            .flows()
            .post_disconnect
            .exec(DisconnectData {
                code,
                reason: (!reason.is_empty()).then(|| reason.clone()),
                is_manual,
            })
            .await;
        // Every in-flight call settles; nothing survives the
        // connection.
        core.pending().drain("Lost connection to server");
    }
}
