//! Flows: ordered, cancelable hook chains at defined extension points.
//!
//! A hook receives the flow data and returns the (possibly modified)
//! data for the next hook, or `None` to short-circuit the chain — the
//! operation is then treated as canceled by policy, not as an error.
//! Hooks are awaited strictly in registration order so chains like
//! encrypt-then-send keep their ordering contract.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;

pub type FlowFuture<T> = Pin<Box<dyn Future<Output = Option<T>> + Send>>;

type FlowNode<T> = Arc<dyn Fn(T) -> FlowFuture<T> + Send + Sync>;

/// One extension point: an ordered list of hooks.
pub struct Flow<T> {
    nodes: RwLock<Vec<FlowNode<T>>>,
}

impl<T: Send + 'static> Flow<T> {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
        }
    }

    /// Append a hook. Hooks run in the order they were pushed.
    pub fn push<F, Fut>(&self, hook: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<T>> + Send + 'static,
    {
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(move |data| -> FlowFuture<T> {
                Box::pin(hook(data))
            }));
    }

    pub fn len(&self) -> usize {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Thread `data` through every hook in order. Returns `None` as
    /// soon as a hook short-circuits; the remaining hooks are skipped.
    pub async fn exec(&self, mut data: T) -> Option<T> {
        let nodes: Vec<FlowNode<T>> = self
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for node in nodes {
            data = node(data).await?;
        }
        Some(data)
    }
}

impl<T: Send + 'static> Default for Flow<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload about to hit the transport. `sn` is present for API calls.
#[derive(Debug, Clone)]
pub struct SendBufferData {
    pub buf: Bytes,
    pub sn: Option<u64>,
}

/// A connection attempt about to start.
#[derive(Debug, Clone)]
pub struct PreConnectData {
    pub server: String,
}

/// A connection that just opened.
#[derive(Debug, Clone)]
pub struct PostConnectData {
    pub server: String,
}

/// A connection that just closed.
#[derive(Debug, Clone)]
pub struct DisconnectData {
    pub code: Option<u16>,
    pub reason: Option<String>,
    /// True when the close came from an explicit `disconnect()`.
    pub is_manual: bool,
}

/// The defined extension points of one client instance.
#[derive(Default)]
pub struct ClientFlows {
    /// Payload bytes before the transport send; can mutate (encrypt,
    /// compress) or veto.
    pub pre_send_buffer: Flow<SendBufferData>,
    /// Before a connection attempt; can veto.
    pub pre_connect: Flow<PreConnectData>,
    /// After a connection opens (authentication handshakes,
    /// re-subscription).
    pub post_connect: Flow<PostConnectData>,
    /// After a connection closes, manual or not.
    pub post_disconnect: Flow<DisconnectData>,
}

impl ClientFlows {
    pub fn new() -> Self {
        Self::default()
    }
}
