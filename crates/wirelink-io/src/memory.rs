//! In-process socket transport.
//!
//! A [`MemorySocketProxy`] connects to its paired [`MemoryListener`]
//! over channels, firing the same event sequence a platform socket
//! would. Opening after the listener is dropped produces the
//! connection-refused sequence. This is the fake proxy that makes the
//! state machine and correlation core testable without real sockets,
//! and it backs the runnable demos.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{ProxyError, Result};
use crate::socket::{SocketEvent, SocketHandle, SocketProxy};

/// Create a connected proxy/listener pair.
pub fn memory_socket() -> (MemorySocketProxy, MemoryListener) {
    let (conn_tx, conn_rx) = mpsc::unbounded_channel();
    (MemorySocketProxy { conn_tx }, MemoryListener { conn_rx })
}

/// Client side: a [`SocketProxy`] whose connections land on the paired
/// listener.
#[derive(Debug, Clone)]
pub struct MemorySocketProxy {
    conn_tx: mpsc::UnboundedSender<MemoryConn>,
}

/// Server side: accepts the connections the proxy opens.
#[derive(Debug)]
pub struct MemoryListener {
    conn_rx: mpsc::UnboundedReceiver<MemoryConn>,
}

impl MemoryListener {
    /// Next incoming connection; `None` once every paired proxy is
    /// gone.
    pub async fn accept(&mut self) -> Option<MemoryConn> {
        self.conn_rx.recv().await
    }
}

/// Write handle held by the connecting side.
#[derive(Debug)]
pub struct MemoryHandle {
    data_tx: mpsc::UnboundedSender<Bytes>,
    event_tx: mpsc::UnboundedSender<SocketEvent>,
    closed: Arc<AtomicBool>,
}

impl SocketHandle for MemoryHandle {
    fn send(&self, data: Bytes) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProxyError::NotOpen);
        }
        self.data_tx
            .send(data)
            .map_err(|_| ProxyError::Network("peer closed".to_string()))
    }

    fn close(&self, code: Option<u16>, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.event_tx.send(SocketEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }
}

/// One accepted connection, as seen by the server side.
#[derive(Debug)]
pub struct MemoryConn {
    data_rx: mpsc::UnboundedReceiver<Bytes>,
    event_tx: mpsc::UnboundedSender<SocketEvent>,
}

impl MemoryConn {
    /// Next frame from the client; `None` once the client side is gone.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.data_rx.recv().await
    }

    /// Push a binary frame to the client.
    pub fn send(&self, data: Bytes) -> Result<()> {
        self.event_tx
            .send(SocketEvent::Message(data))
            .map_err(|_| ProxyError::Network("client closed".to_string()))
    }

    /// Push a text frame to the client.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.event_tx
            .send(SocketEvent::Text(text.into()))
            .map_err(|_| ProxyError::Network("client closed".to_string()))
    }

    /// Close from the server side; the client observes an unexpected
    /// close.
    pub fn close(&self, code: Option<u16>, reason: &str) {
        let _ = self.event_tx.send(SocketEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }
}

impl SocketProxy for MemorySocketProxy {
    type Handle = MemoryHandle;

    fn open(&self, _server: &str) -> Result<(MemoryHandle, mpsc::UnboundedReceiver<SocketEvent>)> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (data_tx, data_rx) = mpsc::unbounded_channel();

        let conn = MemoryConn {
            data_rx,
            event_tx: event_tx.clone(),
        };
        if self.conn_tx.send(conn).is_ok() {
            let _ = event_tx.send(SocketEvent::Opened);
        } else {
            let _ = event_tx.send(SocketEvent::Error("connection refused".to_string()));
            let _ = event_tx.send(SocketEvent::Closed {
                code: None,
                reason: "connection refused".to_string(),
            });
        }

        let handle = MemoryHandle {
            data_tx,
            event_tx,
            closed: Arc::new(AtomicBool::new(false)),
        };
        Ok((handle, event_rx))
    }
}
