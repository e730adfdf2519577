use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use wirelink_io::ProgressFn;

use crate::status::ConnectionState;

/// Options shared by every client.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Server URL.
    pub server: String,
    /// Default per-call timeout. `None` (or zero) means unlimited.
    pub timeout: Option<Duration>,
    /// Log every outbound and inbound buffer at debug level.
    pub debug_buf: bool,
}

impl ClientOptions {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_debug_buf(mut self, debug_buf: bool) -> Self {
        self.debug_buf = debug_buf;
        self
    }
}

/// Per-call overrides for `call_api`.
#[derive(Clone, Default)]
pub struct CallApiOptions {
    /// Overrides the client-level default timeout for this call only.
    pub timeout: Option<Duration>,
    /// Upload progress callback, forwarded to the HTTP proxy.
    pub on_progress: Option<ProgressFn>,
}

impl CallApiOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for CallApiOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallApiOptions")
            .field("timeout", &self.timeout)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Observer invoked on every connection state change.
pub type StatusFn = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Observer invoked once when an opened connection is lost
/// unexpectedly.
pub type LostConnectionFn = Arc<dyn Fn() + Send + Sync>;

/// Options specific to the persistent transport.
#[derive(Clone, Default)]
pub struct WsClientOptions {
    pub client: ClientOptions,
    pub on_status_change: Option<StatusFn>,
    pub on_lost_connection: Option<LostConnectionFn>,
}

impl WsClientOptions {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            client: ClientOptions::new(server),
            ..Self::default()
        }
    }

    pub fn on_status_change(mut self, observer: impl Fn(ConnectionState) + Send + Sync + 'static) -> Self {
        self.on_status_change = Some(Arc::new(observer));
        self
    }

    pub fn on_lost_connection(mut self, observer: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_lost_connection = Some(Arc::new(observer));
        self
    }
}

impl fmt::Debug for WsClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsClientOptions")
            .field("client", &self.client)
            .field("on_status_change", &self.on_status_change.is_some())
            .field("on_lost_connection", &self.on_lost_connection.is_some())
            .finish()
    }
}
