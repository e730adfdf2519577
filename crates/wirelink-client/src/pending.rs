//! The in-flight call table.
//!
//! Every API call registers here under its serial number and settles
//! exactly once, whichever of {response, timeout, abort, disconnect
//! drain} reaches the table first. Later events for the same serial
//! number find no entry and are no-ops. Entries are always taken out of
//! the map under the lock before any callback runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use wirelink_proto::{codes, ApiReturn, RpcError, ServiceDescriptor};

/// Transport-specific cancel of the in-flight I/O, invoked at most
/// once.
pub type AbortHook = Box<dyn FnOnce() + Send>;

struct PendingEntry {
    service: Arc<ServiceDescriptor>,
    settle: oneshot::Sender<ApiReturn<Bytes>>,
    timeout_task: Option<JoinHandle<()>>,
    abort_hook: Option<AbortHook>,
    created_at: Instant,
}

impl PendingEntry {
    fn run_abort_hook(&mut self) {
        if let Some(hook) = self.abort_hook.take() {
            hook();
        }
    }

    fn finish(mut self, ret: ApiReturn<Bytes>) {
        if let Some(task) = self.timeout_task.take() {
            task.abort();
        }
        // The receiver may already be gone; settlement is still done.
        let _ = self.settle.send(ret);
    }
}

/// Pending-call table keyed by serial number.
#[derive(Default)]
pub struct PendingCalls {
    inner: Mutex<HashMap<u64, PendingEntry>>,
}

impl PendingCalls {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, PendingEntry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self, sn: u64) -> Option<PendingEntry> {
        self.lock().remove(&sn)
    }

    /// Insert an entry and start its timeout timer. A `None` or zero
    /// timeout means the call waits indefinitely.
    pub fn register(
        self: &Arc<Self>,
        sn: u64,
        service: Arc<ServiceDescriptor>,
        timeout: Option<Duration>,
        abort_hook: Option<AbortHook>,
    ) -> oneshot::Receiver<ApiReturn<Bytes>> {
        let (settle, rx) = oneshot::channel();
        let timeout_task = timeout.filter(|t| !t.is_zero()).map(|t| {
            let table = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(t).await;
                table.timeout_fire(sn);
            })
        });
        let entry = PendingEntry {
            service,
            settle,
            timeout_task,
            abort_hook,
            created_at: Instant::now(),
        };
        self.lock().insert(sn, entry);
        rx
    }

    /// Settle with a received return. No-op for serial numbers no
    /// longer pending (late or duplicate frames, timed-out calls).
    pub fn resolve(&self, sn: u64, ret: ApiReturn<Bytes>) -> bool {
        let Some(entry) = self.take(sn) else {
            return false;
        };
        debug!(
            sn,
            api = entry.service.name(),
            elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
            "pending call settled"
        );
        entry.finish(ret);
        true
    }

    /// Cancel the in-flight I/O and settle as canceled.
    pub fn abort(&self, sn: u64) -> bool {
        let Some(mut entry) = self.take(sn) else {
            return false;
        };
        debug!(sn, api = entry.service.name(), "pending call aborted");
        entry.run_abort_hook();
        entry.finish(Err(
            RpcError::client("Request was canceled").with_code(codes::CANCELED)
        ));
        true
    }

    /// Settle with a caller-supplied error (flow veto, local send
    /// failure). The in-flight I/O is left alone.
    pub fn cancel_with(&self, sn: u64, err: RpcError) -> bool {
        let Some(entry) = self.take(sn) else {
            return false;
        };
        entry.finish(Err(err));
        true
    }

    fn timeout_fire(&self, sn: u64) {
        let Some(mut entry) = self.take(sn) else {
            return;
        };
        debug!(sn, api = entry.service.name(), "pending call timed out");
        entry.run_abort_hook();
        entry.finish(Err(
            RpcError::network("Request Timeout").with_code(codes::TIMEOUT)
        ));
    }

    /// Settle every pending call with `CONNECTION_LOST`. Called by
    /// persistent transports when the connection goes away.
    pub fn drain(&self, message: &str) {
        let entries: Vec<(u64, PendingEntry)> = self.lock().drain().collect();
        for (sn, entry) in entries {
            debug!(sn, api = entry.service.name(), "draining pending call");
            entry.finish(Err(
                RpcError::network(message).with_code(codes::CONNECTION_LOST)
            ));
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
