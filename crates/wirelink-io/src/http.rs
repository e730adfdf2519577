use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Upload progress callback, 0.0 to 1.0.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// How the response body should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Bytes,
    Text,
}

/// One outbound request for the fetch-like capability.
#[derive(Clone)]
pub struct HttpRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub response_kind: ResponseKind,
    /// Proxy-level timeout hint. The engine keeps its own timer; this
    /// lets the platform abort the request early too.
    pub timeout: Option<Duration>,
    pub on_progress: Option<ProgressFn>,
}

impl HttpRequest {
    /// A POST carrying an encoded envelope, the shape every RPC call
    /// uses.
    pub fn post(url: impl Into<String>, body: Bytes, response_kind: ResponseKind) -> Self {
        Self {
            url: url.into(),
            method: "POST".to_string(),
            headers: Vec::new(),
            body,
            response_kind,
            timeout: None,
            on_progress: None,
        }
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("response_kind", &self.response_kind)
            .field("timeout", &self.timeout)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// A response body in the requested delivery form.
#[derive(Debug, Clone)]
pub enum HttpResponseBody {
    Bytes(Bytes),
    Text(String),
}

impl HttpResponseBody {
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Bytes(bytes) => bytes,
            Self::Text(text) => Bytes::from(text.into_bytes()),
        }
    }
}

/// Short-lived fetch-like capability: one request, one response.
///
/// The cancellation token is the abort capability; an implementation
/// should stop the platform request when it fires and may resolve with
/// [`ProxyError::Aborted`](crate::ProxyError::Aborted) — by then the
/// caller has already settled and discards the outcome.
pub trait HttpProxy: Send + Sync + 'static {
    fn issue(
        &self,
        req: HttpRequest,
        abort: CancellationToken,
    ) -> impl Future<Output = Result<HttpResponseBody>> + Send;
}
