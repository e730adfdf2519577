/// Errors surfaced by an I/O proxy.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The platform request or socket failed.
    #[error("network error: {0}")]
    Network(String),

    /// The request was aborted through its cancellation token.
    #[error("request aborted")]
    Aborted,

    /// The proxy-level timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// A send was attempted on a socket that is not open.
    #[error("socket is not open")]
    NotOpen,
}

pub type Result<T> = std::result::Result<T, ProxyError>;
