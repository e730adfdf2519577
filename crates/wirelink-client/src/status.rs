use std::fmt;

/// Connection lifecycle of a persistent transport.
///
/// The single source of truth: adapters never infer connectedness from
/// the coincidental presence of other fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Opening,
    Opened,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Opening => "OPENING",
            Self::Opened => "OPENED",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}
