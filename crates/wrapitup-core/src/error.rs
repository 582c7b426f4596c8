//! Common error type for shutdown requests, timers, and signal guards

/// Error from a call that violates the request/timer/guard contract.
///
/// Every variant is reported synchronously by the call that caused it.
#[derive(Debug)]
pub enum Error {
    /// Bad input: empty signal set, NaN or negative time limit, unsupported signal.
    InvalidArgument(String),
    /// Call not legal right now: off the main thread, deadline already passed,
    /// scopes exited out of order.
    InvalidState(String),
    /// The OS rejected a `sigaction`/`setitimer` call.
    Os {
        op: &'static str,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::Os { op, source } => write!(f, "{op}: {source}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Os { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl Error {
    /// Capture `errno` for a failed libc call.
    pub(crate) fn last_os(op: &'static str) -> Self {
        Self::Os {
            op,
            source: std::io::Error::last_os_error(),
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState(_))
    }
}
