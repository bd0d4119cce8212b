//! Transient per-attempt client errors.

use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

/// Failures of a single connect or RPC attempt. None of these are terminal;
/// callers retry with backoff.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("deadline exceeded after {0:?}")]
    Timeout(std::time::Duration),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("session closed by peer")]
    Closed,
}
