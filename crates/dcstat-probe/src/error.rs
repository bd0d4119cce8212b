//! Errors surfaced by the prober.

use thiserror::Error;

pub type ProbeResult<T> = Result<T, ProbeError>;

/// Terminal outcomes of bootstrap, probe and registry operations.
///
/// Transient connect and RPC failures never appear here; they are absorbed
/// inside the probe loop and only drive backoff.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("shutdown requested")]
    Cancelled,

    #[error("bootstrap interrupted before an endpoint list was obtained")]
    BootstrapFailed,

    #[error("registry already started")]
    AlreadyStarted,
}

impl ProbeError {
    /// Whether this error is the expected result of a shutdown signal.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, ProbeError::Cancelled | ProbeError::BootstrapFailed)
    }
}
