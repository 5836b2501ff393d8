//! Client-side error type.

use crate::rpc::{ExchangeError, RemoteError, ValueError};

/// Errors surfaced to callers of the client stubs.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// START/ENSURE failed: the adapter never came up.
    #[error("Adapter not started: {0}")]
    NotStarted(RemoteError),

    /// The supervisor rejected a STOP or PORT request.
    #[error("Supervisor rejected request: {0}")]
    Rejected(RemoteError),

    /// The adapter is up but the requested operation failed.
    #[error("Adapter operation failed: {0}")]
    OperationFailed(RemoteError),

    /// Nothing is listening at the address, or the connection was refused.
    #[error("Cannot reach {addr}: {source}")]
    Unreachable {
        addr: String,
        source: std::io::Error,
    },

    /// The exchange did not complete in time.
    #[error("Request to {addr} timed out after {ms}ms")]
    Timeout { addr: String, ms: u64 },

    /// The connection failed mid-exchange or the reply was malformed.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// The response body could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<ValueError> for ClientError {
    fn from(err: ValueError) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
