//! Adapter process skeleton.
//!
//! An adapter owns one hardware session (a [`Device`]), binds a listener,
//! registers its port with the supervisor and then serves one connection at
//! a time: accept, read one request, dispatch, write one response, close.
//!
//! The skeleton answers the echo action itself; every other action is passed
//! to the device, which parses the action token into its own command enum.

mod server;

pub use server::{dispatch, AdapterServer};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, SupervisorClient};
use crate::config::AdapterConfig;
use crate::devices::InstrumentError;
use crate::rpc::{ErrorKind, RemoteError};
use crate::supervisor::AdapterId;

/// A hardware session served by the adapter skeleton.
///
/// Requests are handled strictly one after another, so implementations may
/// keep unsynchronized mutable state.
#[async_trait]
pub trait Device: Send {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Handle one request and return the response body.
    async fn handle(&mut self, action: &str, args: &[u8]) -> Result<Vec<u8>, DeviceError>;
}

/// Errors a device reports for a single request.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Unknown action {0:?}")]
    UnknownAction(String),

    #[error("Invalid argument for {action}: {reason}")]
    InvalidArgument { action: String, reason: String },

    #[error("Hardware error: {0}")]
    Hardware(#[from] InstrumentError),
}

impl DeviceError {
    /// Convenience constructor for argument errors.
    pub fn invalid(action: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidArgument {
            action: action.into(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownAction(_) | Self::InvalidArgument { .. } => ErrorKind::Protocol,
            Self::Hardware(_) => ErrorKind::Operation,
        }
    }
}

impl From<DeviceError> for RemoteError {
    fn from(err: DeviceError) -> Self {
        RemoteError::new(err.kind(), err.to_string())
    }
}

/// Fatal adapter errors.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Failed to initialize hardware session: {0}")]
    Init(#[source] DeviceError),

    #[error("Registration as {id} failed: {source}")]
    Registration { id: AdapterId, source: ClientError },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Bind, register when launched under supervision, and serve `device` until
/// `shutdown` fires.
///
/// # Errors
///
/// Returns an error if binding or registration fails. Both are fatal for the
/// adapter process.
pub async fn run<D: Device + ?Sized>(
    config: &AdapterConfig,
    id: Option<AdapterId>,
    device: &mut D,
    shutdown: CancellationToken,
) -> Result<(), AdapterError> {
    let server = AdapterServer::bind(config, id).await?;
    let supervisor = SupervisorClient::new(config.supervisor.clone());
    server.register(&supervisor).await?;
    server.serve(device, shutdown).await
}
