//! Control channel commands.

use std::fmt;

use crate::rpc::{ErrorKind, RemoteError, Request};

use super::registration::WaitError;
use super::spawn::SpawnError;
use super::{AdapterId, ModuleError, ModulePath, RegistryError};

/// A parsed control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Spawn a fresh adapter under a new sequential identifier.
    Start(ModulePath),
    /// Spawn the adapter unless one with the derived identifier is running.
    Ensure(ModulePath),
    /// Terminate the adapter registered on a port.
    Stop(u16),
    /// Adapter self-registration.
    Port { id: AdapterId, port: u16 },
}

impl ControlCommand {
    pub const START: &'static str = "START";
    pub const ENSURE: &'static str = "ENSURE";
    pub const STOP: &'static str = "STOP";
    pub const PORT: &'static str = "PORT";

    /// Parse a request. The command keyword is case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::UnknownCommand`] for unrecognized keywords and
    /// [`ControlError::InvalidArgument`] for malformed arguments.
    pub fn parse(request: &Request) -> Result<Self, ControlError> {
        let keyword = request.command.to_ascii_uppercase();
        let args = request
            .args_str()
            .map_err(|e| ControlError::InvalidArgument(e.message))?;

        match keyword.as_str() {
            Self::START => Ok(Self::Start(ModulePath::parse(args)?)),
            Self::ENSURE => Ok(Self::Ensure(ModulePath::parse(args)?)),
            Self::STOP => Ok(Self::Stop(parse_port(args)?)),
            Self::PORT => {
                let mut parts = args.split_whitespace();
                let (Some(id), Some(port), None) = (parts.next(), parts.next(), parts.next())
                else {
                    return Err(ControlError::InvalidArgument(format!(
                        "PORT expects `<identifier> <port>`, got {args:?}"
                    )));
                };
                Ok(Self::Port {
                    id: id.parse()?,
                    port: parse_port(port)?,
                })
            }
            _ => Err(ControlError::UnknownCommand(request.command.clone())),
        }
    }

    /// Encode as a request frame.
    #[must_use]
    pub fn to_request(&self) -> Request {
        match self {
            Self::Start(module) => Request::new(Self::START, module.to_string()),
            Self::Ensure(module) => Request::new(Self::ENSURE, module.to_string()),
            Self::Stop(port) => Request::new(Self::STOP, port.to_string()),
            Self::Port { id, port } => Request::new(Self::PORT, format!("{id} {port}")),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start(module) => write!(f, "START {module}"),
            Self::Ensure(module) => write!(f, "ENSURE {module}"),
            Self::Stop(port) => write!(f, "STOP {port}"),
            Self::Port { id, port } => write!(f, "PORT {id} {port}"),
        }
    }
}

fn parse_port(text: &str) -> Result<u16, ControlError> {
    match text.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ControlError::InvalidArgument(format!(
            "expected a port number, got {text:?}"
        ))),
    }
}

/// Errors produced while handling a control request.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Unknown command {0:?}")]
    UnknownCommand(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Failed to spawn adapter: {0}")]
    Spawn(#[from] SpawnError),

    #[error("Adapter {id} did not register: {source}")]
    Registration { id: AdapterId, source: WaitError },

    #[error("Failed to stop adapter on port {port}: {source}")]
    Terminate { port: u16, source: std::io::Error },
}

impl ControlError {
    /// Wire error kind for this failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownCommand(_) | Self::InvalidArgument(_) | Self::Module(_) => {
                ErrorKind::Protocol
            }
            Self::Registry(RegistryError::AlreadyRegistered(_) | RegistryError::PortInUse { .. }) => {
                ErrorKind::Protocol
            }
            Self::Registry(_) => ErrorKind::Lookup,
            Self::Spawn(_) => ErrorKind::Spawn,
            Self::Registration {
                source: WaitError::Timeout(_),
                ..
            } => ErrorKind::Timeout,
            Self::Registration { .. } => ErrorKind::Spawn,
            Self::Terminate { .. } => ErrorKind::Operation,
        }
    }
}

impl From<ControlError> for RemoteError {
    fn from(err: ControlError) -> Self {
        RemoteError::new(err.kind(), err.to_string())
    }
}
