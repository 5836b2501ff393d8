//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rpc::{DEFAULT_MAX_FRAME_LEN, DEFAULT_STANDALONE_PORT, DEFAULT_SUPERVISOR_PORT};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LabdConfig {
    pub supervisor: SupervisorConfig,
    pub adapter: AdapterConfig,
    pub client: ClientConfig,
}

/// Configuration for the supervisor service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Interface to listen on.
    pub bind: String,
    /// Well-known control port. `0` picks an ephemeral port.
    pub port: u16,
    /// Directory adapter module paths are resolved against.
    pub adapter_root: PathBuf,
    /// Program (and leading arguments) used to run an adapter module.
    /// Empty means the module path is executed directly.
    pub launcher: Vec<String>,
    /// How long START/ENSURE waits for the child to register.
    pub registration_timeout_ms: u64,
    /// How long STOP waits after SIGTERM before killing the child.
    pub stop_timeout_ms: u64,
    /// Largest accepted request frame.
    pub max_frame_len: usize,
}

impl SupervisorConfig {
    #[must_use]
    pub fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_timeout_ms)
    }

    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_SUPERVISOR_PORT,
            adapter_root: PathBuf::from("."),
            launcher: Vec::new(),
            registration_timeout_ms: 30_000,
            stop_timeout_ms: 5_000,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Configuration for adapter processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Supervisor address to register with.
    pub supervisor: String,
    /// Interface to listen on.
    pub bind: String,
    /// Port used when launched without an identifier.
    pub standalone_port: u16,
    /// Largest accepted request frame.
    pub max_frame_len: usize,
    /// Slot addressed by the laser diode driver.
    pub laser_slot: u8,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            supervisor: format!("localhost:{DEFAULT_SUPERVISOR_PORT}"),
            bind: "0.0.0.0".to_string(),
            standalone_port: DEFAULT_STANDALONE_PORT,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            laser_slot: 1,
        }
    }
}

/// Configuration for RPC client stubs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Supervisor address.
    pub supervisor: String,
    /// Timeout for control calls. START/ENSURE include adapter startup, so
    /// this must outlast the supervisor's registration and stop timeouts.
    pub control_timeout_ms: u64,
    /// Timeout for a single adapter request.
    pub request_timeout_ms: u64,
    /// Largest accepted response frame.
    pub max_frame_len: usize,
}

impl ClientConfig {
    #[must_use]
    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            supervisor: format!("localhost:{DEFAULT_SUPERVISOR_PORT}"),
            control_timeout_ms: 40_000,
            request_timeout_ms: 10_000,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}
