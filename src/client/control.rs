//! Supervisor control client.

use std::time::Duration;

use crate::config::ClientConfig;
use crate::rpc::{RemoteError, Response, DEFAULT_MAX_FRAME_LEN, DEFAULT_SUPERVISOR_PORT};
use crate::supervisor::{AdapterId, ControlCommand, ModulePath};

use super::{round_trip, ClientError};

/// Default timeout for control calls. Longer than the supervisor's default
/// registration plus stop timeouts so a failed START comes back typed.
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(40);

/// Client for the supervisor's control port.
#[derive(Debug, Clone)]
pub struct SupervisorClient {
    addr: String,
    timeout: Duration,
    max_frame_len: usize,
}

impl Default for SupervisorClient {
    fn default() -> Self {
        Self::new(format!("localhost:{DEFAULT_SUPERVISOR_PORT}"))
    }
}

impl SupervisorClient {
    /// Creates a client for the supervisor at `addr` (`host:port`).
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_CONTROL_TIMEOUT,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Creates a client from the `[client]` configuration section.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            addr: config.supervisor.clone(),
            timeout: config.control_timeout(),
            max_frame_len: config.max_frame_len,
        }
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Spawn a new adapter instance and return its data port.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotStarted`] if the supervisor could not bring
    /// the adapter up, or a transport error.
    pub async fn start(&self, module: &ModulePath) -> Result<u16, ClientError> {
        let body = self
            .send(&ControlCommand::Start(module.clone()))
            .await?
            .map_err(ClientError::NotStarted)?;
        parse_port_body(&body)
    }

    /// Return the port of the adapter for `module`, starting it if needed.
    ///
    /// # Errors
    ///
    /// Same as [`SupervisorClient::start`].
    pub async fn ensure(&self, module: &ModulePath) -> Result<u16, ClientError> {
        let body = self
            .send(&ControlCommand::Ensure(module.clone()))
            .await?
            .map_err(ClientError::NotStarted)?;
        parse_port_body(&body)
    }

    /// Stop the adapter listening on `port`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rejected`] if no adapter owns the port.
    pub async fn stop(&self, port: u16) -> Result<(), ClientError> {
        self.send(&ControlCommand::Stop(port))
            .await?
            .map(drop)
            .map_err(ClientError::Rejected)
    }

    /// Report an adapter's listening port (used by adapters at startup).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rejected`] if the supervisor does not know `id`.
    pub async fn register(&self, id: &AdapterId, port: u16) -> Result<(), ClientError> {
        self.send(&ControlCommand::Port {
            id: id.clone(),
            port,
        })
        .await?
        .map(drop)
        .map_err(ClientError::Rejected)
    }

    async fn send(
        &self,
        command: &ControlCommand,
    ) -> Result<Result<Vec<u8>, RemoteError>, ClientError> {
        tracing::debug!(addr = %self.addr, command = %command, "Sending control request");
        let response: Response = round_trip(
            &self.addr,
            &command.to_request(),
            self.timeout,
            self.max_frame_len,
        )
        .await?;
        Ok(response.into_result())
    }
}

fn parse_port_body(body: &[u8]) -> Result<u16, ClientError> {
    std::str::from_utf8(body)
        .ok()
        .and_then(|text| text.trim().parse::<u16>().ok())
        .filter(|port| *port != 0)
        .ok_or_else(|| {
            ClientError::InvalidResponse(format!(
                "expected a port number, got {:?}",
                String::from_utf8_lossy(body)
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_defaults() {
        let client = SupervisorClient::default();
        assert_eq!(client.addr(), "localhost:42922");
        assert_eq!(client.timeout(), Duration::from_secs(40));
    }

    #[test]
    fn test_client_from_config() {
        let config = ClientConfig {
            supervisor: "192.168.1.91:42922".to_string(),
            control_timeout_ms: 1500,
            ..ClientConfig::default()
        };
        let client = SupervisorClient::from_config(&config);
        assert_eq!(client.addr(), "192.168.1.91:42922");
        assert_eq!(client.timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_port_body() {
        assert_eq!(parse_port_body(b"53217").unwrap(), 53217);
        assert!(parse_port_body(b"").is_err());
        assert!(parse_port_body(b"0").is_err());
        assert!(parse_port_body(b"port").is_err());
    }

    #[tokio::test]
    async fn test_start_without_supervisor_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = SupervisorClient::new(addr.to_string()).with_timeout(Duration::from_secs(2));
        let module = ModulePath::parse("devs test_psu.py").unwrap();
        let err = client.start(&module).await.unwrap_err();
        assert!(matches!(err, ClientError::Unreachable { .. }), "got {err:?}");
    }
}
