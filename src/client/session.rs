//! Adapter lifetime bound to a value.

use tokio::runtime::Handle;

use crate::config::ClientConfig;
use crate::supervisor::ModulePath;

use super::{host_of, AdapterClient, ClientError, SupervisorClient};

/// An adapter obtained through the supervisor and stopped when released.
///
/// Call [`AdapterSession::stop`] to release deterministically. Dropping an
/// unreleased session issues a best-effort STOP on the current Tokio runtime;
/// outside a runtime the adapter is left running.
#[derive(Debug)]
pub struct AdapterSession {
    supervisor: SupervisorClient,
    client: AdapterClient,
    port: u16,
    released: bool,
}

impl AdapterSession {
    /// Spawn a fresh adapter instance.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotStarted`] if the adapter could not be started.
    pub async fn start(supervisor: SupervisorClient, module: &ModulePath) -> Result<Self, ClientError> {
        let port = supervisor.start(module).await?;
        Ok(Self::attach(supervisor, port))
    }

    /// Reuse the adapter for `module` if it is already running.
    ///
    /// Releasing an ensured session stops the shared adapter for every
    /// other holder too.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotStarted`] if the adapter could not be started.
    pub async fn ensure(supervisor: SupervisorClient, module: &ModulePath) -> Result<Self, ClientError> {
        let port = supervisor.ensure(module).await?;
        Ok(Self::attach(supervisor, port))
    }

    fn attach(supervisor: SupervisorClient, port: u16) -> Self {
        let client = AdapterClient::new(host_of(supervisor.addr()), port);
        tracing::debug!(addr = %client.addr(), "Attached to adapter");
        Self {
            supervisor,
            client,
            port,
            released: false,
        }
    }

    /// Applies request settings from the `[client]` section.
    #[must_use]
    pub fn with_config(mut self, config: &ClientConfig) -> Self {
        self.client = self.client.clone().with_config(config);
        self
    }

    #[must_use]
    pub fn client(&self) -> &AdapterClient {
        &self.client
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop the adapter.
    ///
    /// # Errors
    ///
    /// Returns the supervisor's error if the STOP was rejected or could not
    /// be delivered.
    pub async fn stop(mut self) -> Result<(), ClientError> {
        self.released = true;
        self.supervisor.stop(self.port).await
    }
}

impl Drop for AdapterSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!(port = self.port, "Adapter session dropped outside a runtime; not stopped");
            return;
        };
        let supervisor = self.supervisor.clone();
        let port = self.port;
        handle.spawn(async move {
            if let Err(e) = supervisor.stop(port).await {
                tracing::warn!(port, error = %e, "Failed to stop adapter on release");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn config_applies_to_the_adapter_client() {
        let config = ClientConfig {
            request_timeout_ms: 750,
            ..ClientConfig::default()
        };
        let mut session = AdapterSession::attach(SupervisorClient::new("192.168.1.91:42922"), 53217)
            .with_config(&config);
        assert_eq!(session.port(), 53217);
        assert_eq!(session.client().addr(), "192.168.1.91:53217");
        assert_eq!(session.client().timeout(), Duration::from_millis(750));

        // Nothing to stop against; skip the release STOP.
        session.released = true;
    }
}
