//! Supervisor core: START, ENSURE, STOP and PORT over the process table.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::SupervisorConfig;

use super::command::ControlError;
use super::registration::{RegistrationWaiter, WaitError};
use super::spawn::{AdapterCommand, AdapterProcess};
use super::table::{Begin, ProcessSummary, ProcessTable};
use super::{AdapterId, ModulePath};

/// How often a pending handshake checks whether its child died.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Supervisor state shared by every control connection.
///
/// The table lock is only held for short synchronous sections, never across
/// a registration wait or a process termination.
#[derive(Debug)]
pub struct Supervisor {
    config: SupervisorConfig,
    advertised_addr: String,
    table: Mutex<ProcessTable>,
}

impl Supervisor {
    /// Create a supervisor. `advertised_addr` is exported to children so they
    /// can register.
    #[must_use]
    pub fn new(config: SupervisorConfig, advertised_addr: impl Into<String>) -> Self {
        Self {
            config,
            advertised_addr: advertised_addr.into(),
            table: Mutex::new(ProcessTable::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    #[must_use]
    pub fn advertised_addr(&self) -> &str {
        &self.advertised_addr
    }

    /// Spawn a new adapter under a fresh identifier and wait for its port.
    ///
    /// # Errors
    ///
    /// Fails if the child cannot be spawned, exits early, or does not
    /// register in time. The table entry is rolled back in every case.
    pub async fn start(&self, module: &ModulePath) -> Result<u16, ControlError> {
        let (id, waiter) = self.table.lock().await.begin_sequential();
        self.spawn_and_wait(id, module, waiter).await
    }

    /// Return the port of the adapter for `module`, spawning it if needed.
    ///
    /// # Errors
    ///
    /// Same as [`Supervisor::start`], plus a protocol error when no
    /// identifier can be derived from the module path.
    pub async fn ensure(&self, module: &ModulePath) -> Result<u16, ControlError> {
        let id = module.derive_id()?;
        let begin = self.table.lock().await.begin(&id);
        match begin {
            Begin::Ready(port) => {
                tracing::debug!(id = %id, port, "Adapter already running");
                Ok(port)
            }
            Begin::Pending(waiter) => {
                tracing::debug!(id = %id, "Joining pending registration");
                waiter
                    .wait(self.config.registration_timeout())
                    .await
                    .map_err(|source| ControlError::Registration { id, source })
            }
            Begin::Created(waiter) => self.spawn_and_wait(id, module, waiter).await,
        }
    }

    /// Terminate the adapter registered on `port` and forget it.
    ///
    /// # Errors
    ///
    /// Returns a lookup error for unknown ports, or a termination error if the
    /// child could not be stopped.
    pub async fn stop(&self, port: u16) -> Result<(), ControlError> {
        let mut record = self.table.lock().await.remove_by_port(port)?;
        let uptime = record.created_at().elapsed();

        if let Some(mut process) = record.take_process() {
            process
                .graceful_terminate(self.config.stop_timeout())
                .await
                .map_err(|source| ControlError::Terminate { port, source })?;
        }

        tracing::info!(
            id = %record.id(),
            port,
            uptime_ms = u64::try_from(uptime.as_millis()).unwrap_or(u64::MAX),
            "Stopped adapter"
        );
        Ok(())
    }

    /// First half of PORT: store the reported port.
    ///
    /// # Errors
    ///
    /// Returns a lookup error for unknown identifiers and a protocol error for
    /// repeated registration.
    pub async fn record_registration(&self, id: &AdapterId, port: u16) -> Result<(), ControlError> {
        self.table.lock().await.record_port(id, port)?;
        tracing::info!(id = %id, port, "Adapter registered");
        Ok(())
    }

    /// Second half of PORT: wake whoever is waiting for `id`.
    pub async fn complete_registration(&self, id: &AdapterId) {
        if let Err(e) = self.table.lock().await.signal(id) {
            tracing::warn!(id = %id, error = %e, "Registration vanished before signal");
        }
    }

    /// Terminate every adapter and empty the table.
    pub async fn shutdown_all(&self) {
        let records = self.table.lock().await.drain();
        for mut record in records {
            if let Some(mut process) = record.take_process() {
                if let Err(e) = process.graceful_terminate(self.config.stop_timeout()).await {
                    tracing::warn!(id = %record.id(), error = %e, "Failed to stop adapter");
                }
            }
        }
    }

    /// Snapshot of the process table.
    pub async fn adapters(&self) -> Vec<ProcessSummary> {
        self.table.lock().await.summaries()
    }

    async fn spawn_and_wait(
        &self,
        id: AdapterId,
        module: &ModulePath,
        waiter: RegistrationWaiter,
    ) -> Result<u16, ControlError> {
        let path = module.resolve(&self.config.adapter_root);
        let command = AdapterCommand::new(path, id.clone())
            .launcher(&self.config.launcher)
            .supervisor_addr(self.advertised_addr.clone());

        let process = match command.spawn() {
            Ok(process) => process,
            Err(e) => {
                tracing::warn!(id = %id, module = %module, error = %e, "Failed to spawn adapter");
                self.table.lock().await.remove(&id);
                return Err(e.into());
            }
        };

        let attached = self.table.lock().await.attach(&id, process);
        if let Err((err, process)) = attached {
            self.terminate(process).await;
            return Err(err.into());
        }

        let outcome = tokio::select! {
            result = waiter.wait(self.config.registration_timeout()) => result,
            status = self.child_exited(&id) => Err(WaitError::Exited(status)),
        };

        match outcome {
            Ok(port) => Ok(port),
            Err(source) => {
                tracing::warn!(id = %id, module = %module, error = %source, "Adapter failed to register");
                let record = self.table.lock().await.remove(&id);
                if let Some(process) = record.and_then(|mut r| r.take_process()) {
                    self.terminate(process).await;
                }
                Err(ControlError::Registration { id, source })
            }
        }
    }

    /// Resolves once the child attached to `id` has exited. Never resolves if
    /// the record disappears.
    async fn child_exited(&self, id: &AdapterId) -> ExitStatus {
        let mut interval = tokio::time::interval(EXIT_POLL_INTERVAL);
        loop {
            interval.tick().await;
            let mut table = self.table.lock().await;
            if table.get(id).is_none() {
                drop(table);
                return std::future::pending().await;
            }
            if let Some(status) = table.exit_status(id) {
                return status;
            }
        }
    }

    async fn terminate(&self, mut process: AdapterProcess) {
        if let Err(e) = process.graceful_terminate(self.config.stop_timeout()).await {
            tracing::warn!(error = %e, "Failed to terminate adapter process");
        }
    }
}
