//! Process table: one record per live adapter, keyed by [`AdapterId`],
//! with a secondary port index for port-addressed STOP.

use std::collections::HashMap;
use std::process::ExitStatus;
use std::time::Instant;

use super::registration::{RegistrationEvent, RegistrationWaiter};
use super::spawn::AdapterProcess;
use super::AdapterId;

/// Lifecycle of one adapter record.
///
/// `Stopped` is never stored; a stopped record leaves the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessState {
    #[default]
    PendingSpawn,
    AwaitingRegistration,
    Registered,
}

/// Errors from process table operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown adapter identifier {0}")]
    UnknownId(AdapterId),

    #[error("No adapter registered on port {0}")]
    UnknownPort(u16),

    #[error("Adapter {0} is already registered")]
    AlreadyRegistered(AdapterId),

    #[error("Port {port} is already registered by adapter {owner}")]
    PortInUse { port: u16, owner: AdapterId },
}

/// One adapter process known to the supervisor.
#[derive(Debug)]
pub struct ProcessRecord {
    id: AdapterId,
    process: Option<AdapterProcess>,
    port: Option<u16>,
    ready: RegistrationEvent,
    state: ProcessState,
    created_at: Instant,
}

impl ProcessRecord {
    fn new(id: AdapterId) -> Self {
        Self {
            id,
            process: None,
            port: None,
            ready: RegistrationEvent::new(),
            state: ProcessState::PendingSpawn,
            created_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &AdapterId {
        &self.id
    }

    /// The registered port. `None` until the registration event has fired.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        if self.ready.is_signaled() {
            self.port
        } else {
            None
        }
    }

    #[must_use]
    pub fn state(&self) -> ProcessState {
        self.state
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Take the child handle out of the record.
    pub fn take_process(&mut self) -> Option<AdapterProcess> {
        self.process.take()
    }

    /// `false` only when a child is attached and has exited.
    fn is_alive(&mut self) -> bool {
        self.process.as_mut().map_or(true, AdapterProcess::is_running)
    }
}

/// Outcome of [`ProcessTable::begin`].
#[derive(Debug)]
pub enum Begin {
    /// A new record was created; the caller must spawn the child.
    Created(RegistrationWaiter),
    /// A handshake for this identifier is already in flight; wait on it.
    Pending(RegistrationWaiter),
    /// The adapter is registered and alive.
    Ready(u16),
}

/// Summary of one record for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    pub id: String,
    pub pid: Option<u32>,
    pub port: Option<u16>,
    pub state: ProcessState,
}

/// Registry of adapter processes.
#[derive(Debug, Default)]
pub struct ProcessTable {
    records: HashMap<AdapterId, ProcessRecord>,
    by_port: HashMap<u16, AdapterId>,
    last_sequence: u64,
}

impl ProcessTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next sequential identifier and create its record.
    ///
    /// Registered records whose child has exited are swept first.
    pub fn begin_sequential(&mut self) -> (AdapterId, RegistrationWaiter) {
        self.reap_exited();
        self.last_sequence += 1;
        let id = AdapterId::Sequential(self.last_sequence);
        let record = ProcessRecord::new(id.clone());
        let waiter = record.ready.subscribe();
        self.records.insert(id.clone(), record);
        (id, waiter)
    }

    /// Create the record for `id` unless one already exists.
    ///
    /// A registered record whose child has exited is discarded and replaced.
    pub fn begin(&mut self, id: &AdapterId) -> Begin {
        if let Some(record) = self.records.get_mut(id) {
            if !record.ready.is_signaled() {
                return Begin::Pending(record.ready.subscribe());
            }
            if record.is_alive() {
                if let Some(port) = record.port {
                    return Begin::Ready(port);
                }
            }
            tracing::info!(id = %id, "Discarding record of exited adapter");
            self.remove(id);
        }

        let record = ProcessRecord::new(id.clone());
        let waiter = record.ready.subscribe();
        self.records.insert(id.clone(), record);
        Begin::Created(waiter)
    }

    /// Attach the spawned child to its record.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownId`] if the record was removed meanwhile;
    /// the child is handed back so the caller can terminate it.
    pub fn attach(
        &mut self,
        id: &AdapterId,
        process: AdapterProcess,
    ) -> Result<(), (RegistryError, AdapterProcess)> {
        match self.records.get_mut(id) {
            Some(record) => {
                record.process = Some(process);
                if record.state == ProcessState::PendingSpawn {
                    record.state = ProcessState::AwaitingRegistration;
                }
                Ok(())
            }
            None => Err((RegistryError::UnknownId(id.clone()), process)),
        }
    }

    /// Record the port an adapter reported. The readiness event is left
    /// untouched; call [`ProcessTable::signal`] once the adapter has been
    /// acknowledged.
    ///
    /// # Errors
    ///
    /// Fails for unknown identifiers, repeated registration, or a port that
    /// another live record already owns.
    pub fn record_port(&mut self, id: &AdapterId, port: u16) -> Result<(), RegistryError> {
        if let Some(owner) = self.by_port.get(&port).cloned() {
            if &owner != id {
                let owner_alive = self.records.get_mut(&owner).is_some_and(ProcessRecord::is_alive);
                if owner_alive {
                    return Err(RegistryError::PortInUse { port, owner });
                }
                tracing::info!(id = %owner, port, "Releasing port held by exited adapter");
                self.remove(&owner);
            }
        }
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownId(id.clone()))?;
        if record.port.is_some() {
            return Err(RegistryError::AlreadyRegistered(id.clone()));
        }
        record.port = Some(port);
        record.state = ProcessState::Registered;
        self.by_port.insert(port, id.clone());
        Ok(())
    }

    /// Fire the readiness event for `id`, waking pending START/ENSURE calls.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownId`] when there is no record or no
    /// recorded port to signal.
    pub fn signal(&self, id: &AdapterId) -> Result<u16, RegistryError> {
        let record = self
            .records
            .get(id)
            .ok_or_else(|| RegistryError::UnknownId(id.clone()))?;
        let port = record
            .port
            .ok_or_else(|| RegistryError::UnknownId(id.clone()))?;
        record.ready.signal(port);
        Ok(port)
    }

    /// Registered port for `id`, if the handshake has completed.
    #[must_use]
    pub fn port_of(&self, id: &AdapterId) -> Option<u16> {
        self.records.get(id).and_then(ProcessRecord::port)
    }

    /// Exit status of the child attached to `id`, once it has exited.
    pub fn exit_status(&mut self, id: &AdapterId) -> Option<ExitStatus> {
        let process = self.records.get_mut(id)?.process.as_mut()?;
        process.try_wait().ok().flatten()
    }

    /// Identifier registered on `port`.
    #[must_use]
    pub fn id_for_port(&self, port: u16) -> Option<&AdapterId> {
        self.by_port.get(&port)
    }

    #[must_use]
    pub fn get(&self, id: &AdapterId) -> Option<&ProcessRecord> {
        self.records.get(id)
    }

    /// Remove the record for `id` and its port index entry.
    pub fn remove(&mut self, id: &AdapterId) -> Option<ProcessRecord> {
        let record = self.records.remove(id)?;
        if let Some(port) = record.port {
            self.by_port.remove(&port);
        }
        Some(record)
    }

    /// Remove the record registered on `port`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownPort`] if nothing is registered there.
    pub fn remove_by_port(&mut self, port: u16) -> Result<ProcessRecord, RegistryError> {
        let id = self
            .by_port
            .get(&port)
            .cloned()
            .ok_or(RegistryError::UnknownPort(port))?;
        self.remove(&id).ok_or(RegistryError::UnknownPort(port))
    }

    /// Remove registered records whose child has exited without a STOP.
    ///
    /// Records still waiting for registration are left alone; their START or
    /// ENSURE notices the exit and rolls them back.
    pub fn reap_exited(&mut self) -> Vec<ProcessRecord> {
        let exited: Vec<AdapterId> = self
            .records
            .iter_mut()
            .filter(|(_, record)| record.state == ProcessState::Registered)
            .filter_map(|(id, record)| (!record.is_alive()).then(|| id.clone()))
            .collect();

        exited
            .iter()
            .filter_map(|id| {
                tracing::info!(id = %id, "Discarding record of exited adapter");
                self.remove(id)
            })
            .collect()
    }

    /// Remove every record.
    pub fn drain(&mut self) -> Vec<ProcessRecord> {
        self.by_port.clear();
        self.records.drain().map(|(_, record)| record).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of all records, sorted by identifier text.
    #[must_use]
    pub fn summaries(&self) -> Vec<ProcessSummary> {
        let mut out: Vec<ProcessSummary> = self
            .records
            .values()
            .map(|record| ProcessSummary {
                id: record.id.to_string(),
                pid: record.process.as_ref().and_then(AdapterProcess::id),
                port: record.port(),
                state: record.state,
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}
