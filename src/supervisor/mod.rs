//! Supervisor service: spawns adapter processes on demand, waits for them to
//! report their listening port, and stops them again.
//!
//! # State machine
//!
//! ```text
//! pending-spawn -> awaiting-registration -> registered(port) -> stopped
//! ```
//!
//! A record leaves the table when stopped, when its registration times out,
//! or when ENSURE finds its child has already exited.

mod command;
mod module;
mod registration;
mod server;
mod service;
mod spawn;
mod table;

pub use command::{ControlCommand, ControlError};
pub use module::{AdapterId, ModuleError, ModulePath};
pub use registration::{RegistrationEvent, RegistrationWaiter, WaitError};
pub use server::{ServerHandle, SupervisorServer};
pub use service::Supervisor;
pub use spawn::{AdapterCommand, AdapterProcess, SpawnError, SUPERVISOR_ENV};
pub use table::{Begin, ProcessRecord, ProcessState, ProcessSummary, ProcessTable, RegistryError};
