//! Adapter process spawning and control.
//!
//! This module provides a builder for the command line that launches an
//! adapter module, along with control methods for the running child.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};

use super::AdapterId;

/// Environment variable through which a child learns the supervisor address.
pub const SUPERVISOR_ENV: &str = "LABD_SUPERVISOR";

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The program was not found.
    #[error("Adapter program not found: {0}")]
    NotFound(PathBuf),
    /// Permission denied when spawning.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    fn from_io(err: std::io::Error, program: &Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(program.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(program.to_path_buf()),
            _ => Self::Io(err),
        }
    }
}

/// Builder for the command that runs one adapter module.
#[derive(Debug, Clone)]
pub struct AdapterCommand {
    module: PathBuf,
    id: AdapterId,
    launcher: Vec<String>,
    supervisor_addr: Option<String>,
}

impl AdapterCommand {
    /// Create a builder for `module`, registering under `id`.
    #[must_use]
    pub fn new(module: impl Into<PathBuf>, id: AdapterId) -> Self {
        Self {
            module: module.into(),
            id,
            launcher: Vec::new(),
            supervisor_addr: None,
        }
    }

    /// Run the module through a launcher program, e.g. `["python3"]`.
    #[must_use]
    pub fn launcher(mut self, launcher: &[String]) -> Self {
        self.launcher = launcher.to_vec();
        self
    }

    /// Address exported to the child via [`SUPERVISOR_ENV`].
    #[must_use]
    pub fn supervisor_addr(mut self, addr: impl Into<String>) -> Self {
        self.supervisor_addr = Some(addr.into());
        self
    }

    /// Program that will be executed.
    #[must_use]
    pub fn program(&self) -> PathBuf {
        match self.launcher.first() {
            Some(program) => PathBuf::from(program),
            None => self.module.clone(),
        }
    }

    /// Arguments passed to [`AdapterCommand::program`].
    #[must_use]
    pub fn build_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if !self.launcher.is_empty() {
            args.extend(self.launcher[1..].iter().map(OsString::from));
            args.push(self.module.clone().into_os_string());
        }
        args.push(OsString::from(self.id.to_string()));
        args
    }

    /// Spawn the child.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    pub fn spawn(&self) -> Result<AdapterProcess, SpawnError> {
        let program = self.program();
        let mut cmd = Command::new(&program);
        cmd.args(self.build_args())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(addr) = &self.supervisor_addr {
            cmd.env(SUPERVISOR_ENV, addr);
        }

        let child = cmd.spawn().map_err(|e| SpawnError::from_io(e, &program))?;
        tracing::info!(
            id = %self.id,
            module = %self.module.display(),
            pid = child.id(),
            "Spawned adapter process"
        );

        Ok(AdapterProcess { child })
    }
}

/// A running adapter process.
#[derive(Debug)]
pub struct AdapterProcess {
    child: Child,
}

impl AdapterProcess {
    /// Get the OS process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Whether the child has not exited yet.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Check if the process has exited without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Attempt graceful termination with a timeout.
    ///
    /// On Unix, sends SIGTERM first, then SIGKILL after the timeout.
    /// On other platforms, falls back to immediate kill.
    ///
    /// # Errors
    ///
    /// Returns an error if termination fails.
    pub async fn graceful_terminate(&mut self, timeout: Duration) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            self.graceful_terminate_unix(timeout).await
        }

        #[cfg(not(unix))]
        {
            let _ = timeout;
            self.child.kill().await
        }
    }

    #[cfg(unix)]
    async fn graceful_terminate_unix(&mut self, timeout: Duration) -> std::io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = self.id() {
            let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
            let _ = kill(nix_pid, Signal::SIGTERM);

            match tokio::time::timeout(timeout, self.child.wait()).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(_) => {
                    tracing::warn!(pid, "Adapter ignored SIGTERM, killing");
                    self.child.kill().await
                }
            }
        } else {
            // Process already exited
            Ok(())
        }
    }
}
