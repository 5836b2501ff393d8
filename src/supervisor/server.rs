//! TCP control server for the supervisor.
//!
//! Each inbound connection carries exactly one request frame and receives
//! exactly one response frame.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SupervisorConfig;
use crate::rpc::{read_frame, write_frame, FrameError, RemoteError, Request, Response};

use super::command::{ControlCommand, ControlError};
use super::service::Supervisor;
use super::table::ProcessSummary;

/// Control server bound to its listening socket, not yet accepting.
#[derive(Debug)]
pub struct SupervisorServer {
    listener: TcpListener,
    supervisor: Arc<Supervisor>,
}

impl SupervisorServer {
    /// Bind the control port described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub async fn bind(config: SupervisorConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind((config.bind.as_str(), config.port)).await?;
        let local = listener.local_addr()?;
        let advertised = advertised_addr(local);
        tracing::info!(addr = %local, "Supervisor listening");

        Ok(Self {
            listener,
            supervisor: Arc::new(Supervisor::new(config, advertised)),
        })
    }

    /// Address the server is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be queried.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawn the accept loop and return a handle to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be queried.
    pub fn start(self) -> std::io::Result<ServerHandle> {
        let local_addr = self.listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let supervisor = Arc::clone(&self.supervisor);
        let listener = self.listener;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    () = token.cancelled() => {
                        tracing::info!("Supervisor shutting down");
                        break;
                    }

                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, peer)) => {
                                let supervisor = Arc::clone(&supervisor);
                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(stream, &supervisor).await {
                                        tracing::warn!(peer = %peer, error = %e, "Control connection error");
                                    }
                                });
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Failed to accept connection");
                            }
                        }
                    }
                }
            }
            drop(listener);
            supervisor.shutdown_all().await;
        });

        Ok(ServerHandle {
            local_addr,
            supervisor: self.supervisor,
            shutdown,
            task: Some(task),
        })
    }
}

/// Handle for a running supervisor.
///
/// Dropping the handle stops accepting connections; children still in the
/// table are terminated by the accept loop on its way out.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    supervisor: Arc<Supervisor>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the server is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared supervisor state.
    #[must_use]
    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Snapshot of known adapters.
    pub async fn adapters(&self) -> Vec<ProcessSummary> {
        self.supervisor.adapters().await
    }

    /// Signals the server to shut down.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Shut down and wait until every adapter has been terminated.
    pub async fn shutdown_and_wait(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Supervisor task failed");
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Address children should use to reach a supervisor bound to `local`.
fn advertised_addr(local: SocketAddr) -> String {
    if local.ip().is_unspecified() {
        format!("127.0.0.1:{}", local.port())
    } else {
        local.to_string()
    }
}

/// Handles a single control connection.
async fn handle_connection(mut stream: TcpStream, supervisor: &Supervisor) -> Result<(), FrameError> {
    let max_len = supervisor.config().max_frame_len;
    let Some(payload) = read_frame(&mut stream, max_len).await? else {
        return Ok(());
    };

    let command = match Request::decode(&payload)
        .map_err(|e| ControlError::InvalidArgument(e.message))
        .and_then(|request| ControlCommand::parse(&request))
    {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid command");
            return respond(&mut stream, Err(e.into())).await;
        }
    };

    tracing::debug!(command = %command, "Received control request");

    match command {
        ControlCommand::Start(module) => {
            let result = supervisor.start(&module).await;
            respond(&mut stream, port_body(result)).await
        }
        ControlCommand::Ensure(module) => {
            let result = supervisor.ensure(&module).await;
            respond(&mut stream, port_body(result)).await
        }
        ControlCommand::Stop(port) => {
            let result = supervisor.stop(port).await;
            respond(&mut stream, result.map(|()| Vec::new()).map_err(Into::into)).await
        }
        ControlCommand::Port { id, port } => {
            if let Err(e) = supervisor.record_registration(&id, port).await {
                tracing::warn!(id = %id, port, error = %e, "Rejected registration");
                return respond(&mut stream, Err(e.into())).await;
            }
            // Acknowledge before waking the waiter.
            let acked = respond(&mut stream, Ok(Vec::new())).await;
            supervisor.complete_registration(&id).await;
            acked
        }
    }
}

fn port_body(result: Result<u16, ControlError>) -> Result<Vec<u8>, RemoteError> {
    result
        .map(|port| port.to_string().into_bytes())
        .map_err(|e| {
            tracing::warn!(error = %e, "Control request failed");
            e.into()
        })
}

async fn respond(
    stream: &mut TcpStream,
    result: Result<Vec<u8>, RemoteError>,
) -> Result<(), FrameError> {
    write_frame(stream, &Response::from(result).encode()).await
}
