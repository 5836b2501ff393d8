//! Listener, registration and the sequential accept loop.

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::client::SupervisorClient;
use crate::config::AdapterConfig;
use crate::rpc::{read_frame, write_frame, FrameError, Request, Response, ECHO_ACTION};
use crate::supervisor::AdapterId;

use super::{AdapterError, Device};

/// A bound adapter listener.
#[derive(Debug)]
pub struct AdapterServer {
    listener: TcpListener,
    port: u16,
    id: Option<AdapterId>,
    max_frame_len: usize,
}

impl AdapterServer {
    /// Bind an ephemeral port when `id` is set, otherwise the configured
    /// standalone port.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Bind`] if the socket cannot be bound.
    pub async fn bind(config: &AdapterConfig, id: Option<AdapterId>) -> Result<Self, AdapterError> {
        let port = if id.is_some() { 0 } else { config.standalone_port };
        let addr = format!("{}:{port}", config.bind);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| AdapterError::Bind { addr, source })?;
        let port = listener.local_addr()?.port();
        tracing::info!(port, id = ?id.as_ref().map(ToString::to_string), "Adapter listening");

        Ok(Self {
            listener,
            port,
            id,
            max_frame_len: config.max_frame_len,
        })
    }

    /// Port the adapter is listening on.
    #[must_use]
    pub fn local_port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn id(&self) -> Option<&AdapterId> {
        self.id.as_ref()
    }

    /// Report the listening port to the supervisor. A standalone adapter has
    /// nothing to register.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Registration`] if the supervisor cannot be
    /// reached or rejects the registration.
    pub async fn register(&self, supervisor: &SupervisorClient) -> Result<(), AdapterError> {
        let Some(id) = &self.id else {
            return Ok(());
        };
        supervisor
            .register(id, self.port)
            .await
            .map_err(|source| AdapterError::Registration {
                id: id.clone(),
                source,
            })?;
        tracing::info!(id = %id, port = self.port, supervisor = %supervisor.addr(), "Registered with supervisor");
        Ok(())
    }

    /// Serve connections one at a time until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Per-connection failures are logged and do not end the loop; this
    /// currently always returns `Ok`.
    pub async fn serve<D: Device + ?Sized>(
        self,
        device: &mut D,
        shutdown: CancellationToken,
    ) -> Result<(), AdapterError> {
        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    tracing::info!(device = device.name(), "Adapter shutting down");
                    break;
                }

                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            if let Err(e) = handle_connection(stream, device, self.max_frame_len).await {
                                tracing::warn!(peer = %peer, error = %e, "Adapter connection error");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

async fn handle_connection<D: Device + ?Sized>(
    mut stream: TcpStream,
    device: &mut D,
    max_frame_len: usize,
) -> Result<(), FrameError> {
    let Some(payload) = read_frame(&mut stream, max_frame_len).await? else {
        return Ok(());
    };
    let response = match Request::decode(&payload) {
        Ok(request) => dispatch(device, &request).await,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid request");
            Response::Err(e)
        }
    };
    write_frame(&mut stream, &response.encode()).await
}

/// Route one request: the echo action is answered here, everything else goes
/// to `device`.
pub async fn dispatch<D: Device + ?Sized>(device: &mut D, request: &Request) -> Response {
    tracing::debug!(device = device.name(), action = %request.command, "Handling request");

    if request.command == ECHO_ACTION {
        return Response::Ok(request.args.clone());
    }

    match device.handle(&request.command, &request.args).await {
        Ok(body) => Response::Ok(body),
        Err(e) => {
            tracing::warn!(device = device.name(), action = %request.command, error = %e, "Request failed");
            Response::Err(e.into())
        }
    }
}
