//! RPC client stubs.
//!
//! Callers use the two-phase pattern: ask the supervisor once for an
//! adapter's port ([`SupervisorClient`]), then talk to the adapter directly
//! ([`AdapterClient`]), opening a fresh connection per request.
//! [`AdapterSession`] ties both together and stops the adapter on release.
//!
//! # Example
//!
//! ```no_run
//! use labd::client::{AdapterSession, SupervisorClient};
//! use labd::supervisor::ModulePath;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let supervisor = SupervisorClient::new("localhost:42922");
//! let module = ModulePath::parse("devs test_psu.py")?;
//! let session = AdapterSession::ensure(supervisor, &module).await?;
//!
//! session.client().set_bool("output", true).await?;
//! assert!(session.client().get_bool("output").await?);
//!
//! session.stop().await?;
//! # Ok(())
//! # }
//! ```

mod adapter;
mod control;
mod error;
mod session;

pub use adapter::{AdapterClient, DEFAULT_REQUEST_TIMEOUT};
pub use control::{SupervisorClient, DEFAULT_CONTROL_TIMEOUT};
pub use error::ClientError;
pub use session::AdapterSession;

use std::time::Duration;

use tokio::net::TcpStream;

use crate::rpc::{exchange, Request, Response};

/// Connect to `addr`, send `request`, read the response, all within `timeout`.
async fn round_trip(
    addr: &str,
    request: &Request,
    timeout: Duration,
    max_frame_len: usize,
) -> Result<Response, ClientError> {
    // Safe: timeout values are never going to exceed u64::MAX milliseconds
    #[allow(clippy::cast_possible_truncation)]
    let timeout_ms = timeout.as_millis() as u64;

    let result = tokio::time::timeout(timeout, async {
        let mut stream =
            TcpStream::connect(addr)
                .await
                .map_err(|source| ClientError::Unreachable {
                    addr: addr.to_string(),
                    source,
                })?;
        Ok::<_, ClientError>(exchange(&mut stream, request, max_frame_len).await?)
    })
    .await;

    match result {
        Ok(inner) => inner,
        Err(_) => Err(ClientError::Timeout {
            addr: addr.to_string(),
            ms: timeout_ms,
        }),
    }
}

/// Host part of a `host:port` address. Addresses without a port are
/// returned unchanged.
#[must_use]
pub fn host_of(addr: &str) -> &str {
    addr.rsplit_once(':').map_or(addr, |(host, _)| host)
}
