//! Wire protocol shared by the supervisor control channel and adapter data
//! channels.
//!
//! # Architecture
//!
//! ```text
//! Client                 Supervisor              Adapter
//!   |-- ENSURE devs x ----->|                       |
//!   |                       |-- spawn(x, id) ------>|
//!   |                       |<-- PORT id port ------|
//!   |<-- port --------------|                       |
//!   |-- output_getattr ------------------------------>|
//!   |<-- 0x01 ----------------------------------------|
//! ```
//!
//! # Protocol
//!
//! Every exchange is one request frame and one response frame over a fresh
//! TCP connection. Frames are length-prefixed (see [`frame`]); payloads are
//! described in [`message`].

pub mod frame;
pub mod message;
pub mod value;

use tokio::net::TcpStream;

pub use frame::{read_frame, write_frame, FrameError, DEFAULT_MAX_FRAME_LEN};
pub use message::{ErrorKind, RemoteError, Request, Response};
pub use value::ValueError;

/// Well-known supervisor port.
pub const DEFAULT_SUPERVISOR_PORT: u16 = 42922;

/// Port an adapter binds when launched outside supervision.
pub const DEFAULT_STANDALONE_PORT: u16 = 65050;

/// Action every adapter answers by returning its argument unchanged.
pub const ECHO_ACTION: &str = "_echo";

/// Send one request over `stream` and read one response.
///
/// # Errors
///
/// Returns a frame error if writing or reading fails, or if the peer closes
/// the connection without answering.
pub async fn exchange(
    stream: &mut TcpStream,
    request: &Request,
    max_frame_len: usize,
) -> Result<Response, ExchangeError> {
    write_frame(stream, &request.encode()).await?;
    let payload = read_frame(stream, max_frame_len)
        .await?
        .ok_or(ExchangeError::NoResponse)?;
    Ok(Response::decode(&payload)?)
}

/// Errors from a single request/response exchange.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Peer closed the connection without responding")]
    NoResponse,

    #[error("Malformed response: {0}")]
    Malformed(#[from] RemoteError),
}

