//! Adapter data client.

use std::fmt::Display;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::rpc::{value, Request, DEFAULT_MAX_FRAME_LEN, ECHO_ACTION};

use super::{round_trip, ClientError};

/// Default timeout for a single adapter request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for one adapter's data port. Each call opens a fresh connection.
#[derive(Debug, Clone)]
pub struct AdapterClient {
    addr: String,
    timeout: Duration,
    max_frame_len: usize,
}

impl AdapterClient {
    /// Creates a client for the adapter at `host:port`.
    pub fn new(host: impl Display, port: u16) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Applies timeout and frame limit from the `[client]` section.
    #[must_use]
    pub fn with_config(mut self, config: &ClientConfig) -> Self {
        self.timeout = config.request_timeout();
        self.max_frame_len = config.max_frame_len;
        self
    }

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

    /// Invoke `action` with raw `args` and return the raw response body.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::OperationFailed`] when the adapter answers with
    /// an error, or a transport error.
    pub async fn call(&self, action: &str, args: impl Into<Vec<u8>>) -> Result<Vec<u8>, ClientError> {
        let request = Request::new(action, args);
        let response = round_trip(&self.addr, &request, self.timeout, self.max_frame_len).await?;
        response
            .into_result()
            .map_err(ClientError::OperationFailed)
    }

    /// Round-trip `payload` through the adapter's echo action.
    ///
    /// # Errors
    ///
    /// See [`AdapterClient::call`].
    pub async fn echo(&self, payload: &[u8]) -> Result<Vec<u8>, ClientError> {
        self.call(ECHO_ACTION, payload).await
    }

    /// Read a boolean attribute via `<attr>_getattr`.
    ///
    /// # Errors
    ///
    /// See [`AdapterClient::call`]; also fails if the body is not one byte.
    pub async fn get_bool(&self, attr: &str) -> Result<bool, ClientError> {
        let body = self.call(&getter(attr), Vec::new()).await?;
        Ok(value::decode_bool(&body)?)
    }

    /// Read an integer attribute via `<attr>_getattr`.
    ///
    /// # Errors
    ///
    /// See [`AdapterClient::call`]; also fails if the body is not 4 bytes.
    pub async fn get_int(&self, attr: &str) -> Result<i32, ClientError> {
        let body = self.call(&getter(attr), Vec::new()).await?;
        Ok(value::decode_int(&body)?)
    }

    /// Read a float attribute via `<attr>_getattr`.
    ///
    /// # Errors
    ///
    /// See [`AdapterClient::call`]; also fails if the body is not 4 bytes.
    pub async fn get_float(&self, attr: &str) -> Result<f32, ClientError> {
        let body = self.call(&getter(attr), Vec::new()).await?;
        Ok(value::decode_float(&body)?)
    }

    /// Write an attribute via `<attr>_setattr`, sending `value` as text.
    ///
    /// # Errors
    ///
    /// See [`AdapterClient::call`].
    pub async fn set(&self, attr: &str, value: impl Display) -> Result<(), ClientError> {
        self.call(&setter(attr), value.to_string()).await.map(drop)
    }

    /// Write a boolean attribute, sent as `1` or `0`.
    ///
    /// # Errors
    ///
    /// See [`AdapterClient::call`].
    pub async fn set_bool(&self, attr: &str, value: bool) -> Result<(), ClientError> {
        self.set(attr, u8::from(value)).await
    }
}

fn getter(attr: &str) -> String {
    format!("{attr}_getattr")
}

fn setter(attr: &str) -> String {
    format!("{attr}_setattr")
}
