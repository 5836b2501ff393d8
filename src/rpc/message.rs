//! Request and response payloads.
//!
//! A request payload is `COMMAND[ SP ARGUMENT-BLOB]`. A response payload
//! starts with a status byte: `0x00` followed by the body, or `0x01`
//! followed by an [`ErrorKind`] code and a UTF-8 message.

use std::fmt;

const STATUS_OK: u8 = 0x00;
const STATUS_ERROR: u8 = 0x01;

/// A single request frame: a command token and its raw argument blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Command or action token (no spaces).
    pub command: String,
    /// Everything after the first space, untouched.
    pub args: Vec<u8>,
}

impl Request {
    /// Create a request with an argument blob.
    #[must_use]
    pub fn new(command: impl Into<String>, args: impl Into<Vec<u8>>) -> Self {
        Self {
            command: command.into(),
            args: args.into(),
        }
    }

    /// Create a request with no arguments.
    #[must_use]
    pub fn bare(command: impl Into<String>) -> Self {
        Self::new(command, Vec::new())
    }

    /// Encode as `COMMAND SP ARGS`, omitting the separator when there are no args.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.command.len() + 1 + self.args.len());
        out.extend_from_slice(self.command.as_bytes());
        if !self.args.is_empty() {
            out.push(b' ');
            out.extend_from_slice(&self.args);
        }
        out
    }

    /// Split a payload at its first space.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is empty or the command token is not UTF-8.
    pub fn decode(payload: &[u8]) -> Result<Self, RemoteError> {
        let (command, args) = match payload.iter().position(|b| *b == b' ') {
            Some(idx) => (&payload[..idx], &payload[idx + 1..]),
            None => (payload, &[][..]),
        };
        if command.is_empty() {
            return Err(RemoteError::protocol("empty command"));
        }
        let command = std::str::from_utf8(command)
            .map_err(|_| RemoteError::protocol("command token is not valid UTF-8"))?;
        Ok(Self::new(command, args))
    }

    /// The argument blob as UTF-8 text, trimmed of surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the blob is not UTF-8.
    pub fn args_str(&self) -> Result<&str, RemoteError> {
        std::str::from_utf8(&self.args)
            .map(str::trim)
            .map_err(|_| RemoteError::protocol("argument is not valid UTF-8"))
    }
}

/// Error categories carried over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown port or identifier.
    Lookup,
    /// Unknown command or malformed arguments.
    Protocol,
    /// Connection refused, reset or cut short.
    Transport,
    /// Registration or request did not complete in time.
    Timeout,
    /// The adapter process could not be launched.
    Spawn,
    /// The adapter accepted the request but the hardware call failed.
    Operation,
}

impl ErrorKind {
    /// Wire code for this kind.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Lookup => 1,
            Self::Protocol => 2,
            Self::Transport => 3,
            Self::Timeout => 4,
            Self::Spawn => 5,
            Self::Operation => 6,
        }
    }

    /// Parse a wire code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Lookup),
            2 => Some(Self::Protocol),
            3 => Some(Self::Transport),
            4 => Some(Self::Timeout),
            5 => Some(Self::Spawn),
            6 => Some(Self::Operation),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lookup => "lookup",
            Self::Protocol => "protocol",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Spawn => "spawn",
            Self::Operation => "operation",
        };
        f.write_str(name)
    }
}

/// A typed error as returned by the remote end.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RemoteError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn lookup(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Lookup, message)
    }

    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, message)
    }

    #[must_use]
    pub fn operation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Operation, message)
    }
}

/// A single response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Success with a (possibly empty) body.
    Ok(Vec<u8>),
    /// Failure with a typed error.
    Err(RemoteError),
}

impl Response {
    /// Empty acknowledgement.
    #[must_use]
    pub fn ack() -> Self {
        Self::Ok(Vec::new())
    }

    /// Encode with the leading status byte.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Ok(body) => {
                let mut out = Vec::with_capacity(body.len() + 1);
                out.push(STATUS_OK);
                out.extend_from_slice(body);
                out
            }
            Self::Err(err) => {
                let mut out = Vec::with_capacity(err.message.len() + 2);
                out.push(STATUS_ERROR);
                out.push(err.kind.code());
                out.extend_from_slice(err.message.as_bytes());
                out
            }
        }
    }

    /// Decode a response payload.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the status byte or error kind is unknown.
    pub fn decode(payload: &[u8]) -> Result<Self, RemoteError> {
        match payload.split_first() {
            Some((&STATUS_OK, body)) => Ok(Self::Ok(body.to_vec())),
            Some((&STATUS_ERROR, rest)) => {
                let (code, message) = rest
                    .split_first()
                    .ok_or_else(|| RemoteError::protocol("error response without kind"))?;
                let kind = ErrorKind::from_code(*code).ok_or_else(|| {
                    RemoteError::protocol(format!("unknown error kind code {code}"))
                })?;
                Ok(Self::Err(RemoteError::new(
                    kind,
                    String::from_utf8_lossy(message).into_owned(),
                )))
            }
            Some((status, _)) => Err(RemoteError::protocol(format!(
                "unknown response status {status:#04x}"
            ))),
            None => Err(RemoteError::protocol("empty response")),
        }
    }

    /// Convert into a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the carried [`RemoteError`] for error responses.
    pub fn into_result(self) -> Result<Vec<u8>, RemoteError> {
        match self {
            Self::Ok(body) => Ok(body),
            Self::Err(err) => Err(err),
        }
    }
}

impl From<Result<Vec<u8>, RemoteError>> for Response {
    fn from(result: Result<Vec<u8>, RemoteError>) -> Self {
        match result {
            Ok(body) => Self::Ok(body),
            Err(err) => Self::Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_splits_at_first_space_only() {
        let req = Request::decode(b"PORT 7 53217").unwrap();
        assert_eq!(req.command, "PORT");
        assert_eq!(req.args, b"7 53217");
    }

    #[test]
    fn request_without_args() {
        let req = Request::decode(b"output_getattr").unwrap();
        assert_eq!(req.command, "output_getattr");
        assert!(req.args.is_empty());
        assert_eq!(req.encode(), b"output_getattr");
    }

    #[test]
    fn request_keeps_binary_args() {
        let req = Request::new("_echo", vec![0xff, b' ', 0x00]);
        let decoded = Request::decode(&req.encode()).unwrap();
        assert_eq!(decoded.args, vec![0xff, b' ', 0x00]);
    }

    #[test]
    fn request_rejects_empty_command() {
        let err = Request::decode(b" args").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Protocol);
        assert!(Request::decode(b"").is_err());
    }

    #[test]
    fn ok_response_has_status_prefix() {
        let encoded = Response::Ok(b"53217".to_vec()).encode();
        assert_eq!(encoded, b"\x0053217");
        assert_eq!(
            Response::decode(&encoded).unwrap(),
            Response::Ok(b"53217".to_vec())
        );
    }

    #[test]
    fn error_response_carries_kind_and_message() {
        let response = Response::Err(RemoteError::lookup("no adapter on port 9"));
        let decoded = Response::decode(&response.encode()).unwrap();
        let err = decoded.into_result().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lookup);
        assert_eq!(err.message, "no adapter on port 9");
        assert_eq!(err.to_string(), "lookup error: no adapter on port 9");
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(Response::decode(b"\x07").is_err());
        assert!(Response::decode(b"").is_err());
        assert!(Response::decode(b"\x01\x63oops").is_err());
    }

    #[test]
    fn error_kind_codes_are_stable() {
        for kind in [
            ErrorKind::Lookup,
            ErrorKind::Protocol,
            ErrorKind::Transport,
            ErrorKind::Timeout,
            ErrorKind::Spawn,
            ErrorKind::Operation,
        ] {
            assert_eq!(ErrorKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ErrorKind::from_code(0), None);
    }
}
