//! Crate-wide error types for the handshake, framing, and relay layers.

use std::{error::Error as StdError, fmt, io};

/// Numeric codes surfaced on the command channel as `Error: <n> <msg>` and
/// via the `error` observer event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProtocolErrorCode {
    /// Client's major version is older than this server supports.
    OldProtocol,
    /// Client's handshake line was recognisably malformed.
    BadProtocol,
    /// Server replied with, or client sent, an unrecognised handshake line.
    Unknown,
}

impl ProtocolErrorCode {
    /// Numeric code matching the handshake's error table.
    pub fn code(self) -> u16 {
        match self {
            ProtocolErrorCode::OldProtocol => 100,
            ProtocolErrorCode::BadProtocol => 101,
            ProtocolErrorCode::Unknown => 102,
        }
    }
}

impl fmt::Display for ProtocolErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ProtocolErrorCode::OldProtocol => "old protocol",
            ProtocolErrorCode::BadProtocol => "bad protocol",
            ProtocolErrorCode::Unknown => "unknown protocol",
        };
        write!(f, "{} ({})", msg, self.code())
    }
}

/// Errors that can occur while decoding a frame from either codec.
#[derive(Debug)]
pub enum CodecError {
    /// A v1 frame declared a zero-length channel name or body.
    EmptyField,
    /// Length-prefixed data that could not be parsed once enough bytes had
    /// arrived.
    Malformed,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::EmptyField => write!(f, "frame declared an empty channel name or body"),
            CodecError::Malformed => write!(f, "frame could not be parsed"),
        }
    }
}

impl StdError for CodecError {}

/// Errors surfaced while running the source or ingest handshake and
/// subsequent session.
#[derive(Debug)]
pub enum SessionError {
    /// A handshake-line or command-channel violation, carrying its code.
    Protocol(ProtocolErrorCode),
    /// A frame could not be decoded.
    Codec(CodecError),
    /// The peer's challenge response did not match.
    AuthFailed,
    /// The peer sent more header bytes than the configured limit without
    /// completing the header.
    HeaderTooLong,
    /// Underlying I/O failure; the description is captured so the error
    /// survives past the point the originating `io::Error` is dropped.
    Io(String),
    /// JSON (de)serialization issue for the relay header or v2 music-info.
    Json(serde_json::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Protocol(c) => write!(f, "protocol violation: {}", c),
            SessionError::Codec(e) => write!(f, "framing error: {}", e),
            SessionError::AuthFailed => write!(f, "authentication failed"),
            SessionError::HeaderTooLong => write!(f, "header exceeded size limit"),
            SessionError::Io(e) => write!(f, "I/O failure: {}", e),
            SessionError::Json(e) => write!(f, "JSON (de)serialization issue: {}", e),
        }
    }
}

impl StdError for SessionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SessionError::Json(e) => Some(e),
            SessionError::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SessionError {
    fn from(e: io::Error) -> Self {
        SessionError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Json(e)
    }
}

impl From<CodecError> for SessionError {
    fn from(e: CodecError) -> Self {
        SessionError::Codec(e)
    }
}

/// Convenience alias for session-level results.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Errors that can occur while accepting or serving a relay connection.
#[derive(Debug)]
pub enum RelayError {
    /// The request/response JSON header exceeded the configured limit
    /// without the `\r\n\r\n` sentinel being found.
    HeaderTooLong,
    /// The peer closed the connection before completing the header. Distinct
    /// from [`HeaderTooLong`][RelayError::HeaderTooLong]: a disconnect mid-handshake
    /// is not a "bad request" the other side is still around to receive.
    ConnectionClosed,
    /// The header could not be parsed as the expected JSON shape.
    Json(serde_json::Error),
    /// The requested channel name has no matching resource.
    NotFound,
    /// Underlying I/O failure.
    Io(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::HeaderTooLong => write!(f, "relay header exceeded size limit"),
            RelayError::ConnectionClosed => write!(f, "peer closed the connection before completing the header"),
            RelayError::Json(e) => write!(f, "malformed relay header: {}", e),
            RelayError::NotFound => write!(f, "requested resource not found"),
            RelayError::Io(e) => write!(f, "I/O failure: {}", e),
        }
    }
}

impl StdError for RelayError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            RelayError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RelayError {
    fn from(e: io::Error) -> Self {
        RelayError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Json(e)
    }
}

/// Convenience alias for relay-level results.
pub type RelayResult<T> = std::result::Result<T, RelayError>;
