//! Session error types.

use std::fmt;
use std::io;

/// Errors surfaced by the session layer.
///
/// Unmatched or late responses are not errors (they are silently dropped),
/// and gated capabilities return empty defaults. What reaches callers is
/// transport failure, a per-request protocol error, handshake failure, use
/// after disposal, or a caller bug.
#[derive(Debug)]
pub enum SessionError {
    /// Transport-level I/O failure.
    Io(io::Error),
    /// The server answered one request with an error; only that request's
    /// caller sees this.
    Protocol {
        /// JSON-RPC error code.
        code: i64,
        /// Server-provided message.
        message: String,
    },
    /// The `initialize` exchange failed; the session is unusable.
    HandshakeFailed(String),
    /// The session was disposed; no further traffic is possible.
    Disposed,
    /// An operation was invoked before its prerequisite setup; a caller bug.
    Precondition(&'static str),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Io(err) => write!(f, "transport error: {err}"),
            SessionError::Protocol { code, message } => {
                write!(f, "server error {code}: {message}")
            }
            SessionError::HandshakeFailed(reason) => {
                write!(f, "initialize handshake failed: {reason}")
            }
            SessionError::Disposed => write!(f, "session has been disposed"),
            SessionError::Precondition(what) => {
                write!(f, "precondition not met: {what}")
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SessionError {
    fn from(err: io::Error) -> Self {
        SessionError::Io(err)
    }
}
