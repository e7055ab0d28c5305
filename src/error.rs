//! Error types for the WebSocket server

use std::fmt;
use std::io;

/// Result type alias for WebSocket operations
pub type Result<T> = std::result::Result<T, Error>;

/// WebSocket error types
#[derive(Debug)]
pub enum Error {
    /// I/O error from the underlying socket
    Io(io::Error),
    /// Invalid HTTP request
    InvalidHttp(&'static str),
    /// HTTP head exceeded the configured maximum size
    HeaderTooLarge,
    /// Upgrade handshake failed
    HandshakeFailed(&'static str),
    /// Invalid WebSocket frame
    InvalidFrame(&'static str),
    /// Protocol violation
    Protocol(&'static str),
    /// Invalid UTF-8 in a text message
    InvalidUtf8,
    /// Message too large
    MessageTooLarge,
    /// Frame too large
    FrameTooLarge,
    /// Invalid close code
    InvalidCloseCode(u16),
    /// Connection closed
    ConnectionClosed,
    /// Connection reset by peer
    ConnectionReset,
    /// Would block (non-blocking I/O)
    WouldBlock,
    /// Write buffer full (backpressure)
    BufferFull,
}

impl Error {
    /// Close status code sent to the peer when this error fails a connection.
    pub fn close_code(&self) -> u16 {
        match self {
            Error::InvalidUtf8 => CloseReason::INVALID_PAYLOAD,
            Error::MessageTooLarge | Error::FrameTooLarge => CloseReason::TOO_BIG,
            _ => CloseReason::PROTOCOL_ERROR,
        }
    }
}

/// Close frame reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Close status code
    pub code: u16,
    /// Optional reason string
    pub reason: String,
}

impl CloseReason {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
    /// Going away (e.g., server shutdown)
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Unsupported data
    pub const UNSUPPORTED: u16 = 1003;
    /// Invalid frame payload
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// Policy violation
    pub const POLICY: u16 = 1008;
    /// Message too big
    pub const TOO_BIG: u16 = 1009;
    /// Internal server error
    pub const INTERNAL: u16 = 1011;

    /// Create a new close reason
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Check if the close code is valid per RFC 6455
    pub fn is_valid_code(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::InvalidHttp(msg) => write!(f, "Invalid HTTP: {}", msg),
            Error::HeaderTooLarge => write!(f, "HTTP head too large"),
            Error::HandshakeFailed(msg) => write!(f, "Handshake failed: {}", msg),
            Error::InvalidFrame(msg) => write!(f, "Invalid frame: {}", msg),
            Error::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Error::InvalidUtf8 => write!(f, "Invalid UTF-8 in text message"),
            Error::MessageTooLarge => write!(f, "Message too large"),
            Error::FrameTooLarge => write!(f, "Frame too large"),
            Error::InvalidCloseCode(code) => write!(f, "Invalid close code: {}", code),
            Error::ConnectionClosed => write!(f, "Connection closed"),
            Error::ConnectionReset => write!(f, "Connection reset by peer"),
            Error::WouldBlock => write!(f, "Would block"),
            Error::BufferFull => write!(f, "Write buffer full"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock => Error::WouldBlock,
            io::ErrorKind::ConnectionReset => Error::ConnectionReset,
            io::ErrorKind::BrokenPipe => Error::ConnectionClosed,
            io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
            _ => Error::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_codes() {
        assert!(CloseReason::is_valid_code(1000));
        assert!(CloseReason::is_valid_code(1002));
        assert!(CloseReason::is_valid_code(3000));
        assert!(CloseReason::is_valid_code(4999));
        assert!(!CloseReason::is_valid_code(1004));
        assert!(!CloseReason::is_valid_code(1006));
        assert!(!CloseReason::is_valid_code(2999));
        assert!(!CloseReason::is_valid_code(5000));
    }

    #[test]
    fn test_error_close_code_mapping() {
        assert_eq!(Error::InvalidUtf8.close_code(), 1007);
        assert_eq!(Error::MessageTooLarge.close_code(), 1009);
        assert_eq!(Error::FrameTooLarge.close_code(), 1009);
        assert_eq!(Error::Protocol("bad rsv").close_code(), 1002);
        assert_eq!(Error::InvalidFrame("bad opcode").close_code(), 1002);
    }

    #[test]
    fn test_io_error_conversion() {
        let e: Error = io::Error::new(io::ErrorKind::WouldBlock, "").into();
        assert!(matches!(e, Error::WouldBlock));

        let e: Error = io::Error::new(io::ErrorKind::ConnectionReset, "").into();
        assert!(matches!(e, Error::ConnectionReset));

        let e: Error = io::Error::new(io::ErrorKind::UnexpectedEof, "").into();
        assert!(matches!(e, Error::ConnectionClosed));
    }
}
