//! # ripple-ws: a minimal WebSocket server
//!
//! Accepts TCP connections, performs the RFC 6455 HTTP upgrade handshake and
//! then exchanges framed messages with each peer. The protocol engine is
//! sans-I/O — a [`Connection`] consumes byte chunks and produces byte chunks
//! plus decoded [`Message`]s — and the [`server`] module drives it with
//! tokio.
//!
//! ## Example
//!
//! ```ignore
//! use ripple_ws::{Config, Message, Server};
//!
//! let server = Server::bind("127.0.0.1", 8080, Config::default())?;
//! server
//!     .run(|conn, msg| {
//!         if let Message::Text(_) | Message::Binary(_) = msg {
//!             conn.send(msg)?;
//!         }
//!         Ok(())
//!     })
//!     .await?;
//! ```

pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod http;
pub mod mask;
pub mod protocol;
pub mod server;
pub mod utf8;

pub use connection::{Connection, Phase};
pub use error::{CloseReason, Error, Result};
pub use frame::{Frame, FrameDecoder, OpCode};
pub use protocol::Message;
pub use server::Server;

/// WebSocket GUID for the handshake (RFC 6455 §1.3)
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Maximum WebSocket frame header size (2 + 8 + 4 = 14 bytes)
pub const MAX_FRAME_HEADER_SIZE: usize = 14;

/// Largest payload carried in the base 2-byte header
pub const SMALL_PAYLOAD_LIMIT: usize = 125;

/// Largest payload carried with a 16-bit extended length
pub const MEDIUM_PAYLOAD_LIMIT: usize = 65535;

/// Configuration for the server and its connections
///
/// # Example
///
/// ```
/// use ripple_ws::Config;
///
/// let config = Config::builder()
///     .max_message_size(1024 * 1024)
///     .max_connections(64)
///     .idle_timeout(30)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum assembled message size in bytes (default: 16 MiB)
    pub max_message_size: usize,
    /// Maximum single-frame payload size in bytes (default: 16 MiB)
    pub max_frame_size: usize,
    /// Maximum HTTP head size in bytes (default: 8 KiB)
    pub max_header_size: usize,
    /// Maximum concurrent connections; further sockets are accepted and
    /// immediately dropped (default: 10)
    pub max_connections: usize,
    /// Seconds a connection may sit in `AwaitingHandshake` (default: 10)
    pub handshake_timeout: u64,
    /// Seconds of silence before an established connection is dropped; a
    /// Ping goes out at half this (default: 60, 0 = disabled)
    pub idle_timeout: u64,
    /// Maximum buffered outbound bytes before the connection is dropped
    /// (default: 1 MiB)
    pub max_backpressure: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_message_size: 16 * 1024 * 1024,
            max_frame_size: 16 * 1024 * 1024,
            max_header_size: 8 * 1024,
            max_connections: 10,
            handshake_timeout: 10,
            idle_timeout: 60,
            max_backpressure: 1024 * 1024,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for [`Config`]
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the maximum assembled message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set the maximum single-frame payload size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the maximum HTTP head size
    pub fn max_header_size(mut self, size: usize) -> Self {
        self.config.max_header_size = size;
        self
    }

    /// Set the connection cap
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the handshake timeout in seconds
    pub fn handshake_timeout(mut self, seconds: u64) -> Self {
        self.config.handshake_timeout = seconds;
        self
    }

    /// Set the idle timeout in seconds (0 disables it)
    pub fn idle_timeout(mut self, seconds: u64) -> Self {
        self.config.idle_timeout = seconds;
        self
    }

    /// Set the outbound buffer cap
    pub fn max_backpressure(mut self, bytes: usize) -> Self {
        self.config.max_backpressure = bytes;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        self.config
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::connection::{Connection, Phase};
    pub use crate::error::{CloseReason, Error, Result};
    pub use crate::frame::OpCode;
    pub use crate::protocol::Message;
    pub use crate::server::Server;
    pub use crate::Config;
}
