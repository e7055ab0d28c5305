//! Tokio driver for WebSocket connections
//!
//! Owns the listening socket and runs one task per connection: read a chunk,
//! feed the protocol engine, hand completed messages to the handler, flush
//! whatever the engine queued. Timeouts ride the read: a connection that
//! never finishes its handshake or goes silent past the idle limit is
//! dropped without a closing handshake.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::Message;
use crate::Config;

/// Read chunk size per tick
const RECV_BUFFER_SIZE: usize = 4096;

/// Per-message callback: inspect the message, queue replies on the
/// connection.
pub trait MessageHandler: Fn(&mut Connection, &Message) -> Result<()> + Send + Sync {}
impl<F: Fn(&mut Connection, &Message) -> Result<()> + Send + Sync> MessageHandler for F {}

/// A WebSocket server bound to a local address.
pub struct Server {
    listener: TcpListener,
    config: Config,
}

impl Server {
    /// Create the listening socket and bind it.
    ///
    /// Errors here (bad address, socket, bind or listen failure) are fatal;
    /// the caller logs once and exits non-zero.
    pub fn bind(host: &str, port: u16, config: Config) -> Result<Self> {
        let ip: IpAddr = host.parse().map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid host address: {}", host),
            ))
        })?;
        let addr = SocketAddr::new(ip, port);

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(SockProtocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(config.max_connections as i32)?;

        let listener = TcpListener::from_std(socket.into())?;
        Ok(Self { listener, config })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, spawning a task per socket.
    ///
    /// The handler runs for every decoded message, including Ping/Pong and
    /// Close (which the engine has already answered); a typical handler
    /// only acts on Text and Binary.
    pub async fn run<F>(self, handler: F) -> Result<()>
    where
        F: MessageHandler + 'static,
    {
        let handler = Arc::new(handler);
        let active = Arc::new(AtomicUsize::new(0));

        info!(addr = %self.listener.local_addr()?, "listening");

        loop {
            let (stream, peer) = self.listener.accept().await?;

            if active.load(Ordering::Acquire) >= self.config.max_connections {
                warn!(%peer, "connection limit reached, dropping");
                continue;
            }
            active.fetch_add(1, Ordering::AcqRel);

            // Low-latency echo traffic; don't wait for full segments.
            stream.set_nodelay(true).ok();

            let config = self.config.clone();
            let handler = Arc::clone(&handler);
            let active = Arc::clone(&active);

            tokio::spawn(async move {
                debug!(%peer, "connection accepted");
                match drive_connection(stream, config, handler).await {
                    Ok(()) => debug!(%peer, "connection closed"),
                    Err(e) => debug!(%peer, error = %e, "connection error"),
                }
                active.fetch_sub(1, Ordering::AcqRel);
            });
        }
    }
}

/// Read/feed/write rounds for one connection until it closes.
async fn drive_connection<F>(
    mut stream: TcpStream,
    config: Config,
    handler: Arc<F>,
) -> Result<()>
where
    F: MessageHandler + 'static,
{
    let mut conn = Connection::new(config.clone());
    let mut buf = BytesMut::with_capacity(RECV_BUFFER_SIZE);

    let handshake_deadline = Instant::now() + Duration::from_secs(config.handshake_timeout);
    let ping_after = Duration::from_secs((config.idle_timeout / 2).max(1));
    let drop_after = Duration::from_secs(config.idle_timeout);
    let mut last_read = Instant::now();
    let mut ping_sent = false;

    loop {
        // Flush everything the engine queued before reading again.
        while let Some(out) = conn.take_output() {
            stream.write_all(&out).await?;
        }
        stream.flush().await?;

        if conn.wants_close() {
            stream.shutdown().await.ok();
            return Ok(());
        }
        if conn.is_closed() {
            return Ok(());
        }

        let wait = if !conn.is_established() {
            handshake_deadline.saturating_duration_since(Instant::now())
        } else if config.idle_timeout == 0 {
            Duration::from_secs(3600)
        } else if !ping_sent {
            (last_read + ping_after).saturating_duration_since(Instant::now())
        } else {
            (last_read + drop_after).saturating_duration_since(Instant::now())
        };

        match timeout(wait, stream.read_buf(&mut buf)).await {
            // Timer fired before any bytes arrived.
            Err(_) => {
                if !conn.is_established() {
                    debug!("handshake timed out");
                    return Ok(());
                }
                if config.idle_timeout == 0 {
                    continue;
                }
                if !ping_sent {
                    conn.send(&Message::Ping(Bytes::new()))?;
                    ping_sent = true;
                    continue;
                }
                // No pong, no data. Drop without a closing handshake.
                debug!("idle timeout");
                return Ok(());
            }
            Ok(Ok(0)) => {
                conn.on_eof();
                return Ok(());
            }
            Ok(Ok(_)) => {
                last_read = Instant::now();
                ping_sent = false;

                let chunk = buf.split();
                match conn.feed(&chunk) {
                    Ok(messages) => {
                        for msg in &messages {
                            (*handler)(&mut conn, msg)?;
                        }
                    }
                    // The engine has queued its farewell; the next loop
                    // iteration flushes it and shuts down.
                    Err(e) => debug!(error = %e, "protocol error"),
                }
            }
            Ok(Err(e)) => {
                conn.on_eof();
                return Err(e.into());
            }
        }
    }
}

/// Echo handler: send every Text and Binary message straight back.
pub fn echo_handler(conn: &mut Connection, msg: &Message) -> Result<()> {
    match msg {
        Message::Text(_) | Message::Binary(_) => conn.send(msg),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::apply_mask;
    use bytes::BufMut;
    use tokio::io::AsyncReadExt;

    const UPGRADE: &[u8] = b"GET /chat HTTP/1.1\r\n\
        Host: server.example.com\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\
        \r\n";

    fn client_frame(opcode: crate::OpCode, payload: &[u8]) -> Vec<u8> {
        let mask = [0x37, 0xfa, 0x21, 0x3d];
        let mut buf = BytesMut::new();
        buf.put_u8(0x80 | opcode as u8);
        buf.put_u8(0x80 | payload.len() as u8);
        buf.put_slice(&mask);
        let start = buf.len();
        buf.put_slice(payload);
        apply_mask(&mut buf[start..], mask);
        buf.to_vec()
    }

    async fn read_exact_n(stream: &mut TcpStream, n: usize) -> Vec<u8> {
        let mut out = vec![0u8; n];
        stream.read_exact(&mut out).await.unwrap();
        out
    }

    async fn read_until_blank_line(stream: &mut TcpStream) -> Vec<u8> {
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        while !out.ends_with(b"\r\n\r\n") {
            stream.read_exact(&mut byte).await.unwrap();
            out.push(byte[0]);
        }
        out
    }

    fn spawn_echo_server() -> SocketAddr {
        let server = Server::bind("127.0.0.1", 0, Config::default()).unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run(echo_handler).await;
        });
        addr
    }

    #[tokio::test]
    async fn test_end_to_end_echo() {
        let addr = spawn_echo_server();
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(UPGRADE).await.unwrap();
        let response = read_until_blank_line(&mut stream).await;
        assert!(response.starts_with(b"HTTP/1.1 101 Switching Protocols"));
        assert!(String::from_utf8_lossy(&response)
            .contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));

        // Masked text frame in, unmasked echo out.
        stream
            .write_all(&client_frame(crate::OpCode::Text, b"Hello"))
            .await
            .unwrap();
        let echo = read_exact_n(&mut stream, 7).await;
        assert_eq!(&echo, &[0x81, 0x05, b'H', b'e', b'l', b'l', b'o']);

        // Ping in, pong out.
        stream
            .write_all(&client_frame(crate::OpCode::Ping, b"abc"))
            .await
            .unwrap();
        let pong = read_exact_n(&mut stream, 5).await;
        assert_eq!(&pong, &[0x8A, 0x03, b'a', b'b', b'c']);

        // Close 1000 "bye" in, matching close out, then EOF.
        let mut close_payload = vec![0x03, 0xE8];
        close_payload.extend_from_slice(b"bye");
        stream
            .write_all(&client_frame(crate::OpCode::Close, &close_payload))
            .await
            .unwrap();
        let close = read_exact_n(&mut stream, 7).await;
        assert_eq!(&close, &[0x88, 0x05, 0x03, 0xE8, b'b', b'y', b'e']);

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_reject() {
        let addr = spawn_echo_server();
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream
            .write_all(b"POST / HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        assert!(response.starts_with(b"HTTP/1.1 501 Not Implemented"));
    }

    #[tokio::test]
    async fn test_bind_bad_host_fails() {
        assert!(Server::bind("not-an-address", 0, Config::default()).is_err());
    }
}
