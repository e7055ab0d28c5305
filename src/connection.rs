//! Per-connection protocol engine
//!
//! A [`Connection`] owns exactly one parser at a time, chosen by its phase:
//! the HTTP accumulator while awaiting the upgrade, the frame decoder and
//! message assembler once established. The driver feeds it readable bytes
//! and drains its write buffer; the engine itself never touches a socket.
//!
//! Phases move strictly forward:
//!
//! ```text
//! AwaitingHandshake --accept--> Established --close/error--> Closing --> Closed
//!         \------reject-------------------------------------^
//! ```

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::{CloseReason, Error, Result};
use crate::frame::{encode_frame, FrameDecoder, OpCode};
use crate::handshake::{self, HandshakeOutcome};
use crate::http::{HttpAccumulator, HttpHeader};
use crate::protocol::{Message, MessageAssembler};
use crate::Config;

/// Connection lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingHandshake,
    Established,
    Closing,
    Closed,
}

/// Phase-tagged parser state. Exactly one parser exists per phase, so a
/// handshake buffer can never be misread as frame state or vice versa.
enum ConnState {
    AwaitingHandshake(HttpAccumulator),
    Established {
        decoder: FrameDecoder,
        assembler: MessageAssembler,
    },
    Closing,
    Closed,
}

/// A single WebSocket connection's protocol engine.
pub struct Connection {
    state: ConnState,
    /// Frame bytes not yet consumed by the decoder.
    read_buf: BytesMut,
    /// Outbound bytes not yet taken by the driver.
    write_buf: BytesMut,
    config: Config,
}

impl Connection {
    /// Create a connection in the `AwaitingHandshake` phase.
    pub fn new(config: Config) -> Self {
        Self {
            state: ConnState::AwaitingHandshake(HttpAccumulator::new(config.max_header_size)),
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
            config,
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        match self.state {
            ConnState::AwaitingHandshake(_) => Phase::AwaitingHandshake,
            ConnState::Established { .. } => Phase::Established,
            ConnState::Closing => Phase::Closing,
            ConnState::Closed => Phase::Closed,
        }
    }

    pub fn is_established(&self) -> bool {
        self.phase() == Phase::Established
    }

    pub fn is_closed(&self) -> bool {
        self.phase() == Phase::Closed
    }

    /// Deliver freshly read bytes to the current phase's parser.
    ///
    /// Returns the messages completed by these bytes. On a protocol error
    /// the appropriate farewell (501/400 or a Close frame) has already been
    /// queued and the connection has moved to `Closing`; the driver should
    /// log the error, flush the remaining output and shut the socket down.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Message>> {
        match self.phase() {
            Phase::AwaitingHandshake => self.feed_handshake(bytes),
            Phase::Established => {
                self.read_buf.extend_from_slice(bytes);
                self.process_frames()
            }
            // Closing drains and discards; Closed ignores.
            Phase::Closing | Phase::Closed => Ok(Vec::new()),
        }
    }

    /// The peer closed its end; no more bytes will arrive.
    pub fn on_eof(&mut self) {
        self.state = ConnState::Closed;
    }

    /// Queue an outbound message. Only valid while established.
    pub fn send(&mut self, msg: &Message) -> Result<()> {
        if !self.is_established() {
            return Err(Error::ConnectionClosed);
        }

        match msg {
            Message::Text(b) => encode_frame(&mut self.write_buf, OpCode::Text, b, true),
            Message::Binary(b) => encode_frame(&mut self.write_buf, OpCode::Binary, b, true),
            Message::Ping(b) => encode_frame(&mut self.write_buf, OpCode::Ping, b, true),
            Message::Pong(b) => encode_frame(&mut self.write_buf, OpCode::Pong, b, true),
            Message::Close(reason) => {
                self.queue_close(reason.as_ref());
                self.state = ConnState::Closing;
            }
        }

        if self.write_buf.len() > self.config.max_backpressure {
            return Err(Error::BufferFull);
        }
        Ok(())
    }

    /// Take pending outbound bytes, if any. The driver writes these to the
    /// socket; anything it cannot send it hands back via [`Self::unsend`].
    pub fn take_output(&mut self) -> Option<Bytes> {
        if self.write_buf.is_empty() {
            None
        } else {
            Some(self.write_buf.split().freeze())
        }
    }

    /// Return the unsent tail of a previous [`Self::take_output`] so it is
    /// retried on the next write-ready signal.
    pub fn unsend(&mut self, tail: &[u8]) {
        // Pending output must go out before anything queued later.
        let mut buf = BytesMut::with_capacity(tail.len() + self.write_buf.len());
        buf.extend_from_slice(tail);
        buf.extend_from_slice(&self.write_buf);
        self.write_buf = buf;
    }

    pub fn has_output(&self) -> bool {
        !self.write_buf.is_empty()
    }

    /// True once the closing handshake is done and all output has been
    /// taken: the driver should now shut the socket down.
    pub fn wants_close(&self) -> bool {
        matches!(self.state, ConnState::Closing) && self.write_buf.is_empty()
    }

    fn feed_handshake(&mut self, bytes: &[u8]) -> Result<Vec<Message>> {
        let step = match &mut self.state {
            ConnState::AwaitingHandshake(acc) => match acc.feed(bytes) {
                Err(e) => Err(e),
                Ok(()) if !acc.is_complete() => return Ok(Vec::new()),
                Ok(()) => {
                    let header = HttpHeader::parse(acc.head());
                    Ok((handshake::respond(&header), acc.take_tail()))
                }
            },
            // feed() only dispatches here while awaiting the handshake.
            _ => return Ok(Vec::new()),
        };

        match step {
            Ok((HandshakeOutcome::Accepted { response }, tail)) => {
                self.write_buf.extend_from_slice(&response);
                self.read_buf = tail;
                self.state = ConnState::Established {
                    decoder: FrameDecoder::new(self.config.max_frame_size, true),
                    assembler: MessageAssembler::new(self.config.max_message_size),
                };
                // Frame bytes may have arrived in the same chunk as the head.
                self.process_frames()
            }
            Ok((HandshakeOutcome::Rejected { response, reason }, _)) => {
                self.write_buf.extend_from_slice(&response);
                self.state = ConnState::Closing;
                Err(Error::HandshakeFailed(reason))
            }
            Err(e) => {
                // Oversized head; answer 400 and close.
                self.write_buf
                    .extend_from_slice(&handshake::build_bad_request());
                self.state = ConnState::Closing;
                Err(e)
            }
        }
    }

    /// Run the decoder over buffered frame bytes, dispatching completed
    /// frames until input runs dry, the connection leaves `Established`, or
    /// a protocol error fails it.
    fn process_frames(&mut self) -> Result<Vec<Message>> {
        let mut messages = Vec::new();

        loop {
            let step = match &mut self.state {
                ConnState::Established { decoder, assembler } => {
                    match decoder.parse(&mut self.read_buf) {
                        Ok(Some(frame)) => match assembler.handle_frame(frame) {
                            Ok(Some(msg)) => Ok(Some(msg)),
                            Ok(None) => continue,
                            Err(e) => Err(e),
                        },
                        Ok(None) => Ok(None),
                        Err(e) => Err(e),
                    }
                }
                _ => Ok(None),
            };

            match step {
                Ok(Some(Message::Ping(data))) => {
                    encode_frame(&mut self.write_buf, OpCode::Pong, &data, true);
                    messages.push(Message::Ping(data));
                }
                Ok(Some(Message::Close(reason))) => {
                    debug!(code = reason.as_ref().map(|r| r.code), "peer sent close");
                    self.queue_close(reason.as_ref());
                    self.state = ConnState::Closing;
                    self.read_buf.clear();
                    messages.push(Message::Close(reason));
                    break;
                }
                Ok(Some(msg)) => messages.push(msg),
                Ok(None) => break,
                Err(e) => {
                    self.fail(&e);
                    return Err(e);
                }
            }
        }

        Ok(messages)
    }

    /// Queue a Close frame echoing the peer's status code, or an empty one.
    fn queue_close(&mut self, reason: Option<&CloseReason>) {
        match reason {
            Some(r) => {
                let mut payload = BytesMut::with_capacity(2 + r.reason.len());
                payload.extend_from_slice(&r.code.to_be_bytes());
                payload.extend_from_slice(r.reason.as_bytes());
                encode_frame(&mut self.write_buf, OpCode::Close, &payload, true);
            }
            None => encode_frame(&mut self.write_buf, OpCode::Close, &[], true),
        }
    }

    /// Fail the connection: queue a Close carrying the error's status code
    /// and stop reading.
    fn fail(&mut self, err: &Error) {
        if self.is_established() {
            let reason = CloseReason::new(err.close_code(), "");
            self.queue_close(Some(&reason));
        }
        self.state = ConnState::Closing;
        self.read_buf.clear();
    }
}
