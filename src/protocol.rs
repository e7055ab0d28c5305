//! Message assembly and control-frame handling
//!
//! Frames become messages here: data frames are delivered directly or
//! reassembled across continuations, text payloads are UTF-8 validated, and
//! close payloads are parsed into a status code and reason. Control frames
//! may interleave with an open fragmented message without disturbing it.

use bytes::{Bytes, BytesMut};

use crate::error::{CloseReason, Error, Result};
use crate::frame::{Frame, OpCode};
use crate::utf8::{validate_utf8, validate_utf8_prefix};

/// A complete WebSocket message, possibly assembled from fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Text message (UTF-8 validated, stored as bytes for zero-copy delivery)
    Text(Bytes),
    /// Binary message
    Binary(Bytes),
    /// Ping message
    Ping(Bytes),
    /// Pong message
    Pong(Bytes),
    /// Close message
    Close(Option<CloseReason>),
}

impl Message {
    /// Create a text message
    #[inline]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(Bytes::from(s.into()))
    }

    /// Create a binary message
    #[inline]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Message::Binary(data.into())
    }

    /// Check if this is a close message
    #[inline]
    pub fn is_close(&self) -> bool {
        matches!(self, Message::Close(_))
    }

    /// Check if this is a control message
    #[inline]
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Message::Ping(_) | Message::Pong(_) | Message::Close(_)
        )
    }

    /// Get the message as text (None for non-text messages)
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            // Text payloads are validated during assembly.
            Message::Text(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Get the message payload bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(b) | Message::Binary(b) | Message::Ping(b) | Message::Pong(b) => b,
            Message::Close(_) => &[],
        }
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::Text(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::Text(Bytes::from(s))
    }
}

impl From<Vec<u8>> for Message {
    fn from(v: Vec<u8>) -> Self {
        Message::Binary(Bytes::from(v))
    }
}

/// Assembles decoded frames into messages.
///
/// Holds the buffer and opcode of the message currently being fragmented;
/// one instance lives per connection for its Established phase.
#[derive(Debug)]
pub struct MessageAssembler {
    fragment_opcode: Option<OpCode>,
    fragment_buf: BytesMut,
    max_message_size: usize,
}

impl MessageAssembler {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            fragment_opcode: None,
            fragment_buf: BytesMut::new(),
            max_message_size,
        }
    }

    /// Process one complete frame.
    ///
    /// Returns a message when the frame completes one (FIN data frame, final
    /// continuation, or any control frame) and `None` mid-fragmentation.
    pub fn handle_frame(&mut self, frame: Frame) -> Result<Option<Message>> {
        match frame.header.opcode {
            OpCode::Continuation => self.handle_continuation(frame),
            OpCode::Text => self.handle_data(OpCode::Text, frame),
            OpCode::Binary => self.handle_data(OpCode::Binary, frame),
            OpCode::Close => Ok(Some(Message::Close(parse_close_payload(&frame.payload)?))),
            OpCode::Ping => Ok(Some(Message::Ping(frame.payload))),
            OpCode::Pong => Ok(Some(Message::Pong(frame.payload))),
        }
    }

    fn handle_data(&mut self, opcode: OpCode, frame: Frame) -> Result<Option<Message>> {
        if self.fragment_opcode.is_some() {
            return Err(Error::Protocol("data frame inside fragmented message"));
        }

        if frame.header.fin {
            if opcode == OpCode::Text && !validate_utf8(&frame.payload) {
                return Err(Error::InvalidUtf8);
            }
            return Ok(Some(match opcode {
                OpCode::Text => Message::Text(frame.payload),
                _ => Message::Binary(frame.payload),
            }));
        }

        // First fragment of a new message.
        if frame.payload.len() > self.max_message_size {
            return Err(Error::MessageTooLarge);
        }
        if opcode == OpCode::Text && !validate_utf8_prefix(&frame.payload) {
            return Err(Error::InvalidUtf8);
        }
        self.fragment_opcode = Some(opcode);
        self.fragment_buf.clear();
        self.fragment_buf.extend_from_slice(&frame.payload);
        Ok(None)
    }

    fn handle_continuation(&mut self, frame: Frame) -> Result<Option<Message>> {
        let opcode = self
            .fragment_opcode
            .ok_or(Error::Protocol("continuation without fragmented message"))?;

        if self.fragment_buf.len() + frame.payload.len() > self.max_message_size {
            return Err(Error::MessageTooLarge);
        }
        self.fragment_buf.extend_from_slice(&frame.payload);

        if !frame.header.fin {
            if opcode == OpCode::Text && !validate_utf8_prefix(&self.fragment_buf) {
                return Err(Error::InvalidUtf8);
            }
            return Ok(None);
        }

        self.fragment_opcode = None;
        let data = self.fragment_buf.split().freeze();
        match opcode {
            OpCode::Text => {
                if !validate_utf8(&data) {
                    return Err(Error::InvalidUtf8);
                }
                Ok(Some(Message::Text(data)))
            }
            _ => Ok(Some(Message::Binary(data))),
        }
    }
}

/// Parse a close frame payload.
///
/// Empty means no status; a single byte is malformed; two or more bytes are
/// a big-endian status code followed by a UTF-8 reason.
pub fn parse_close_payload(payload: &[u8]) -> Result<Option<CloseReason>> {
    match payload.len() {
        0 => Ok(None),
        1 => Err(Error::Protocol("close payload of one byte")),
        _ => {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            if !CloseReason::is_valid_code(code) {
                return Err(Error::InvalidCloseCode(code));
            }
            let reason = &payload[2..];
            if !validate_utf8(reason) {
                return Err(Error::InvalidUtf8);
            }
            Ok(Some(CloseReason::new(
                code,
                String::from_utf8_lossy(reason).into_owned(),
            )))
        }
    }
}
