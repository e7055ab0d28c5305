//! Incremental HTTP request head parsing
//!
//! The upgrade request arrives over a non-blocking socket, so any read may
//! deliver a partial head. [`HttpAccumulator`] buffers bytes until the
//! `CRLF CRLF` terminator is seen (which may straddle chunk boundaries) and
//! [`HttpHeader`] parses the completed head into a request line and a field
//! map. This is just enough HTTP to recognize a WebSocket upgrade; it is not
//! a general HTTP parser.

use std::collections::HashMap;

use bytes::{Buf, BytesMut};

use crate::error::{Error, Result};

const TERMINATOR: &[u8; 4] = b"\r\n\r\n";

/// Buffers request bytes until the head terminator is observed.
#[derive(Debug)]
pub struct HttpAccumulator {
    buf: BytesMut,
    /// Offset past `CRLF CRLF`; 0 until the terminator has been seen.
    head_len: usize,
    /// Resume point for the terminator scan.
    scanned: usize,
    max_size: usize,
}

impl HttpAccumulator {
    pub fn new(max_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
            head_len: 0,
            scanned: 0,
            max_size,
        }
    }

    /// Append bytes and scan for the first `CRLF CRLF`.
    ///
    /// Errors with [`Error::HeaderTooLarge`] if the head grows past the
    /// configured maximum without terminating.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(bytes);

        if self.head_len == 0 {
            if let Some(pos) = self.buf[self.scanned..]
                .windows(TERMINATOR.len())
                .position(|w| w == TERMINATOR)
            {
                self.head_len = self.scanned + pos + TERMINATOR.len();
            } else {
                if self.buf.len() > self.max_size {
                    return Err(Error::HeaderTooLarge);
                }
                // The terminator may straddle the next chunk; back up so a
                // partial match at the end of this one is rescanned.
                self.scanned = self.buf.len().saturating_sub(TERMINATOR.len() - 1);
            }
        }

        Ok(())
    }

    /// Whether the full head has been received.
    pub fn is_complete(&self) -> bool {
        self.head_len > 0
    }

    /// The raw head, including the terminating blank line.
    ///
    /// Empty until [`is_complete`](Self::is_complete) returns true.
    pub fn head(&self) -> &[u8] {
        &self.buf[..self.head_len]
    }

    /// Total bytes buffered so far.
    pub fn total_read(&self) -> usize {
        self.buf.len()
    }

    /// Take the bytes received past the head: the start of the frame stream.
    pub fn take_tail(&mut self) -> BytesMut {
        self.buf.advance(self.head_len);
        self.head_len = 0;
        self.buf.split()
    }
}

/// Parsed view of an HTTP request head.
///
/// Parsing never fails outright: a malformed request line leaves the later
/// fields at their defaults, and callers check only the fields they need.
/// Field names are kept verbatim (no case folding); a repeated name keeps the
/// last value.
#[derive(Debug, Default)]
pub struct HttpHeader {
    pub method: String,
    pub target: String,
    pub protocol_name: String,
    pub version_major: u8,
    pub version_minor: u8,
    fields: HashMap<String, String>,
}

impl HttpHeader {
    /// Parse a raw request head.
    pub fn parse(head: &[u8]) -> Self {
        let mut header = HttpHeader::default();

        let mut lines = head.split(|&b| b == b'\n');

        if let Some(request_line) = lines.next() {
            header.parse_request_line(request_line);
        }

        for line in lines {
            let line = trim_ascii(line);
            if line.is_empty() {
                break;
            }
            let Some(colon) = line.iter().position(|&b| b == b':') else {
                continue;
            };
            let name = String::from_utf8_lossy(&line[..colon]).into_owned();
            let value = String::from_utf8_lossy(trim_ascii(&line[colon + 1..])).into_owned();
            header.fields.insert(name, value);
        }

        header
    }

    /// Tokens of the request line are separated by runs of whitespace
    /// (space, tab, CR or LF).
    fn parse_request_line(&mut self, line: &[u8]) {
        let mut tokens = line
            .split(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
            .filter(|t| !t.is_empty());

        let Some(method) = tokens.next() else { return };
        self.method = String::from_utf8_lossy(method).into_owned();

        let Some(target) = tokens.next() else { return };
        self.target = String::from_utf8_lossy(target).into_owned();

        let Some(proto) = tokens.next() else { return };
        let proto = String::from_utf8_lossy(proto).into_owned();
        let Some((name, version)) = proto.split_once('/') else {
            return;
        };
        self.protocol_name = name.to_string();

        let Some((major, minor)) = version.split_once('.') else {
            return;
        };
        self.version_major = major.parse().unwrap_or(0);
        self.version_minor = minor.parse().unwrap_or(0);
    }

    /// Look up a field by its exact (case-sensitive) name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t' | b'\r', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' ' | b'\t' | b'\r'] = bytes {
        bytes = rest;
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &[u8] = b"GET /chat HTTP/1.1\r\n\
        Host: server.example.com\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\
        \r\n";

    #[test]
    fn test_accumulate_single_chunk() {
        let mut acc = HttpAccumulator::new(8192);
        acc.feed(REQUEST).unwrap();
        assert!(acc.is_complete());
        assert_eq!(acc.head(), REQUEST);
        assert_eq!(acc.total_read(), REQUEST.len());
    }

    #[test]
    fn test_accumulate_byte_at_a_time() {
        let mut acc = HttpAccumulator::new(8192);
        for (i, byte) in REQUEST.iter().enumerate() {
            acc.feed(std::slice::from_ref(byte)).unwrap();
            // Complete exactly at the final byte of the terminator, not before.
            assert_eq!(acc.is_complete(), i == REQUEST.len() - 1);
        }
        assert_eq!(acc.head(), REQUEST);
    }

    #[test]
    fn test_terminator_straddles_chunks() {
        let mut acc = HttpAccumulator::new(8192);
        let (a, b) = REQUEST.split_at(REQUEST.len() - 2);
        acc.feed(a).unwrap();
        assert!(!acc.is_complete());
        acc.feed(b).unwrap();
        assert!(acc.is_complete());
        assert_eq!(acc.head(), REQUEST);
    }

    #[test]
    fn test_tail_preserved() {
        let mut acc = HttpAccumulator::new(8192);
        let mut data = REQUEST.to_vec();
        data.extend_from_slice(&[0x81, 0x80, 1, 2, 3, 4]);
        acc.feed(&data).unwrap();
        assert!(acc.is_complete());
        assert_eq!(acc.head().len(), REQUEST.len());
        assert_eq!(&acc.take_tail()[..], &[0x81, 0x80, 1, 2, 3, 4]);
    }

    #[test]
    fn test_oversized_head_rejected() {
        let mut acc = HttpAccumulator::new(64);
        let garbage = vec![b'a'; 65];
        assert!(matches!(acc.feed(&garbage), Err(Error::HeaderTooLarge)));
    }

    #[test]
    fn test_parse_request_line() {
        let header = HttpHeader::parse(REQUEST);
        assert_eq!(header.method, "GET");
        assert_eq!(header.target, "/chat");
        assert_eq!(header.protocol_name, "HTTP");
        assert_eq!(header.version_major, 1);
        assert_eq!(header.version_minor, 1);
    }

    #[test]
    fn test_fields_case_sensitive_last_wins() {
        let head = b"GET / HTTP/1.1\r\nX-Token: one\r\nX-Token: two\r\nx-token: lower\r\n\r\n";
        let header = HttpHeader::parse(head);
        assert_eq!(header.field("X-Token"), Some("two"));
        assert_eq!(header.field("x-token"), Some("lower"));
        assert_eq!(header.field("X-TOKEN"), None);
    }

    #[test]
    fn test_field_value_ows_trimmed() {
        let head = b"GET / HTTP/1.1\r\nHost:   example.com \t\r\n\r\n";
        let header = HttpHeader::parse(head);
        assert_eq!(header.field("Host"), Some("example.com"));
    }

    #[test]
    fn test_malformed_request_line_partial() {
        let header = HttpHeader::parse(b"GET\r\n\r\n");
        assert_eq!(header.method, "GET");
        assert_eq!(header.target, "");
        assert_eq!(header.protocol_name, "");
        assert_eq!(header.version_major, 0);

        let header = HttpHeader::parse(b"GET / FTP\r\n\r\n");
        assert_eq!(header.method, "GET");
        assert_eq!(header.target, "/");
        assert_eq!(header.protocol_name, "");
    }

    #[test]
    fn test_request_line_tab_separated() {
        let header = HttpHeader::parse(b"GET\t/chat\tHTTP/1.1\r\n\r\n");
        assert_eq!(header.method, "GET");
        assert_eq!(header.target, "/chat");
        assert_eq!(header.protocol_name, "HTTP");
    }
}
