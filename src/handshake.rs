//! WebSocket upgrade handshake
//!
//! Decides accept/reject over a parsed HTTP head and produces the wire
//! response. The accept value is `BASE64(SHA1(key || GUID))` per RFC 6455
//! §4.2.2; the 101 carries exactly the three upgrade headers and nothing
//! else.

use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};

use crate::http::HttpHeader;
use crate::WS_GUID;

/// Decision over a parsed upgrade request, carrying the serialized response.
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// Switch protocols; the response is the 101.
    Accepted { response: Bytes },
    /// Refuse; the response is a 501 or 400 and the connection closes after it.
    Rejected {
        response: Bytes,
        reason: &'static str,
    },
}

/// Run the accept criteria against a parsed request head.
///
/// All of the following must hold: `GET` method, `Upgrade: websocket`,
/// `Connection` containing the `Upgrade` token, `Sec-WebSocket-Version: 13`,
/// and a `Sec-WebSocket-Key` that decodes to 16 bytes. Field values compare
/// case-insensitively; a malformed key yields a 400, everything else a 501.
pub fn respond(header: &HttpHeader) -> HandshakeOutcome {
    if header.method != "GET" {
        return reject_501(header, "method must be GET");
    }

    if !header
        .field("Upgrade")
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
    {
        return reject_501(header, "missing Upgrade: websocket");
    }

    if !header.field("Connection").is_some_and(|v| {
        v.split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
    }) {
        return reject_501(header, "missing Connection: Upgrade");
    }

    if header.field("Sec-WebSocket-Version") != Some("13") {
        return reject_501(header, "unsupported WebSocket version");
    }

    let Some(key) = header.field("Sec-WebSocket-Key") else {
        return reject_501(header, "missing Sec-WebSocket-Key");
    };

    // The key must be 16 bytes of base64; a key that does not decode is a
    // client bug, answered with a 400 rather than a 501.
    match base64::engine::general_purpose::STANDARD.decode(key.trim()) {
        Ok(raw) if raw.len() == 16 => {}
        _ => {
            return HandshakeOutcome::Rejected {
                response: build_reject(header, 400, "Bad Request"),
                reason: "malformed Sec-WebSocket-Key",
            };
        }
    }

    HandshakeOutcome::Accepted {
        response: build_accept(&accept_key(key.trim())),
    }
}

/// Compute the `Sec-WebSocket-Accept` value for a client key.
#[inline]
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// The 101 Switching Protocols response.
pub fn build_accept(accept: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(128);
    buf.put_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
    buf.put_slice(b"Upgrade: websocket\r\n");
    buf.put_slice(b"Connection: Upgrade\r\n");
    buf.put_slice(b"Sec-WebSocket-Accept: ");
    buf.put_slice(accept.as_bytes());
    buf.put_slice(b"\r\n\r\n");
    buf.freeze()
}

/// A rejection status line echoing the request's HTTP version, empty body.
pub fn build_reject(header: &HttpHeader, status: u16, phrase: &str) -> Bytes {
    // Fall back to 1.1 when the request line never parsed far enough to
    // carry a version.
    let (major, minor) = if header.protocol_name.is_empty() {
        (1, 1)
    } else {
        (header.version_major, header.version_minor)
    };

    let mut buf = BytesMut::with_capacity(64);
    buf.put_slice(format!("HTTP/{}.{} {} {}\r\n\r\n", major, minor, status, phrase).as_bytes());
    buf.freeze()
}

/// The 400 sent when the head itself is unusable (oversized or never parsed).
pub fn build_bad_request() -> Bytes {
    Bytes::from_static(b"HTTP/1.1 400 Bad Request\r\n\r\n")
}

fn reject_501(header: &HttpHeader, reason: &'static str) -> HandshakeOutcome {
    HandshakeOutcome::Rejected {
        response: build_reject(header, 501, "Not Implemented"),
        reason,
    }
}
