//! UTF-8 validation for text messages
//!
//! Complete messages are validated with `simdutf8`. Fragmented text messages
//! are additionally checked as they accumulate so a connection carrying
//! invalid text fails early instead of buffering garbage until FIN.

/// Validate that the input is valid UTF-8.
#[inline]
pub fn validate_utf8(data: &[u8]) -> bool {
    simdutf8::basic::from_utf8(data).is_ok()
}

/// Validate a prefix of a UTF-8 stream.
///
/// Returns true if `data` is valid UTF-8 except possibly for an incomplete
/// multi-byte sequence at the very end. A fragmented text message passes this
/// check after every fragment and full validation once assembled.
pub fn validate_utf8_prefix(data: &[u8]) -> bool {
    let len = data.len();

    // Find the lead byte of a sequence that may be cut off by the end of the
    // buffer. Multi-byte sequences are at most 4 bytes, so it can only start
    // within the last 3 bytes.
    let mut split = len;
    for back in 1..=len.min(3) {
        let b = data[len - back];
        if b < 0x80 {
            break;
        }
        if b >= 0xC0 {
            let need = if b >= 0xF0 {
                4
            } else if b >= 0xE0 {
                3
            } else {
                2
            };
            if need > back {
                split = len - back;
            }
            break;
        }
        // continuation byte, keep walking back
    }

    if !validate_utf8(&data[..split]) {
        return false;
    }

    // The cut-off tail must be a lead byte followed only by continuations.
    data[split..].iter().skip(1).all(|&b| b & 0xC0 == 0x80)
}
