//! WebSocket frame masking
//!
//! Every client frame carries a 4-byte XOR key; the payload is recovered by
//! XORing each byte with `mask[i % 4]`. Masking is an involution, so the same
//! routine serves both directions. Servers never mask outbound frames.

/// Apply (or remove) a WebSocket mask in place.
///
/// Works a word at a time: the 4-byte key is doubled into a `u64` and XORed
/// over 8-byte chunks, with a byte loop for the tail. Chunks are 8 bytes, a
/// multiple of the key length, so the tail restarts at key offset 0.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    if data.is_empty() {
        return;
    }

    let mask_word = u64::from_ne_bytes([
        mask[0], mask[1], mask[2], mask[3], mask[0], mask[1], mask[2], mask[3],
    ]);

    let mut chunks = data.chunks_exact_mut(8);
    for chunk in &mut chunks {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        let masked = u64::from_ne_bytes(word) ^ mask_word;
        chunk.copy_from_slice(&masked.to_ne_bytes());
    }

    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}
