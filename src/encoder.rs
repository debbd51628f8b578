//! Base64 transport encoding for image payloads.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::Result;

/// Bytes encoded per chunk. A multiple of three, so each chunk encodes to
/// complete quads and the outputs concatenate without interior padding.
pub const CHUNK_SIZE: usize = 1023;

/// Encode raw bytes as standard Base64 (no line wrapping).
///
/// Input is processed in [`CHUNK_SIZE`] pieces so arbitrarily large buffers
/// never need a single oversized intermediate.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(CHUNK_SIZE) {
        STANDARD.encode_string(chunk, &mut out);
    }
    out
}

/// Decode standard Base64, tolerating surrounding whitespace.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(text.trim())?)
}
