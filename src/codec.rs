//! Hex codec for signatures, patches and progress dumps.
//!
//! Signatures and patches travel through definitions as hex text. Decoding is
//! strict: an odd number of digits or any non-hex character is rejected, and
//! both upper and lower case digits are accepted. Encoding always produces
//! lowercase digits, so `encode(decode(s)) == s.to_lowercase()`.

use std::ops::Range;
use thiserror::Error;

/// Bytes per line in canonical hex dumps.
pub const DUMP_WIDTH: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("odd number of hex digits ({len})")]
    OddLength { len: usize },

    #[error("invalid hex character {c:?} at position {index}")]
    InvalidCharacter { c: char, index: usize },
}

/// Decode a hex string into raw bytes.
pub fn decode(text: &str) -> Result<Vec<u8>, CodecError> {
    hex::decode(text).map_err(|e| match e {
        hex::FromHexError::InvalidHexCharacter { c, index } => {
            CodecError::InvalidCharacter { c, index }
        }
        _ => CodecError::OddLength { len: text.len() },
    })
}

/// Encode raw bytes as a lowercase hex string.
pub fn encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Render `bytes` as a canonical hex dump, one line per [`DUMP_WIDTH`] bytes.
///
/// `base` is the offset printed for the first byte, so a slice taken from the
/// middle of a buffer keeps its real addresses.
///
/// ```
/// let dump = sigpatch::codec::hex_dump(b"AB", 0x10);
/// assert!(dump.starts_with("00000010  41 42 "));
/// assert!(dump.ends_with("|AB|\n"));
/// ```
pub fn hex_dump(bytes: &[u8], base: usize) -> String {
    let mut out = String::with_capacity(bytes.len() / DUMP_WIDTH * 80 + 80);

    for (line, chunk) in bytes.chunks(DUMP_WIDTH).enumerate() {
        out.push_str(&format!("{:08x}  ", base + line * DUMP_WIDTH));

        for col in 0..DUMP_WIDTH {
            match chunk.get(col) {
                Some(b) => out.push_str(&format!("{b:02x} ")),
                None => out.push_str("   "),
            }
            if col == DUMP_WIDTH / 2 - 1 {
                out.push(' ');
            }
        }

        out.push_str(" |");
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push_str("|\n");
    }

    out
}

/// Byte range of the dump lines surrounding `[offset, offset + len)`.
///
/// One full line of context is kept on either side of the span, and line
/// boundaries stay aligned to [`DUMP_WIDTH`] so that before/after dumps of the
/// same span line up. The range is clamped to `buffer_len`.
pub fn window_range(buffer_len: usize, offset: usize, len: usize) -> Range<usize> {
    let start = (offset / DUMP_WIDTH).saturating_sub(1) * DUMP_WIDTH;
    let end = offset.saturating_add(len).div_ceil(DUMP_WIDTH) + 1;
    let end = end.saturating_mul(DUMP_WIDTH);
    start.min(buffer_len)..end.min(buffer_len)
}

/// Hex dump of the lines surrounding `[offset, offset + len)`.
pub fn dump_window(buffer: &[u8], offset: usize, len: usize) -> String {
    let range = window_range(buffer.len(), offset, len);
    let base = range.start;
    hex_dump(&buffer[range], base)
}
