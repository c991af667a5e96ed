//! Continuation cursors.
//!
//! A scan cursor is the encoded key of the last entry a scan consumed, carried
//! to callers as an opaque hex token. Only the token format lives here.

use crate::error::{ErrorClass, ErrorOrigin, InternalError};
use std::fmt::Write as _;
use thiserror::Error as ThisError;

// Decode bound for untrusted cursor token input.
const MAX_CURSOR_TOKEN_HEX_LEN: usize = 8 * 1024;

///
/// CursorDecodeError
///

#[derive(Debug, Eq, PartialEq, ThisError)]
pub enum CursorDecodeError {
    #[error("cursor token is empty")]
    Empty,

    #[error("cursor token exceeds max length: {len} hex chars (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("cursor token must have an even number of hex characters")]
    OddLength,

    #[error("invalid hex character at position {position}")]
    InvalidHex { position: usize },
}

impl From<CursorDecodeError> for InternalError {
    fn from(err: CursorDecodeError) -> Self {
        Self::new(
            ErrorClass::Unsupported,
            ErrorOrigin::Collection,
            format!("invalid list cursor: {err}"),
        )
    }
}

/// Encode a raw scan position as a lowercase hex token.
#[must_use]
pub fn encode_cursor(position: &[u8]) -> String {
    position
        .iter()
        .fold(String::with_capacity(position.len() * 2), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
}

/// Decode a hex cursor token back into a raw scan position.
///
/// Surrounding whitespace is trimmed; either hex case is accepted.
pub fn decode_cursor(token: &str) -> Result<Vec<u8>, CursorDecodeError> {
    let token = token.trim();

    if token.is_empty() {
        return Err(CursorDecodeError::Empty);
    }
    if token.len() > MAX_CURSOR_TOKEN_HEX_LEN {
        return Err(CursorDecodeError::TooLong {
            len: token.len(),
            max: MAX_CURSOR_TOKEN_HEX_LEN,
        });
    }
    if !token.len().is_multiple_of(2) {
        return Err(CursorDecodeError::OddLength);
    }

    token
        .as_bytes()
        .chunks_exact(2)
        .enumerate()
        .map(|(pair, digits)| {
            let position = pair * 2;
            let hi = hex_nibble(digits[0]).ok_or(CursorDecodeError::InvalidHex {
                position: position + 1,
            })?;
            let lo = hex_nibble(digits[1]).ok_or(CursorDecodeError::InvalidHex {
                position: position + 2,
            })?;

            Ok((hi << 4) | lo)
        })
        .collect()
}

const fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

///
/// TESTS
///
