//! Ordered, self-delimiting tuple encoding for keys.
//!
//! Layout per part (tag values are bit-stable, DO NOT CHANGE):
//! - bytes/text: tag, payload with `0x00` escaped as `0x00 0xff`, then `0x00`
//! - int: tag, 8-byte big-endian with the sign bit flipped
//! - bigint: tag, sign byte, 4-byte length, magnitude (inverted when negative)
//! - float: tag, 8-byte big-endian ordered bits (see [`Float64`])
//! - bool: tag only

#![expect(clippy::cast_possible_truncation)]

use crate::key::{Float64, KeyPart};
use num_bigint::{BigInt, Sign};
use thiserror::Error as ThisError;

pub(crate) const TAG_BYTES: u8 = 0x01;
pub(crate) const TAG_TEXT: u8 = 0x02;
pub(crate) const TAG_BIGINT: u8 = 0x1d;
pub(crate) const TAG_INT: u8 = 0x21;
pub(crate) const TAG_FLOAT: u8 = 0x22;
pub(crate) const TAG_FALSE: u8 = 0x26;
pub(crate) const TAG_TRUE: u8 = 0x27;

const TERMINATOR: u8 = 0x00;
const ESCAPE: u8 = 0xff;

const BIGINT_NEGATIVE: u8 = 0x00;
const BIGINT_NON_NEGATIVE: u8 = 0x01;

///
/// KeyDecodeError
///

#[derive(Debug, Eq, PartialEq, ThisError)]
pub enum KeyDecodeError {
    #[error("key ended unexpectedly at byte {offset}")]
    UnexpectedEnd { offset: usize },

    #[error("unknown key part tag 0x{tag:02x} at byte {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("invalid escape sequence at byte {offset}")]
    InvalidEscape { offset: usize },

    #[error("key text part is not valid utf-8")]
    InvalidUtf8,

    #[error("invalid bigint sign byte 0x{sign:02x}")]
    InvalidBigIntSign { sign: u8 },

    #[error("float key part at byte {offset} is NaN")]
    NanFloat { offset: usize },
}

pub(super) fn encode_part(part: &KeyPart, out: &mut Vec<u8>) {
    match part {
        KeyPart::Bytes(bytes) => {
            out.push(TAG_BYTES);
            encode_escaped(bytes, out);
        }
        KeyPart::Text(text) => {
            out.push(TAG_TEXT);
            encode_escaped(text.as_bytes(), out);
        }
        KeyPart::BigInt(v) => {
            out.push(TAG_BIGINT);
            encode_bigint(v, out);
        }
        KeyPart::Int(v) => {
            out.push(TAG_INT);
            let biased = (*v).cast_unsigned() ^ (1u64 << 63);
            out.extend_from_slice(&biased.to_be_bytes());
        }
        KeyPart::Float(v) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&v.to_ordered_bits().to_be_bytes());
        }
        KeyPart::Bool(false) => out.push(TAG_FALSE),
        KeyPart::Bool(true) => out.push(TAG_TRUE),
    }
}

fn encode_escaped(bytes: &[u8], out: &mut Vec<u8>) {
    for &byte in bytes {
        out.push(byte);
        if byte == TERMINATOR {
            out.push(ESCAPE);
        }
    }
    out.push(TERMINATOR);
}

fn encode_bigint(v: &BigInt, out: &mut Vec<u8>) {
    let (sign, magnitude) = v.to_bytes_be();
    let magnitude = if sign == Sign::NoSign {
        Vec::new()
    } else {
        magnitude
    };
    let len = magnitude.len() as u32;

    if sign == Sign::Minus {
        out.push(BIGINT_NEGATIVE);
        out.extend_from_slice(&(!len).to_be_bytes());
        out.extend(magnitude.iter().map(|b| !b));
    } else {
        out.push(BIGINT_NON_NEGATIVE);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&magnitude);
    }
}

pub(super) fn decode_key(bytes: &[u8]) -> Result<Vec<KeyPart>, KeyDecodeError> {
    let mut parts = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let (part, next) = decode_part(bytes, offset)?;
        parts.push(part);
        offset = next;
    }

    Ok(parts)
}

fn decode_part(bytes: &[u8], offset: usize) -> Result<(KeyPart, usize), KeyDecodeError> {
    let tag = bytes[offset];
    let body = offset + 1;

    match tag {
        TAG_BYTES => {
            let (payload, next) = decode_escaped(bytes, body)?;
            Ok((KeyPart::Bytes(payload), next))
        }
        TAG_TEXT => {
            let (payload, next) = decode_escaped(bytes, body)?;
            let text = String::from_utf8(payload).map_err(|_| KeyDecodeError::InvalidUtf8)?;
            Ok((KeyPart::Text(text), next))
        }
        TAG_BIGINT => decode_bigint(bytes, body),
        TAG_INT => {
            let raw = take(bytes, body, 8)?;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(raw);
            let v = (u64::from_be_bytes(buf) ^ (1u64 << 63)).cast_signed();
            Ok((KeyPart::Int(v), body + 8))
        }
        TAG_FLOAT => {
            let raw = take(bytes, body, 8)?;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(raw);
            let v = Float64::from_ordered_bits(u64::from_be_bytes(buf))
                .ok_or(KeyDecodeError::NanFloat { offset })?;
            Ok((KeyPart::Float(v), body + 8))
        }
        TAG_FALSE => Ok((KeyPart::Bool(false), body)),
        TAG_TRUE => Ok((KeyPart::Bool(true), body)),
        tag => Err(KeyDecodeError::UnknownTag { tag, offset }),
    }
}

fn decode_escaped(bytes: &[u8], mut offset: usize) -> Result<(Vec<u8>, usize), KeyDecodeError> {
    let mut out = Vec::new();

    loop {
        let Some(&byte) = bytes.get(offset) else {
            return Err(KeyDecodeError::UnexpectedEnd { offset });
        };

        if byte != TERMINATOR {
            out.push(byte);
            offset += 1;
            continue;
        }

        // 0x00 followed by 0xff is an escaped zero, anything else terminates.
        if bytes.get(offset + 1) == Some(&ESCAPE) {
            out.push(TERMINATOR);
            offset += 2;
        } else {
            return Ok((out, offset + 1));
        }
    }
}

fn decode_bigint(bytes: &[u8], offset: usize) -> Result<(KeyPart, usize), KeyDecodeError> {
    let sign = *take(bytes, offset, 1)?.first().unwrap_or(&0);
    let mut len_buf = [0u8; 4];
    len_buf.copy_from_slice(take(bytes, offset + 1, 4)?);
    let raw_len = u32::from_be_bytes(len_buf);

    let (negative, len) = match sign {
        BIGINT_NEGATIVE => (true, !raw_len),
        BIGINT_NON_NEGATIVE => (false, raw_len),
        sign => return Err(KeyDecodeError::InvalidBigIntSign { sign }),
    };

    let start = offset + 5;
    let magnitude = take(bytes, start, len as usize)?;
    let value = if negative {
        let restored = magnitude.iter().map(|b| !b).collect::<Vec<_>>();
        BigInt::from_bytes_be(Sign::Minus, &restored)
    } else {
        BigInt::from_bytes_be(Sign::Plus, magnitude)
    };

    Ok((KeyPart::BigInt(value), start + len as usize))
}

fn take(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8], KeyDecodeError> {
    bytes
        .get(offset..offset + len)
        .ok_or(KeyDecodeError::UnexpectedEnd { offset })
}
