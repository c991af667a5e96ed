//! Keys: identifier parts, the ordered tuple encoding, and the key space.
//!
//! A [`Key`] is an ordered tuple of [`KeyPart`]s. Its byte encoding is
//! order-preserving and self-delimiting, so the encoding of a key is always
//! a byte prefix of the encoding of any of its extensions. Prefix scans on
//! the substrate rely on this.

mod codec;
mod float;
mod space;


use derive_more::From;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;

// re-exports
pub use codec::KeyDecodeError;
pub use float::{Float64, NanKeyError};
pub use space::{KeySpace, Role};

///
/// KeyPart
///
/// One component of a key, and the closed set of document identifier kinds.
/// Variant order matches the encoded tag order, so derived `Ord` agrees with
/// byte order of the encoding.
///

#[derive(Clone, Debug, Deserialize, Eq, From, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum KeyPart {
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    Text(String),
    BigInt(BigInt),
    Int(i64),
    Float(Float64),
    Bool(bool),
}

impl KeyPart {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::Text(_) => "text",
            Self::BigInt(_) => "bigint",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
        }
    }

    /// Float key part; `None` for NaN.
    #[must_use]
    pub fn float(v: f64) -> Option<Self> {
        Float64::try_new(v).map(Self::Float)
    }
}

impl From<&str> for KeyPart {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<i32> for KeyPart {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for KeyPart {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => {
                f.write_str("0x")?;
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::Text(v) => write!(f, "{v:?}"),
            Self::BigInt(v) => write!(f, "{v}n"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

///
/// Key
///
/// Ordered tuple of key parts.
///

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Key(Vec<KeyPart>);

impl Key {
    #[must_use]
    pub const fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    #[must_use]
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&KeyPart> {
        self.0.last()
    }

    /// Return a new key with `parts` appended.
    #[must_use]
    pub fn extend<I>(&self, parts: I) -> Self
    where
        I: IntoIterator<Item = KeyPart>,
    {
        let mut out = self.0.clone();
        out.extend(parts);
        Self(out)
    }

    /// Return a new key with one part appended.
    #[must_use]
    pub fn child(&self, part: impl Into<KeyPart>) -> Self {
        self.extend([part.into()])
    }

    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Encode into the ordered byte representation.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for part in &self.0 {
            codec::encode_part(part, &mut out);
        }
        out
    }

    /// Decode an ordered byte representation.
    pub fn decode(bytes: &[u8]) -> Result<Self, KeyDecodeError> {
        codec::decode_key(bytes).map(Self)
    }
}

impl From<Vec<KeyPart>> for Key {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{part}")?;
        }
        f.write_str("]")
    }
}
