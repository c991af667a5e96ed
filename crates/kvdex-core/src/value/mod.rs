mod bridge;
mod merge;
mod visit;

#[cfg(test)]
mod tests;

use crate::key::KeyPart;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// re-exports
pub use merge::{UpdateStrategy, merge};
pub use visit::{
    DocumentValidator, PathSegment, ValidationError, ValuePath, ValueValidator, ValueVisitor, walk,
};

///
/// Value
///
/// Closed document value model stored by every collection.
///
/// Object → string-keyed map, merged field-wise by deep updates.
/// List   → ordered sequence, always replaced wholesale by updates.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    BigInt(BigInt),
    Text(String),
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    List(Vec<Self>),
    Object(BTreeMap<String, Self>),
}

impl Value {
    /// Build an object value from `(field, value)` pairs.
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Self)>,
    {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Stable human-readable kind label for diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::BigInt(_) => "bigint",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Object(_) => "object",
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn as_object(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Object(fields) => Some(fields),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Top-level field lookup; `None` for non-objects and missing fields.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Self> {
        self.as_object().and_then(|fields| fields.get(field))
    }

    /// Dotted-path lookup through nested objects (`"address.city"`).
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Self> {
        path.split('.').try_fold(self, |value, field| value.get(field))
    }

    /// Convert an indexed field value into its key part.
    ///
    /// `Ok(None)` means the value is absent (`Null`) and produces no index entry.
    pub fn to_key_part(&self) -> Result<Option<KeyPart>, ValidationError> {
        match self {
            Self::Null => Ok(None),
            Self::Bool(v) => Ok(Some(KeyPart::Bool(*v))),
            Self::Int(v) => Ok(Some(KeyPart::Int(*v))),
            Self::BigInt(v) => Ok(Some(KeyPart::BigInt(v.clone()))),
            Self::Text(v) => Ok(Some(KeyPart::Text(v.clone()))),
            Self::Bytes(v) => Ok(Some(KeyPart::Bytes(v.clone()))),
            Self::Float(v) => KeyPart::float(*v).map(Some).ok_or_else(|| {
                ValidationError::NotIndexable {
                    path: ValuePath::root(),
                    kind: "NaN",
                }
            }),
            Self::List(_) | Self::Object(_) => {
                Err(ValidationError::NotIndexable {
                    path: ValuePath::root(),
                    kind: self.kind(),
                })
            }
        }
    }
}

impl From<KeyPart> for Value {
    fn from(part: KeyPart) -> Self {
        match part {
            KeyPart::Bytes(v) => Self::Bytes(v),
            KeyPart::Text(v) => Self::Text(v),
            KeyPart::BigInt(v) => Self::BigInt(v),
            KeyPart::Int(v) => Self::Int(v),
            KeyPart::Float(v) => Self::Float(v.get()),
            KeyPart::Bool(v) => Self::Bool(v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<BigInt> for Value {
    fn from(v: BigInt) -> Self {
        Self::BigInt(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Vec<Self>> for Value {
    fn from(v: Vec<Self>) -> Self {
        Self::List(v)
    }
}

impl From<BTreeMap<String, Self>> for Value {
    fn from(v: BTreeMap<String, Self>) -> Self {
        Self::Object(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
