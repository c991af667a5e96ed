use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};
use thiserror::Error as ThisError;

const SIGN_BIT: u64 = 1 << 63;

///
/// Float64
///
/// Key-safe f64: never NaN, -0.0 canonically stored as 0.0.
/// Equality, ordering and hashing follow the ordered bit pattern, which is
/// also the encoded byte order.
///

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Float64(f64);

impl Float64 {
    /// Fallible constructor that rejects NaN and normalizes -0.0.
    #[must_use]
    pub fn try_new(v: f64) -> Option<Self> {
        if v.is_nan() {
            return None;
        }

        Some(Self(if v == 0.0 { 0.0 } else { v }))
    }

    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }

    /// Bits whose unsigned order equals numeric order: negatives have every
    /// bit flipped, positives only the sign bit.
    #[must_use]
    pub const fn to_ordered_bits(self) -> u64 {
        let bits = self.0.to_bits();
        if bits & SIGN_BIT == 0 {
            bits ^ SIGN_BIT
        } else {
            !bits
        }
    }

    #[must_use]
    pub fn from_ordered_bits(ordered: u64) -> Option<Self> {
        let bits = if ordered & SIGN_BIT == 0 {
            !ordered
        } else {
            ordered ^ SIGN_BIT
        };

        Self::try_new(f64::from_bits(bits))
    }
}

///
/// NanKeyError
///

#[derive(Debug, Eq, PartialEq, ThisError)]
#[error("NaN cannot be used as a key part")]
pub struct NanKeyError;

impl TryFrom<f64> for Float64 {
    type Error = NanKeyError;

    fn try_from(v: f64) -> Result<Self, Self::Error> {
        Self::try_new(v).ok_or(NanKeyError)
    }
}

impl From<Float64> for f64 {
    fn from(v: Float64) -> Self {
        v.0
    }
}

impl Eq for Float64 {}

impl PartialEq for Float64 {
    fn eq(&self, other: &Self) -> bool {
        self.to_ordered_bits() == other.to_ordered_bits()
    }
}

impl Ord for Float64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_ordered_bits().cmp(&other.to_ordered_bits())
    }
}

impl PartialOrd for Float64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Float64 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_ordered_bits().hash(state);
    }
}

impl fmt::Display for Float64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
