//! Substrate contract.
//!
//! kvdex only needs point reads, bounded atomic check-and-mutate batches, and
//! prefix scans with a per-entry versionstamp. Anything providing those can
//! back a [`crate::db::Database`].

mod memory;


use crate::{config::BatchLimits, key::Key};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use thiserror::Error as ThisError;

// re-exports
pub use memory::MemoryKv;

///
/// BackendError
///

#[derive(Debug, ThisError)]
pub enum BackendError {
    #[error("atomic operation exceeds {what} limit: {actual} > {limit}")]
    LimitExceeded {
        what: &'static str,
        limit: usize,
        actual: usize,
    },

    #[error("invalid mutation on {key}: {message}")]
    InvalidMutation { key: Key, message: String },

    #[error("invalid list cursor")]
    InvalidCursor,

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

///
/// Versionstamp
///
/// Opaque, monotonically advancing token bound to a key's value at its last
/// write. Sole basis of optimistic-concurrency checks.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Versionstamp([u8; 10]);

impl Versionstamp {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 10]) -> Self {
        Self(bytes)
    }

    /// Versionstamp for a monotonically increasing commit sequence number.
    #[must_use]
    pub fn from_sequence(seq: u64) -> Self {
        let mut bytes = [0u8; 10];
        bytes[..8].copy_from_slice(&seq.to_be_bytes());
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 10] {
        &self.0
    }
}

impl fmt::Display for Versionstamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

///
/// Consistency
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    #[default]
    Strong,
    Eventual,
}

///
/// KvEntry
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KvEntry {
    pub key: Key,
    pub value: Vec<u8>,
    pub versionstamp: Versionstamp,
}

///
/// Check
///
/// Precondition: the key's current versionstamp must equal `versionstamp`
/// (`None` asserts the key is absent).
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Check {
    pub key: Key,
    pub versionstamp: Option<Versionstamp>,
}

///
/// MutationKind
///
/// `Sum`, `Min` and `Max` operate on 8-byte little-endian u64 values.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MutationKind {
    Set(Vec<u8>),
    Delete,
    Sum(u64),
    Min(u64),
    Max(u64),
}

///
/// Mutation
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mutation {
    pub key: Key,
    pub kind: MutationKind,
}

impl Mutation {
    #[must_use]
    pub const fn set(key: Key, value: Vec<u8>) -> Self {
        Self {
            key,
            kind: MutationKind::Set(value),
        }
    }

    #[must_use]
    pub const fn delete(key: Key) -> Self {
        Self {
            key,
            kind: MutationKind::Delete,
        }
    }

    /// Encoded key length in bytes.
    #[must_use]
    pub fn key_bytes(&self) -> usize {
        self.key.encode().len()
    }

    /// Encoded key plus payload length in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        let payload = match &self.kind {
            MutationKind::Set(value) => value.len(),
            MutationKind::Delete => 0,
            MutationKind::Sum(_) | MutationKind::Min(_) | MutationKind::Max(_) => 8,
        };

        self.key_bytes() + payload
    }
}

///
/// AtomicOperation
///
/// One substrate-level batch: all checks pass and every mutation applies,
/// or nothing applies.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AtomicOperation {
    pub checks: Vec<Check>,
    pub mutations: Vec<Mutation>,
}

impl AtomicOperation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn check(mut self, key: Key, versionstamp: Option<Versionstamp>) -> Self {
        self.checks.push(Check { key, versionstamp });
        self
    }

    #[must_use]
    pub fn set(mut self, key: Key, value: Vec<u8>) -> Self {
        self.mutations.push(Mutation::set(key, value));
        self
    }

    #[must_use]
    pub fn delete(mut self, key: Key) -> Self {
        self.mutations.push(Mutation::delete(key));
        self
    }

    #[must_use]
    pub fn sum(mut self, key: Key, value: u64) -> Self {
        self.mutations.push(Mutation {
            key,
            kind: MutationKind::Sum(value),
        });
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty() && self.mutations.is_empty()
    }

    /// Verify the operation fits within `limits`.
    pub fn check_limits(&self, limits: &BatchLimits) -> Result<(), BackendError> {
        let exceeded = |what, limit, actual| BackendError::LimitExceeded {
            what,
            limit,
            actual,
        };

        if self.checks.len() > limits.max_checks {
            return Err(exceeded("check count", limits.max_checks, self.checks.len()));
        }
        if self.mutations.len() > limits.max_mutations {
            return Err(exceeded(
                "mutation count",
                limits.max_mutations,
                self.mutations.len(),
            ));
        }

        let key_bytes = self
            .mutations
            .iter()
            .map(Mutation::key_bytes)
            .chain(self.checks.iter().map(|c| c.key.encode().len()))
            .sum::<usize>();
        if key_bytes > limits.max_key_bytes {
            return Err(exceeded("total key size", limits.max_key_bytes, key_bytes));
        }

        let size_bytes = self.mutations.iter().map(Mutation::size_bytes).sum::<usize>();
        if size_bytes > limits.max_mutation_bytes {
            return Err(exceeded(
                "total mutation size",
                limits.max_mutation_bytes,
                size_bytes,
            ));
        }

        Ok(())
    }
}

///
/// CommitStatus
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommitStatus {
    Committed { versionstamp: Versionstamp },
    CheckFailed,
}

impl CommitStatus {
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    #[must_use]
    pub const fn versionstamp(&self) -> Option<Versionstamp> {
        match self {
            Self::Committed { versionstamp } => Some(*versionstamp),
            Self::CheckFailed => None,
        }
    }
}

///
/// ListRequest
///
/// Prefix scan, optionally narrowed to `[start, end)` inside the prefix.
/// `cursor` resumes after (or, reversed, before) the last returned key.
///

#[derive(Clone, Debug, Default)]
pub struct ListRequest {
    pub prefix: Key,
    pub start: Option<Key>,
    pub end: Option<Key>,
    pub limit: Option<usize>,
    pub cursor: Option<Vec<u8>>,
    pub reverse: bool,
    pub consistency: Consistency,
}

impl ListRequest {
    #[must_use]
    pub fn prefix(prefix: Key) -> Self {
        Self {
            prefix,
            ..Self::default()
        }
    }
}

///
/// ListPage
///
/// `cursor` is `Some` only while more entries may remain.
///

#[derive(Clone, Debug, Default)]
pub struct ListPage {
    pub entries: Vec<KvEntry>,
    pub cursor: Option<Vec<u8>>,
}

///
/// KvBackend
///
/// Ordered key-value substrate. Implementations must be linearizable per
/// key and apply each [`AtomicOperation`] all-or-nothing.
///

#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &Key, consistency: Consistency)
    -> Result<Option<KvEntry>, BackendError>;

    /// Read several keys; the result is aligned with `keys`.
    async fn get_many(
        &self,
        keys: &[Key],
        consistency: Consistency,
    ) -> Result<Vec<Option<KvEntry>>, BackendError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key, consistency).await?);
        }
        Ok(out)
    }

    /// Apply one atomic operation. Limit violations are errors, failed
    /// checks are reported as [`CommitStatus::CheckFailed`].
    async fn commit(&self, op: AtomicOperation) -> Result<CommitStatus, BackendError>;

    async fn list(&self, request: &ListRequest) -> Result<ListPage, BackendError>;
}

// Blanket implementation for Arc<T>
#[async_trait]
impl<T: KvBackend + ?Sized> KvBackend for Arc<T> {
    async fn get(
        &self,
        key: &Key,
        consistency: Consistency,
    ) -> Result<Option<KvEntry>, BackendError> {
        (**self).get(key, consistency).await
    }

    async fn get_many(
        &self,
        keys: &[Key],
        consistency: Consistency,
    ) -> Result<Vec<Option<KvEntry>>, BackendError> {
        (**self).get_many(keys, consistency).await
    }

    async fn commit(&self, op: AtomicOperation) -> Result<CommitStatus, BackendError> {
        (**self).commit(op).await
    }

    async fn list(&self, request: &ListRequest) -> Result<ListPage, BackendError> {
        (**self).list(request).await
    }
}
