use crate::{
    MAX_KEY_BYTES, MAX_VALUE_BYTES,
    config::BatchLimits,
    key::Key,
    kv::{
        AtomicOperation, BackendError, CommitStatus, Consistency, KvBackend, KvEntry, ListPage,
        ListRequest, MutationKind, Versionstamp,
    },
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::{collections::BTreeMap, ops::Bound};

///
/// StoredEntry
///

#[derive(Clone, Debug)]
struct StoredEntry {
    value: Vec<u8>,
    versionstamp: Versionstamp,
}

///
/// MemoryState
///

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<Vec<u8>, StoredEntry>,
    sequence: u64,
}

///
/// MemoryKv
///
/// In-process ordered substrate. Keys are held in their encoded form so map
/// order is exactly substrate byte order. Consistency modes are equivalent
/// here; every read is strong.
///

#[derive(Debug, Default)]
pub struct MemoryKv {
    state: RwLock<MemoryState>,
    limits: BatchLimits,
}

impl MemoryKv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_limits(limits: BatchLimits) -> Self {
        Self {
            state: RwLock::default(),
            limits,
        }
    }

    #[must_use]
    pub const fn limits(&self) -> &BatchLimits {
        &self.limits
    }

    /// Number of stored keys, across every namespace.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decoded snapshot of every stored key under `prefix`, in order.
    #[must_use]
    pub fn keys_with_prefix(&self, prefix: &Key) -> Vec<Key> {
        let prefix = prefix.encode();

        self.state
            .read()
            .entries
            .range(prefix.clone()..)
            .take_while(|(raw, _)| raw.starts_with(&prefix))
            .filter_map(|(raw, _)| Key::decode(raw).ok())
            .collect()
    }

    fn entry(key: &Key, stored: &StoredEntry) -> KvEntry {
        KvEntry {
            key: key.clone(),
            value: stored.value.clone(),
            versionstamp: stored.versionstamp,
        }
    }

    fn validate_operation(&self, op: &AtomicOperation) -> Result<(), BackendError> {
        op.check_limits(&self.limits)?;

        for mutation in &op.mutations {
            let key_len = mutation.key_bytes();
            if key_len > MAX_KEY_BYTES {
                return Err(BackendError::LimitExceeded {
                    what: "key size",
                    limit: MAX_KEY_BYTES,
                    actual: key_len,
                });
            }
            if let MutationKind::Set(value) = &mutation.kind
                && value.len() > MAX_VALUE_BYTES
            {
                return Err(BackendError::LimitExceeded {
                    what: "value size",
                    limit: MAX_VALUE_BYTES,
                    actual: value.len(),
                });
            }
        }

        Ok(())
    }
}

fn read_u64(key: &Key, bytes: &[u8]) -> Result<u64, BackendError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| BackendError::InvalidMutation {
            key: key.clone(),
            message: format!("expected an 8-byte u64 operand, found {} bytes", bytes.len()),
        })?;

    Ok(u64::from_le_bytes(raw))
}

#[async_trait]
impl KvBackend for MemoryKv {
    async fn get(
        &self,
        key: &Key,
        _consistency: Consistency,
    ) -> Result<Option<KvEntry>, BackendError> {
        let raw = key.encode();
        let state = self.state.read();

        Ok(state
            .entries
            .get(&raw)
            .map(|stored| Self::entry(key, stored)))
    }

    async fn get_many(
        &self,
        keys: &[Key],
        _consistency: Consistency,
    ) -> Result<Vec<Option<KvEntry>>, BackendError> {
        let state = self.state.read();

        Ok(keys
            .iter()
            .map(|key| {
                let raw = key.encode();
                state
                    .entries
                    .get(&raw)
                    .map(|stored| Self::entry(key, stored))
            })
            .collect())
    }

    async fn commit(&self, op: AtomicOperation) -> Result<CommitStatus, BackendError> {
        self.validate_operation(&op)?;

        let mut state = self.state.write();

        for check in &op.checks {
            let current = state
                .entries
                .get(&check.key.encode())
                .map(|stored| stored.versionstamp);
            if current != check.versionstamp {
                return Ok(CommitStatus::CheckFailed);
            }
        }

        // Stage every mutation first so a bad operand leaves state untouched.
        let mut staged: Vec<(Vec<u8>, Option<Vec<u8>>)> = Vec::with_capacity(op.mutations.len());
        for mutation in op.mutations {
            let raw = mutation.key.encode();
            let current = staged
                .iter()
                .rev()
                .find(|(k, _)| *k == raw)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| state.entries.get(&raw).map(|e| e.value.clone()));

            let next = match mutation.kind {
                MutationKind::Set(value) => Some(value),
                MutationKind::Delete => None,
                MutationKind::Sum(operand) => {
                    let base = current
                        .as_deref()
                        .map(|b| read_u64(&mutation.key, b))
                        .transpose()?
                        .unwrap_or(0);
                    Some(base.wrapping_add(operand).to_le_bytes().to_vec())
                }
                MutationKind::Min(operand) => {
                    let next = match current.as_deref() {
                        Some(b) => read_u64(&mutation.key, b)?.min(operand),
                        None => operand,
                    };
                    Some(next.to_le_bytes().to_vec())
                }
                MutationKind::Max(operand) => {
                    let next = match current.as_deref() {
                        Some(b) => read_u64(&mutation.key, b)?.max(operand),
                        None => operand,
                    };
                    Some(next.to_le_bytes().to_vec())
                }
            };

            staged.push((raw, next));
        }

        state.sequence += 1;
        let versionstamp = Versionstamp::from_sequence(state.sequence);

        for (raw, next) in staged {
            match next {
                Some(value) => {
                    state.entries.insert(
                        raw,
                        StoredEntry {
                            value,
                            versionstamp,
                        },
                    );
                }
                None => {
                    state.entries.remove(&raw);
                }
            }
        }

        Ok(CommitStatus::Committed { versionstamp })
    }

    async fn list(&self, request: &ListRequest) -> Result<ListPage, BackendError> {
        let prefix = request.prefix.encode();

        let mut lower = Bound::Included(
            request
                .start
                .as_ref()
                .map_or_else(|| prefix.clone(), Key::encode),
        );
        // Every extension of the prefix continues with a tag byte below 0xff.
        let mut upper = Bound::Excluded(request.end.as_ref().map_or_else(
            || {
                let mut end = prefix.clone();
                end.push(0xff);
                end
            },
            Key::encode,
        ));

        if let Some(cursor) = &request.cursor {
            if !cursor.starts_with(&prefix) {
                return Err(BackendError::InvalidCursor);
            }
            if request.reverse {
                upper = Bound::Excluded(cursor.clone());
            } else {
                lower = Bound::Excluded(cursor.clone());
            }
        }

        // An inverted window is empty rather than a range panic.
        if let (Bound::Included(lo) | Bound::Excluded(lo), Bound::Excluded(hi)) = (&lower, &upper)
            && lo >= hi
        {
            return Ok(ListPage::default());
        }

        let state = self.state.read();
        let range = state
            .entries
            .range((lower, upper))
            .filter(|(raw, _)| raw.starts_with(&prefix));

        let limit = request.limit.unwrap_or(usize::MAX);
        let selected: Vec<_> = if request.reverse {
            range.rev().take(limit.saturating_add(1)).collect()
        } else {
            range.take(limit.saturating_add(1)).collect()
        };

        let has_more = selected.len() > limit;
        let mut entries = Vec::with_capacity(selected.len().min(limit));
        let mut last_raw = None;
        for (raw, stored) in selected.into_iter().take(limit) {
            let key = Key::decode(raw).map_err(|err| {
                BackendError::Unavailable(format!("stored key failed to decode: {err}"))
            })?;
            entries.push(Self::entry(&key, stored));
            last_raw = Some(raw.clone());
        }

        Ok(ListPage {
            entries,
            cursor: if has_more { last_raw } else { None },
        })
    }
}
