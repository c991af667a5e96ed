//! Index engine.
//!
//! Computes, validates and stages primary/secondary index entries in
//! lockstep with document writes. Index entries only carry a back-pointer to
//! the document id; readers treat an entry whose document is gone, or no
//! longer carries the indexed value, as stale and skip it.

#[cfg(test)]
mod tests;

use crate::{
    db::{Document, batch::AtomicBatch},
    error::InternalError,
    key::{Key, KeyPart, KeySpace},
    kv::{AtomicOperation, Check, CommitStatus, Consistency, KvBackend, ListRequest, Mutation},
    serialize::{deserialize, serialize},
    value::{ValidationError, Value},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

///
/// IndexKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IndexKind {
    /// Unique: one field value maps to exactly one document.
    Primary,
    /// Non-unique: one field value maps to any number of documents.
    Secondary,
}

///
/// IndexSpec
///
/// Declared index over one (possibly dotted) field path. The field path is
/// also the index name used in keys.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexSpec {
    pub field: String,
    pub kind: IndexKind,
}

impl IndexSpec {
    pub fn primary(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: IndexKind::Primary,
        }
    }

    pub fn secondary(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: IndexKind::Secondary,
        }
    }

    /// Indexed key part of `value`, `None` when the field is absent or null.
    pub fn key_part(&self, value: &Value) -> Result<Option<KeyPart>, ValidationError> {
        match value.get_path(&self.field) {
            None => Ok(None),
            Some(field) => field
                .to_key_part()
                .map_err(|err| err.at_field(&self.field)),
        }
    }

    /// Whether `doc` still carries `part` in this index's field.
    #[must_use]
    pub fn matches(&self, doc: &Document, part: &KeyPart) -> bool {
        matches!(self.key_part(&doc.value), Ok(Some(current)) if current == *part)
    }
}

///
/// IndexEntry
///
/// Stored payload of every index key.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub(crate) struct IndexEntry {
    pub(crate) id: KeyPart,
}

impl IndexEntry {
    pub(crate) fn encode(id: &KeyPart) -> Result<Vec<u8>, InternalError> {
        Ok(serialize(&Self { id: id.clone() })?)
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<KeyPart, InternalError> {
        deserialize::<Self>(bytes)
            .map(|entry| entry.id)
            .map_err(|err| InternalError::index_corruption(format!("index entry corrupted: {err}")))
    }
}

///
/// DocumentSource
///
/// Point reads the engine needs to tell live index entries from stale ones.
///

#[async_trait]
pub(crate) trait DocumentSource: Send + Sync {
    async fn load(&self, id: &KeyPart) -> Result<Option<Document>, InternalError>;
}

///
/// IndexValidation
///

#[derive(Debug)]
pub(crate) enum IndexValidation {
    /// No live collision; these checks must ride on the document commit.
    Clear(Vec<Check>),
    Collision { index: String },
    /// The standalone precondition commit lost a race.
    Conflict,
}

///
/// IndexDelta
///
/// Index mutations for one document transition, split so the caller can
/// place sets before and deletes after the document entry.
///

#[derive(Debug, Default)]
pub(crate) struct IndexDelta {
    pub(crate) sets: Vec<Mutation>,
    pub(crate) deletes: Vec<Mutation>,
}

impl IndexDelta {
    pub(crate) const fn len(&self) -> usize {
        self.sets.len() + self.deletes.len()
    }
}

///
/// IndexEngine
///

#[derive(Clone, Copy)]
pub(crate) struct IndexEngine<'a> {
    space: &'a KeySpace,
    indices: &'a [IndexSpec],
}

impl<'a> IndexEngine<'a> {
    pub(crate) const fn new(space: &'a KeySpace, indices: &'a [IndexSpec]) -> Self {
        Self { space, indices }
    }

    pub(crate) fn spec(
        &self,
        field: &str,
        kind: IndexKind,
    ) -> Result<&'a IndexSpec, InternalError> {
        self.indices
            .iter()
            .find(|spec| spec.field == field && spec.kind == kind)
            .ok_or_else(|| {
                InternalError::index_unsupported(format!("no {kind:?} index declared on '{field}'"))
            })
    }

    /// Every index key `value` produces for document `id`, in declaration order.
    pub(crate) fn keys(
        &self,
        id: &KeyPart,
        value: &Value,
    ) -> Result<Vec<(&'a IndexSpec, Key)>, ValidationError> {
        let mut out = Vec::with_capacity(self.indices.len());

        for spec in self.indices {
            let Some(part) = spec.key_part(value)? else {
                continue;
            };

            let key = match spec.kind {
                IndexKind::Primary => self.space.primary_index_key(&spec.field, &part),
                IndexKind::Secondary => self.space.secondary_index_key(&spec.field, &part, id),
            };
            out.push((spec, key));
        }

        Ok(out)
    }

    /// Verify no live document other than `exclude` owns any primary-indexed
    /// value of `value`, then commit the resulting preconditions on their own.
    ///
    /// Stale entries are treated as free, guarded by checks on both the entry
    /// and the stale target's document key.
    pub(crate) async fn validate(
        &self,
        backend: &dyn KvBackend,
        source: &dyn DocumentSource,
        value: &Value,
        exclude: &KeyPart,
        consistency: Consistency,
    ) -> Result<IndexValidation, InternalError> {
        let mut checks = Vec::new();

        for spec in self.indices.iter().filter(|s| s.kind == IndexKind::Primary) {
            let Some(part) = spec.key_part(value)? else {
                continue;
            };

            let key = self.space.primary_index_key(&spec.field, &part);
            let Some(entry) = backend.get(&key, consistency).await? else {
                checks.push(Check {
                    key,
                    versionstamp: None,
                });
                continue;
            };

            let owner = IndexEntry::decode(&entry.value)?;
            if owner != *exclude {
                match source.load(&owner).await? {
                    Some(doc) if spec.matches(&doc, &part) => {
                        return Ok(IndexValidation::Collision {
                            index: spec.field.clone(),
                        });
                    }
                    doc => checks.push(Check {
                        key: self.space.id_key(&owner),
                        versionstamp: doc.map(|d| d.versionstamp),
                    }),
                }
            }

            checks.push(Check {
                key,
                versionstamp: Some(entry.versionstamp),
            });
        }

        if !checks.is_empty() {
            let op = AtomicOperation {
                checks: checks.clone(),
                mutations: Vec::new(),
            };
            if backend.commit(op).await? == CommitStatus::CheckFailed {
                return Ok(IndexValidation::Conflict);
            }
        }

        Ok(IndexValidation::Clear(checks))
    }

    /// Index mutations taking document `id` from `old` to `new`. This is how
    /// writes stage index entries: `old` is `None` for a fresh document.
    ///
    /// Entries whose key is unchanged are left alone.
    pub(crate) fn delta(
        &self,
        id: &KeyPart,
        old: Option<&Value>,
        new: Option<&Value>,
    ) -> Result<IndexDelta, InternalError> {
        let old_keys = old.map(|v| self.keys(id, v)).transpose()?.unwrap_or_default();
        let new_keys = new.map(|v| self.keys(id, v)).transpose()?.unwrap_or_default();

        let mut delta = IndexDelta::default();
        if !new_keys.is_empty() {
            let payload = IndexEntry::encode(id)?;
            for (_, key) in &new_keys {
                if !old_keys.iter().any(|(_, k)| k == key) {
                    delta.sets.push(Mutation::set(key.clone(), payload.clone()));
                }
            }
        }
        for (_, key) in old_keys {
            if !new_keys.iter().any(|(_, k)| *k == key) {
                delta.deletes.push(Mutation::delete(key));
            }
        }

        Ok(delta)
    }

    /// Stage deletion of every index entry `value` produced.
    pub(crate) fn stage_deletion(
        &self,
        id: &KeyPart,
        value: &Value,
        batch: &mut AtomicBatch,
    ) -> Result<(), InternalError> {
        let delta = self.delta(id, Some(value), None)?;
        batch.mutations(delta.deletes);

        Ok(())
    }

    /// Id currently recorded under a primary index value, if any.
    pub(crate) async fn primary_owner(
        &self,
        backend: &dyn KvBackend,
        spec: &IndexSpec,
        part: &KeyPart,
        consistency: Consistency,
    ) -> Result<Option<KeyPart>, InternalError> {
        let key = self.space.primary_index_key(&spec.field, part);

        backend
            .get(&key, consistency)
            .await?
            .map(|entry| IndexEntry::decode(&entry.value))
            .transpose()
    }

    /// Scan request over every secondary entry for one indexed value.
    pub(crate) fn secondary_scan(&self, spec: &IndexSpec, part: &KeyPart) -> ListRequest {
        ListRequest::prefix(self.space.secondary_index_prefix(&spec.field, part))
    }
}
