//! Segmentation engine.
//!
//! Values larger than one chunk are split into fixed-size chunks stored
//! under `[.., __segment__, docId, generation, ordinal]`. The document entry
//! then holds a [`SegmentPointer`]. Chunks always commit before the pointer
//! that references them, so a committed pointer with a missing chunk is
//! corruption, never a race.

#[cfg(test)]
mod tests;

use crate::{
    config::BatchLimits,
    db::batch::{AtomicBatch, BatchOutcome},
    error::InternalError,
    key::{Key, KeyPart, KeySpace},
    kv::{Consistency, KvBackend},
    obs::{MetricsEvent, sink::record},
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use ulid::Ulid;

///
/// SegmentPointer
///
/// `generation` is unique per write attempt, so an overwrite never touches
/// the chunks its predecessor pointer still references.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SegmentPointer {
    pub generation: String,
    pub ids: Vec<u32>,
    pub len: u64,
    #[serde(with = "serde_bytes")]
    pub digest: Vec<u8>,
}

///
/// SegmentEngine
///

#[derive(Clone, Copy)]
pub(crate) struct SegmentEngine<'a> {
    space: &'a KeySpace,
    collection: &'a str,
    chunk_bytes: usize,
}

impl<'a> SegmentEngine<'a> {
    pub(crate) const fn new(space: &'a KeySpace, collection: &'a str, chunk_bytes: usize) -> Self {
        Self {
            space,
            collection,
            chunk_bytes,
        }
    }

    /// True when a stored inline entry of `size` bytes would not fit in one chunk.
    pub(crate) const fn should_segment(&self, size: usize) -> bool {
        size > self.chunk_bytes
    }

    pub(crate) fn chunk_keys(&self, id: &KeyPart, pointer: &SegmentPointer) -> Vec<Key> {
        pointer
            .ids
            .iter()
            .map(|ordinal| self.space.segment_key(id, &pointer.generation, *ordinal))
            .collect()
    }

    /// Split `bytes` into chunks under a fresh generation and stage one set
    /// per chunk. The returned pointer must only be committed once `batch`
    /// has committed.
    #[expect(clippy::cast_possible_truncation)]
    pub(crate) fn stage(
        &self,
        id: &KeyPart,
        bytes: &[u8],
        batch: &mut AtomicBatch,
    ) -> SegmentPointer {
        let generation = Ulid::new().to_string();
        let mut ids = Vec::with_capacity(bytes.len().div_ceil(self.chunk_bytes));

        for (ordinal, chunk) in bytes.chunks(self.chunk_bytes).enumerate() {
            let ordinal = ordinal as u32;
            batch.set(
                self.space.segment_key(id, &generation, ordinal),
                chunk.to_vec(),
            );
            ids.push(ordinal);
        }

        SegmentPointer {
            generation,
            ids,
            len: bytes.len() as u64,
            digest: Sha256::digest(bytes).to_vec(),
        }
    }

    /// Write every chunk of `bytes`; on failure the chunks of this attempt
    /// are removed again before returning.
    pub(crate) async fn write(
        &self,
        backend: &dyn KvBackend,
        limits: &BatchLimits,
        id: &KeyPart,
        bytes: &[u8],
    ) -> Result<Option<SegmentPointer>, InternalError> {
        let mut batch = AtomicBatch::new();
        let pointer = self.stage(id, bytes, &mut batch);

        let outcome = batch.commit(backend, limits).await;
        match outcome {
            Ok(BatchOutcome::Committed { .. }) => {
                debug!(
                    collection = self.collection,
                    %id,
                    chunks = pointer.ids.len(),
                    generation = %pointer.generation,
                    "segments written"
                );
                record(MetricsEvent::SegmentsWritten {
                    collection: self.collection,
                    chunks: pointer.ids.len() as u64,
                });

                Ok(Some(pointer))
            }
            Ok(BatchOutcome::Failed { .. }) => {
                self.reclaim(backend, limits, id, &pointer).await?;
                Ok(None)
            }
            Err(err) => {
                if let Err(cleanup) = self.reclaim(backend, limits, id, &pointer).await {
                    warn!(
                        collection = self.collection,
                        %id,
                        error = %cleanup,
                        "failed to remove chunks of an aborted segment write"
                    );
                }
                Err(err)
            }
        }
    }

    /// Read, reassemble and verify the bytes a pointer references.
    pub(crate) async fn read(
        &self,
        backend: &dyn KvBackend,
        key_limit: usize,
        consistency: Consistency,
        id: &KeyPart,
        pointer: &SegmentPointer,
    ) -> Result<Vec<u8>, InternalError> {
        let keys = self.chunk_keys(id, pointer);

        let reads = join_all(
            keys.chunks(key_limit.max(1))
                .map(|group| backend.get_many(group, consistency)),
        )
        .await;

        let mut bytes = Vec::new();
        let mut found = 0usize;
        for group in reads {
            for entry in group?.into_iter().flatten() {
                found += 1;
                bytes.extend_from_slice(&entry.value);
            }
        }

        if found != pointer.ids.len() {
            return Err(self.corrupted(
                id,
                format!("expected {} segments, found {found}", pointer.ids.len()),
            ));
        }
        if bytes.len() as u64 != pointer.len {
            return Err(self.corrupted(
                id,
                format!(
                    "segment data is {} bytes, pointer records {}",
                    bytes.len(),
                    pointer.len
                ),
            ));
        }
        if Sha256::digest(&bytes).as_slice() != pointer.digest.as_slice() {
            return Err(self.corrupted(id, "segment digest mismatch"));
        }

        Ok(bytes)
    }

    /// Stage deletion of every chunk a pointer references.
    pub(crate) fn stage_deletion(
        &self,
        id: &KeyPart,
        pointer: &SegmentPointer,
        batch: &mut AtomicBatch,
    ) {
        for key in self.chunk_keys(id, pointer) {
            batch.delete(key);
        }
    }

    /// Delete the chunks of a pointer that is no longer (or never was)
    /// referenced by a committed document entry.
    pub(crate) async fn reclaim(
        &self,
        backend: &dyn KvBackend,
        limits: &BatchLimits,
        id: &KeyPart,
        pointer: &SegmentPointer,
    ) -> Result<(), InternalError> {
        let mut batch = AtomicBatch::new();
        self.stage_deletion(id, pointer, &mut batch);

        if batch.commit(backend, limits).await?.is_committed() {
            record(MetricsEvent::SegmentsReclaimed {
                collection: self.collection,
                chunks: pointer.ids.len() as u64,
            });
        }

        Ok(())
    }

    pub(crate) fn corrupted(&self, id: &KeyPart, reason: impl Into<String>) -> InternalError {
        let err = InternalError::corrupted_document(id, reason);
        warn!(collection = self.collection, %id, error = %err, "corrupted document");
        record(MetricsEvent::Corruption {
            collection: self.collection,
        });

        err
    }
}
