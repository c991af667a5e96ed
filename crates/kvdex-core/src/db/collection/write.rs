//! Document write protocol.
//!
//! Every write runs `validate indices → stage segments → stage document and
//! indices → commit` and restarts from the top when a versionstamp
//! precondition fails, until the retry budget is spent.

use crate::{
    db::{
        Commit, CommitResult, DeleteOutcome, Rejection,
        batch::{AtomicBatch, BatchOutcome},
        collection::{
            Collection, DocumentEntry, SetOptions, StoredDocument, UpdateOptions, UpsertTarget,
        },
        index::{IndexKind, IndexValidation},
        segment::SegmentPointer,
    },
    error::InternalError,
    key::KeyPart,
    kv::Consistency,
    obs::{MetricsEvent, sink::record},
    serialize::{deserialize, serialize},
    value::{Value, merge},
};
use tracing::{debug, warn};

///
/// Attempt
///

enum Attempt<T> {
    Done(T),
    Retry,
}

impl Collection {
    // ------------------------------------------------------------------
    // Create / overwrite
    // ------------------------------------------------------------------

    /// Create a document under a generated id.
    pub async fn add(&self, value: Value) -> Result<CommitResult, InternalError> {
        self.create(value, None).await
    }

    /// Create a document under `id`; rejects with `IdCollision` when the id
    /// is taken unless `options.overwrite` is set.
    pub async fn set(
        &self,
        id: impl Into<KeyPart>,
        value: Value,
        options: SetOptions,
    ) -> Result<CommitResult, InternalError> {
        let id = id.into();
        self.validate_value(&id, &value)?;

        let attempts = self.attempts(options.retry);
        for attempt in 1..=attempts {
            record(MetricsEvent::CommitAttempt {
                collection: self.name(),
            });

            let current = self.load_stored(&id, Consistency::Strong).await?;
            if current.is_some() && !options.overwrite {
                return Ok(self.reject(&id, Rejection::IdCollision));
            }

            match self.commit_value(&id, current.as_ref(), &value).await? {
                Attempt::Done(result) => return Ok(result),
                Attempt::Retry => self.retrying(&id, attempt),
            }
        }

        Ok(self.reject(&id, Rejection::Conflict { attempts }))
    }

    /// Set with overwrite.
    pub async fn write(
        &self,
        id: impl Into<KeyPart>,
        value: Value,
    ) -> Result<CommitResult, InternalError> {
        self.set(id, value, SetOptions::overwrite()).await
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Merge `patch` into the current value of `id`.
    ///
    /// The merged value is re-validated on every attempt, so index
    /// collisions are always judged against the latest stored document.
    pub async fn update(
        &self,
        id: impl Into<KeyPart>,
        patch: Value,
        options: UpdateOptions,
    ) -> Result<CommitResult, InternalError> {
        let id = id.into();
        let strategy = options.strategy.unwrap_or(self.config().update_strategy);

        let attempts = self.attempts(options.retry);
        for attempt in 1..=attempts {
            record(MetricsEvent::CommitAttempt {
                collection: self.name(),
            });

            let Some(current) = self.load_stored(&id, Consistency::Strong).await? else {
                return Ok(self.reject(&id, Rejection::NotFound));
            };

            let merged = merge(current.document.value.clone(), patch.clone(), strategy);
            self.validate_value(&id, &merged)?;

            match self.commit_value(&id, Some(&current), &merged).await? {
                Attempt::Done(result) => return Ok(result),
                Attempt::Retry => self.retrying(&id, attempt),
            }
        }

        Ok(self.reject(&id, Rejection::Conflict { attempts }))
    }

    /// Update the document at `target` if it exists, otherwise create it
    /// from `value`.
    ///
    /// A document created through a primary index target gets a generated
    /// id; `value` should carry the indexed field.
    pub async fn upsert(
        &self,
        target: UpsertTarget,
        value: Value,
        patch: Value,
        options: UpdateOptions,
    ) -> Result<CommitResult, InternalError> {
        let attempts = self.attempts(options.retry);

        for attempt in 1..=attempts {
            let existing = match &target {
                UpsertTarget::Id(id) => {
                    let key = self.key_space().id_key(id);
                    self.backend()
                        .get(&key, Consistency::Strong)
                        .await?
                        .map(|_| id.clone())
                }
                UpsertTarget::PrimaryIndex { index, value } => self
                    .find_by_primary_index(index, value.clone())
                    .await?
                    .map(|doc| doc.id),
            };

            let result = match existing {
                Some(id) => self.update(id, patch.clone(), options).await?,
                None => match &target {
                    UpsertTarget::Id(id) => {
                        let options = SetOptions {
                            overwrite: false,
                            retry: options.retry,
                        };
                        self.set(id.clone(), value.clone(), options).await?
                    }
                    UpsertTarget::PrimaryIndex { .. } => {
                        self.create(value.clone(), options.retry).await?
                    }
                },
            };

            // the target changed state between lookup and write
            match result {
                CommitResult::Rejected(Rejection::NotFound | Rejection::IdCollision) => {
                    debug!(collection = self.name(), attempt, "upsert target moved, retrying");
                    record(MetricsEvent::CommitRetry {
                        collection: self.name(),
                        attempt,
                    });
                }
                other => return Ok(other),
            }
        }

        Ok(CommitResult::Rejected(Rejection::Conflict { attempts }))
    }

    /// Update the document owning a primary index value.
    pub async fn update_by_primary_index(
        &self,
        index: &str,
        value: impl Into<Value>,
        patch: Value,
        options: UpdateOptions,
    ) -> Result<CommitResult, InternalError> {
        match self.find_by_primary_index(index, value).await? {
            Some(doc) => self.update(doc.id, patch, options).await,
            None => Ok(CommitResult::Rejected(Rejection::NotFound)),
        }
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a document with its index entries and segments.
    pub async fn delete(&self, id: impl Into<KeyPart>) -> Result<DeleteOutcome, InternalError> {
        let id = id.into();

        let attempts = self.attempts(None);
        for attempt in 1..=attempts {
            record(MetricsEvent::CommitAttempt {
                collection: self.name(),
            });

            match self.delete_attempt(&id).await? {
                Attempt::Done(outcome) => return Ok(outcome),
                Attempt::Retry => self.retrying(&id, attempt),
            }
        }

        let rejection = Rejection::Conflict { attempts };
        self.reject(&id, rejection.clone());

        Ok(DeleteOutcome::Rejected(rejection))
    }

    /// Delete the document owning a primary index value.
    pub async fn delete_by_primary_index(
        &self,
        index: &str,
        value: impl Into<Value>,
    ) -> Result<DeleteOutcome, InternalError> {
        self.index().spec(index, IndexKind::Primary)?;

        match self.find_by_primary_index(index, value).await? {
            Some(doc) => self.delete(doc.id).await,
            None => Ok(DeleteOutcome::Absent),
        }
    }

    // ------------------------------------------------------------------
    // Protocol
    // ------------------------------------------------------------------

    pub(super) async fn create(
        &self,
        value: Value,
        retry: Option<u32>,
    ) -> Result<CommitResult, InternalError> {
        let id = self.descriptor().id_generator.generate(&value);
        let options = SetOptions {
            overwrite: false,
            retry,
        };

        self.set(id, value, options).await
    }

    /// One attempt at replacing `prior` (or nothing) with `value`.
    async fn commit_value(
        &self,
        id: &KeyPart,
        prior: Option<&StoredDocument>,
        value: &Value,
    ) -> Result<Attempt<CommitResult>, InternalError> {
        let index = self.index();
        let limits = &self.config().limits;

        // validate indices
        let index_checks = if self.descriptor().is_indexed() {
            match index
                .validate(self.backend(), self, value, id, Consistency::Strong)
                .await?
            {
                IndexValidation::Clear(checks) => checks,
                IndexValidation::Collision { index } => {
                    return Ok(Attempt::Done(
                        self.reject(id, Rejection::IndexCollision { index }),
                    ));
                }
                IndexValidation::Conflict => return Ok(Attempt::Retry),
            }
        } else {
            Vec::new()
        };

        // stage segments; the decision is made on the stored inline entry
        // so an inline entry never exceeds one chunk
        let inline = DocumentEntry::Inline(self.encode_value(value)?);
        let inline_bytes = serialize(&inline)?;
        let segments = self.segments();
        let (entry, entry_bytes) = match inline {
            DocumentEntry::Inline(bytes)
                if self.descriptor().is_segmented()
                    && segments.should_segment(inline_bytes.len()) =>
            {
                let Some(pointer) = segments.write(self.backend(), limits, id, &bytes).await?
                else {
                    return Ok(Attempt::Retry);
                };
                let entry = DocumentEntry::Segmented(pointer);
                let entry_bytes = serialize(&entry)?;

                (entry, entry_bytes)
            }
            entry => (entry, inline_bytes),
        };

        // stage document and indices
        let key = self.key_space().id_key(id);
        let delta = index.delta(id, prior.map(|p| &p.document.value), Some(value))?;

        let mut batch = AtomicBatch::new();
        batch
            .check(key.clone(), prior.map(|p| p.document.versionstamp))
            .checks(index_checks)
            .mutations(delta.sets)
            .set(key, entry_bytes)
            .mutations(delta.deletes);

        // commit
        let outcome = match batch.commit(self.backend(), limits).await {
            Ok(outcome) => outcome,
            Err(err) => {
                if let Some(pointer) = entry.pointer() {
                    warn!(
                        collection = self.name(),
                        %id,
                        generation = %pointer.generation,
                        error = %err,
                        "document commit failed; leaving its segments in place"
                    );
                }
                return Err(err);
            }
        };

        match outcome {
            BatchOutcome::Committed { .. } => {
                let versionstamp = outcome.first_versionstamp().ok_or_else(|| {
                    InternalError::batch_unsupported("committed batch carried no operation")
                })?;

                if let Some(old) = prior.and_then(|p| p.entry.pointer()) {
                    self.reclaim_quietly(id, old).await;
                }
                debug!(collection = self.name(), %id, %versionstamp, "document committed");

                Ok(Attempt::Done(CommitResult::Ok(Commit {
                    id: id.clone(),
                    versionstamp,
                })))
            }
            BatchOutcome::Failed { committed, .. } => {
                if let Some(pointer) = entry.pointer()
                    && committed == 0
                {
                    self.reclaim_quietly(id, pointer).await;
                }

                Ok(Attempt::Retry)
            }
        }
    }

    async fn delete_attempt(&self, id: &KeyPart) -> Result<Attempt<DeleteOutcome>, InternalError> {
        let key = self.key_space().id_key(id);
        let Some(raw) = self.backend().get(&key, Consistency::Strong).await? else {
            return Ok(Attempt::Done(DeleteOutcome::Absent));
        };

        let mut batch = AtomicBatch::new();
        batch.check(key.clone(), Some(raw.versionstamp)).delete(key);

        match deserialize::<DocumentEntry>(&raw.value) {
            Ok(entry) => {
                if self.descriptor().is_indexed() {
                    match self.materialize(id.clone(), raw, Consistency::Strong).await {
                        Ok(stored) => {
                            self.index()
                                .stage_deletion(id, &stored.document.value, &mut batch)?;
                        }
                        Err(err) if err.is_corruption() => {
                            warn!(
                                collection = self.name(),
                                %id,
                                error = %err,
                                "deleting corrupted document; its index entries are left stale"
                            );
                        }
                        Err(err) => return Err(err),
                    }
                }
                if let Some(pointer) = entry.pointer() {
                    self.segments().stage_deletion(id, pointer, &mut batch);
                }
            }
            Err(err) => {
                warn!(
                    collection = self.name(),
                    %id,
                    error = %err,
                    "deleting undecodable document entry"
                );
            }
        }

        match batch.commit(self.backend(), &self.config().limits).await? {
            outcome @ BatchOutcome::Committed { .. } => {
                let versionstamp = outcome.first_versionstamp().ok_or_else(|| {
                    InternalError::batch_unsupported("committed batch carried no operation")
                })?;
                debug!(collection = self.name(), %id, "document deleted");

                Ok(Attempt::Done(DeleteOutcome::Deleted(Commit {
                    id: id.clone(),
                    versionstamp,
                })))
            }
            BatchOutcome::Failed { .. } => Ok(Attempt::Retry),
        }
    }

    /// Remove chunks no committed entry references; failures only orphan data.
    async fn reclaim_quietly(&self, id: &KeyPart, pointer: &SegmentPointer) {
        let limits = &self.config().limits;

        if let Err(err) = self
            .segments()
            .reclaim(self.backend(), limits, id, pointer)
            .await
        {
            warn!(
                collection = self.name(),
                %id,
                generation = %pointer.generation,
                error = %err,
                "failed to reclaim segments"
            );
        }
    }

    /// Total attempts for a retry budget.
    fn attempts(&self, retry: Option<u32>) -> u32 {
        retry.unwrap_or(self.config().retry).saturating_add(1)
    }

    fn retrying(&self, id: &KeyPart, attempt: u32) {
        debug!(collection = self.name(), %id, attempt, "commit conflict, retrying");
        record(MetricsEvent::CommitRetry {
            collection: self.name(),
            attempt,
        });
    }

    fn reject(&self, id: &KeyPart, rejection: Rejection) -> CommitResult {
        debug!(collection = self.name(), %id, %rejection, "write rejected");
        record(MetricsEvent::Rejected {
            collection: self.name(),
            kind: rejection.kind(),
        });

        CommitResult::Rejected(rejection)
    }
}
