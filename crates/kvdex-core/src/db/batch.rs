//! Atomic batch wrapper.
//!
//! A logical set of mutations that is committed as one or more substrate
//! atomic operations. Sub-batches commit strictly in order; every check rides
//! on the first sub-batch. A failed sub-batch stops the commit and already
//! committed sub-batches are NOT rolled back.

use crate::{
    config::BatchLimits,
    error::InternalError,
    key::Key,
    kv::{AtomicOperation, Check, CommitStatus, KvBackend, Mutation, Versionstamp},
    obs::{MetricsEvent, sink::record},
};
use tracing::{debug, warn};

///
/// BatchOutcome
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BatchOutcome {
    /// Every sub-batch committed; versionstamps are in commit order.
    Committed { versionstamps: Vec<Versionstamp> },

    /// Sub-batch `committed` (zero-based) failed its checks; the ones before
    /// it stay applied.
    Failed { committed: usize, total: usize },
}

impl BatchOutcome {
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    /// Versionstamp of the first sub-batch, which holds every check.
    #[must_use]
    pub fn first_versionstamp(&self) -> Option<Versionstamp> {
        match self {
            Self::Committed { versionstamps } => versionstamps.first().copied(),
            Self::Failed { .. } => None,
        }
    }
}

///
/// AtomicBatch
///

#[derive(Clone, Debug, Default)]
pub struct AtomicBatch {
    checks: Vec<Check>,
    mutations: Vec<Mutation>,
}

impl AtomicBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, key: Key, versionstamp: Option<Versionstamp>) -> &mut Self {
        self.checks.push(Check { key, versionstamp });
        self
    }

    pub fn checks(&mut self, checks: impl IntoIterator<Item = Check>) -> &mut Self {
        self.checks.extend(checks);
        self
    }

    pub fn set(&mut self, key: Key, value: Vec<u8>) -> &mut Self {
        self.mutations.push(Mutation::set(key, value));
        self
    }

    pub fn delete(&mut self, key: Key) -> &mut Self {
        self.mutations.push(Mutation::delete(key));
        self
    }

    pub fn mutations(&mut self, mutations: impl IntoIterator<Item = Mutation>) -> &mut Self {
        self.mutations.extend(mutations);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty() && self.mutations.is_empty()
    }

    /// Split into substrate-sized atomic operations, preserving order.
    ///
    /// Fails without side effects when the checks alone, or any single
    /// mutation, cannot fit in one operation.
    pub fn split(self, limits: &BatchLimits) -> Result<Vec<AtomicOperation>, InternalError> {
        if self.checks.len() > limits.max_checks {
            return Err(InternalError::batch_unsupported(format!(
                "batch carries {} checks, limit is {}",
                self.checks.len(),
                limits.max_checks
            )));
        }

        let check_key_bytes = self
            .checks
            .iter()
            .map(|c| c.key.encode().len())
            .sum::<usize>();

        let mut ops = Vec::new();
        let mut current = AtomicOperation {
            checks: self.checks,
            mutations: Vec::new(),
        };
        let mut key_bytes = check_key_bytes;
        let mut size_bytes = 0usize;

        for mutation in self.mutations {
            let m_keys = mutation.key_bytes();
            let m_size = mutation.size_bytes();

            if m_keys > limits.max_key_bytes || m_size > limits.max_mutation_bytes {
                return Err(InternalError::batch_unsupported(format!(
                    "mutation on {} does not fit in one atomic operation ({m_size} bytes)",
                    mutation.key
                )));
            }

            let full = current.mutations.len() + 1 > limits.max_mutations
                || key_bytes + m_keys > limits.max_key_bytes
                || size_bytes + m_size > limits.max_mutation_bytes;
            if full && !current.mutations.is_empty() {
                ops.push(std::mem::take(&mut current));
                key_bytes = 0;
                size_bytes = 0;
            }

            key_bytes += m_keys;
            size_bytes += m_size;
            current.mutations.push(mutation);
        }

        if !current.is_empty() {
            ops.push(current);
        }

        Ok(ops)
    }

    /// Commit every sub-batch in order, stopping at the first failure.
    pub async fn commit(
        self,
        backend: &dyn KvBackend,
        limits: &BatchLimits,
    ) -> Result<BatchOutcome, InternalError> {
        let ops = self.split(limits)?;
        let total = ops.len();

        if total > 1 {
            debug!(batches = total, "splitting logical batch");
            record(MetricsEvent::BatchSplit {
                batches: total as u64,
            });
        }

        let mut versionstamps = Vec::with_capacity(total);
        for (index, op) in ops.into_iter().enumerate() {
            let status = match backend.commit(op).await {
                Ok(status) => status,
                Err(err) => {
                    if index > 0 {
                        report_partial(index, total);
                    }
                    return Err(err.into());
                }
            };

            match status {
                CommitStatus::Committed { versionstamp } => versionstamps.push(versionstamp),
                CommitStatus::CheckFailed => {
                    if index > 0 {
                        report_partial(index, total);
                    }
                    return Ok(BatchOutcome::Failed {
                        committed: index,
                        total,
                    });
                }
            }
        }

        Ok(BatchOutcome::Committed { versionstamps })
    }
}

fn report_partial(committed: usize, total: usize) {
    warn!(
        committed,
        total, "logical batch partially committed; earlier sub-batches stay applied"
    );
    record(MetricsEvent::PartialBatch {
        committed: committed as u64,
        total: total as u64,
    });
}

///
/// TESTS
///
