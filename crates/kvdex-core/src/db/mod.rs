pub mod batch;
pub mod codec;
pub mod collection;
pub mod cursor;
mod document;
mod index;
mod segment;


use crate::{
    KVDEX_KEY_PREFIX,
    config::KvdexConfig,
    error::InternalError,
    key::Key,
    kv::{Consistency, KvBackend, ListRequest},
};
use futures::future::try_join_all;
use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::{debug, info};

// re-exports
pub use batch::{AtomicBatch, BatchOutcome};
pub use codec::{Codec, CodecError, IdentityCodec};
pub use collection::{
    Capability, Collection, CollectionDescriptor, DocumentFilter, IdGenerator, ListOptions, Paged,
    SetOptions, UlidGenerator, UpdateOptions, UpsertTarget,
};
pub use document::{Commit, CommitResult, DeleteOutcome, Document, Rejection};
pub use index::{IndexKind, IndexSpec};
pub use segment::SegmentPointer;

///
/// Database
///
/// Immutable tree of collections sharing one substrate and one config.
/// Built once at startup with [`DatabaseBuilder`] and passed by reference.
///

#[derive(Clone)]
pub struct Database {
    backend: Arc<dyn KvBackend>,
    config: Arc<KvdexConfig>,
    collections: BTreeMap<Vec<String>, Collection>,
}

impl Database {
    #[must_use]
    pub fn builder(backend: impl KvBackend + 'static) -> DatabaseBuilder {
        DatabaseBuilder::new(backend)
    }

    #[must_use]
    pub fn config(&self) -> &KvdexConfig {
        &self.config
    }

    /// Handle to the collection registered under `path`.
    pub fn collection<S: AsRef<str>>(&self, path: &[S]) -> Result<Collection, InternalError> {
        let path: Vec<String> = path.iter().map(|s| s.as_ref().to_string()).collect();

        self.collections.get(&path).cloned().ok_or_else(|| {
            InternalError::collection_unsupported(format!(
                "no collection registered at '{}'",
                path.join(".")
            ))
        })
    }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    /// Number of documents across every collection.
    pub async fn count_all(&self) -> Result<usize, InternalError> {
        let counts = try_join_all(
            self.collections
                .values()
                .map(|c| c.count(ListOptions::default())),
        )
        .await?;

        Ok(counts.into_iter().sum())
    }

    /// Delete every key under the kvdex namespace, including keys of
    /// collections this database does not declare. Returns the number of
    /// keys removed.
    pub async fn delete_all(&self) -> Result<usize, InternalError> {
        let mut request = ListRequest {
            limit: Some(self.config.list_page_size),
            consistency: Consistency::Strong,
            ..ListRequest::prefix(Key::new(vec![KVDEX_KEY_PREFIX.into()]))
        };

        let mut deleted = 0usize;
        loop {
            let page = self.backend.list(&request).await?;

            let mut batch = AtomicBatch::new();
            for entry in &page.entries {
                batch.delete(entry.key.clone());
            }
            deleted += batch.len();

            if !batch.is_empty() {
                let outcome = batch.commit(self.backend.as_ref(), &self.config.limits).await?;
                if !outcome.is_committed() {
                    return Err(InternalError::batch_unsupported(
                        "unconditional delete batch was rejected",
                    ));
                }
            }

            match page.cursor {
                Some(cursor) => request.cursor = Some(cursor),
                None => break,
            }
        }

        info!(deleted, "deleted every kvdex key");

        Ok(deleted)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("collections", &self.collections.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

///
/// DatabaseBuilder
///

pub struct DatabaseBuilder {
    backend: Arc<dyn KvBackend>,
    config: KvdexConfig,
    collections: Vec<(Vec<String>, CollectionDescriptor)>,
}

impl DatabaseBuilder {
    #[must_use]
    pub fn new(backend: impl KvBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
            config: KvdexConfig::default(),
            collections: Vec::new(),
        }
    }

    #[must_use]
    pub fn config(mut self, config: KvdexConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a collection under a dotted hierarchy such as `["users", "archive"]`.
    #[must_use]
    pub fn collection<S: AsRef<str>>(
        mut self,
        path: &[S],
        descriptor: CollectionDescriptor,
    ) -> Self {
        let path = path.iter().map(|s| s.as_ref().to_string()).collect();
        self.collections.push((path, descriptor));
        self
    }

    /// Validate the config and every collection path, then freeze the tree.
    pub fn build(self) -> Result<Database, InternalError> {
        self.config.validate()?;

        for (i, (path, descriptor)) in self.collections.iter().enumerate() {
            check_path(path)?;
            descriptor.check()?;

            // entry plus stale owner per primary index, plus the document key
            let primaries = descriptor
                .indices()
                .iter()
                .filter(|spec| spec.kind == IndexKind::Primary)
                .count();
            let checks = primaries * 2 + 1;
            if checks > self.config.limits.max_checks {
                return Err(InternalError::config(format!(
                    "collection '{}' may need {checks} checks per write, limit is {}",
                    path.join("."),
                    self.config.limits.max_checks
                )));
            }

            for (other, _) in &self.collections[..i] {
                if other == path {
                    return Err(InternalError::config(format!(
                        "collection '{}' is registered twice",
                        path.join(".")
                    )));
                }
                if other.starts_with(path) || path.starts_with(other) {
                    return Err(InternalError::config(format!(
                        "collections '{}' and '{}' are nested",
                        other.join("."),
                        path.join(".")
                    )));
                }
            }
        }

        let config = Arc::new(self.config);
        let collections = self
            .collections
            .into_iter()
            .map(|(path, descriptor)| {
                let collection =
                    Collection::new(&path, descriptor, self.backend.clone(), config.clone());
                (path, collection)
            })
            .collect::<BTreeMap<_, _>>();

        debug!(collections = collections.len(), "database built");

        Ok(Database {
            backend: self.backend,
            config,
            collections,
        })
    }
}

fn check_path(path: &[String]) -> Result<(), InternalError> {
    if path.is_empty() {
        return Err(InternalError::config("collection path must not be empty"));
    }

    for segment in path {
        if segment.is_empty() {
            return Err(InternalError::config(format!(
                "collection path '{}' has an empty segment",
                path.join(".")
            )));
        }
        if segment.starts_with("__") {
            return Err(InternalError::config(format!(
                "collection path segment '{segment}' uses the reserved '__' prefix"
            )));
        }
    }

    Ok(())
}
