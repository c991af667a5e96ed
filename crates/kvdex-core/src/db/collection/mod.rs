//! Collections: one handle type whose behaviour is parameterised by its
//! descriptor (indices, segmentation, codec) instead of by subtype.

mod bulk;
mod descriptor;
mod options;
mod read;
mod write;

#[cfg(test)]
mod tests;

use crate::{
    config::KvdexConfig,
    db::{
        Document,
        codec::Codec,
        index::{DocumentSource, IndexEngine},
        segment::{SegmentEngine, SegmentPointer},
    },
    error::InternalError,
    key::{KeyPart, KeySpace},
    kv::{Consistency, KvBackend},
    serialize::{deserialize, serialize},
    value::{ValidationError, Value, ValueValidator},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

// re-exports
pub use descriptor::{Capability, CollectionDescriptor, IdGenerator, UlidGenerator};
pub use options::{
    DocumentFilter, ListOptions, Paged, SetOptions, UpdateOptions, UpsertTarget,
};

///
/// DocumentEntry
///
/// Stored payload of a document's id key.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub(crate) enum DocumentEntry {
    Inline(#[serde(with = "serde_bytes")] Vec<u8>),
    Segmented(SegmentPointer),
}

impl DocumentEntry {
    pub(crate) const fn pointer(&self) -> Option<&SegmentPointer> {
        match self {
            Self::Inline(_) => None,
            Self::Segmented(pointer) => Some(pointer),
        }
    }
}

///
/// StoredDocument
///
/// A live document together with the raw entry it was read from.
///

#[derive(Clone, Debug)]
pub(crate) struct StoredDocument {
    pub(crate) entry: DocumentEntry,
    pub(crate) document: Document,
}

///
/// Collection
///
/// Cheap-to-clone handle to one collection of a [`crate::db::Database`].
///

#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

struct CollectionInner {
    name: String,
    space: KeySpace,
    descriptor: CollectionDescriptor,
    backend: Arc<dyn KvBackend>,
    config: Arc<KvdexConfig>,
}

impl Collection {
    pub(crate) fn new(
        path: &[String],
        descriptor: CollectionDescriptor,
        backend: Arc<dyn KvBackend>,
        config: Arc<KvdexConfig>,
    ) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                name: path.join("."),
                space: KeySpace::new(path),
                descriptor,
                backend,
                config,
            }),
        }
    }

    /// Dotted collection path, used in logs and metrics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn descriptor(&self) -> &CollectionDescriptor {
        &self.inner.descriptor
    }

    #[must_use]
    pub fn key_space(&self) -> &KeySpace {
        &self.inner.space
    }

    pub(crate) fn backend(&self) -> &dyn KvBackend {
        self.inner.backend.as_ref()
    }

    pub(crate) fn config(&self) -> &KvdexConfig {
        &self.inner.config
    }

    pub(crate) fn consistency(&self, requested: Option<Consistency>) -> Consistency {
        requested.unwrap_or(self.inner.config.consistency)
    }

    pub(crate) fn index(&self) -> IndexEngine<'_> {
        IndexEngine::new(&self.inner.space, &self.inner.descriptor.indices)
    }

    pub(crate) fn segments(&self) -> SegmentEngine<'_> {
        SegmentEngine::new(
            &self.inner.space,
            &self.inner.name,
            self.inner.config.segment_chunk_bytes,
        )
    }

    fn codec(&self) -> Option<&dyn Codec> {
        self.inner.descriptor.codec.as_deref()
    }

    /// Every check a value must pass before any write is attempted.
    pub(crate) fn validate_value(&self, id: &KeyPart, value: &Value) -> Result<(), InternalError> {
        ValueValidator::default().validate(value)?;

        let descriptor = &self.inner.descriptor;
        if descriptor.is_indexed() && value.as_object().is_none() {
            return Err(ValidationError::NotAnObject { kind: value.kind() }.into());
        }
        if let Some(validator) = &descriptor.validator {
            validator.validate(value)?;
        }
        self.index().keys(id, value)?;

        Ok(())
    }

    /// Serialize and encode a value into stored bytes.
    pub(crate) fn encode_value(&self, value: &Value) -> Result<Vec<u8>, InternalError> {
        let bytes = serialize(value)?;

        match self.codec() {
            Some(codec) => Ok(codec.encode(bytes)?),
            None => Ok(bytes),
        }
    }

    /// Invert [`Self::encode_value`]; any failure means the stored data is damaged.
    pub(crate) fn decode_value(
        &self,
        id: &KeyPart,
        bytes: Vec<u8>,
    ) -> Result<Value, InternalError> {
        let bytes = match self.codec() {
            Some(codec) => codec
                .decode(bytes)
                .map_err(|err| self.segments().corrupted(id, err.to_string()))?,
            None => bytes,
        };

        deserialize::<Value>(&bytes).map_err(|err| self.segments().corrupted(id, err.to_string()))
    }
}

#[async_trait]
impl DocumentSource for Collection {
    async fn load(&self, id: &KeyPart) -> Result<Option<Document>, InternalError> {
        self.find(id.clone()).await
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.inner.name)
            .field("descriptor", &self.inner.descriptor)
            .finish_non_exhaustive()
    }
}
