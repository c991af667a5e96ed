use crate::{
    db::{
        codec::Codec,
        index::{IndexKind, IndexSpec},
    },
    error::InternalError,
    key::KeyPart,
    value::{DocumentValidator, Value},
};
use std::{collections::BTreeSet, fmt, sync::Arc};
use ulid::Ulid;

///
/// Capability
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Capability {
    Plain,
    PrimaryIndexed,
    SecondaryIndexed,
    Segmented,
    Encoded,
}

///
/// IdGenerator
///
/// Produces ids for documents added without an explicit one.
///

pub trait IdGenerator: Send + Sync {
    fn generate(&self, value: &Value) -> KeyPart;
}

impl<F> IdGenerator for F
where
    F: Fn(&Value) -> KeyPart + Send + Sync,
{
    fn generate(&self, value: &Value) -> KeyPart {
        self(value)
    }
}

///
/// UlidGenerator
///
/// Default generator: lexicographically time-ordered ULID text ids.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct UlidGenerator;

impl IdGenerator for UlidGenerator {
    fn generate(&self, _value: &Value) -> KeyPart {
        KeyPart::Text(Ulid::new().to_string())
    }
}

///
/// CollectionDescriptor
///
/// Static description of one collection, built once at startup. Optional
/// collaborators (indices, segmentation, codec) are composed here rather
/// than by specialising the collection type.
///

#[derive(Clone)]
pub struct CollectionDescriptor {
    pub(crate) indices: Vec<IndexSpec>,
    pub(crate) segmented: bool,
    pub(crate) codec: Option<Arc<dyn Codec>>,
    pub(crate) validator: Option<Arc<dyn DocumentValidator>>,
    pub(crate) id_generator: Arc<dyn IdGenerator>,
}

impl Default for CollectionDescriptor {
    fn default() -> Self {
        Self {
            indices: Vec::new(),
            segmented: false,
            codec: None,
            validator: None,
            id_generator: Arc::new(UlidGenerator),
        }
    }
}

impl CollectionDescriptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn primary_index(mut self, field: impl Into<String>) -> Self {
        self.indices.push(IndexSpec::primary(field));
        self
    }

    #[must_use]
    pub fn secondary_index(mut self, field: impl Into<String>) -> Self {
        self.indices.push(IndexSpec::secondary(field));
        self
    }

    /// Store values larger than one chunk as segments.
    #[must_use]
    pub const fn segmented(mut self) -> Self {
        self.segmented = true;
        self
    }

    #[must_use]
    pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: impl DocumentValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    #[must_use]
    pub fn id_generator(mut self, generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Arc::new(generator);
        self
    }

    #[must_use]
    pub fn indices(&self) -> &[IndexSpec] {
        &self.indices
    }

    #[must_use]
    pub const fn is_segmented(&self) -> bool {
        self.segmented
    }

    #[must_use]
    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }

    #[must_use]
    pub fn capabilities(&self) -> BTreeSet<Capability> {
        let mut caps = BTreeSet::new();

        if self.indices.iter().any(|i| i.kind == IndexKind::Primary) {
            caps.insert(Capability::PrimaryIndexed);
        }
        if self.indices.iter().any(|i| i.kind == IndexKind::Secondary) {
            caps.insert(Capability::SecondaryIndexed);
        }
        if self.segmented {
            caps.insert(Capability::Segmented);
        }
        if self.codec.is_some() {
            caps.insert(Capability::Encoded);
        }
        if caps.is_empty() {
            caps.insert(Capability::Plain);
        }

        caps
    }

    /// Reject descriptors that could not be stored consistently.
    pub(crate) fn check(&self) -> Result<(), InternalError> {
        for (i, spec) in self.indices.iter().enumerate() {
            if spec.field.is_empty() || spec.field.split('.').any(str::is_empty) {
                return Err(InternalError::config(format!(
                    "invalid index field path '{}'",
                    spec.field
                )));
            }
            if self.indices[..i].iter().any(|prior| prior.field == spec.field) {
                return Err(InternalError::config(format!(
                    "field '{}' is indexed more than once",
                    spec.field
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for CollectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionDescriptor")
            .field("indices", &self.indices)
            .field("segmented", &self.segmented)
            .field("codec", &self.codec.as_ref().map(|c| c.name()))
            .field("validator", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}
