use crate::{
    key::{KeyDecodeError, KeyPart},
    kv::BackendError,
    value::ValidationError,
};
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Expected write outcomes (collisions, exhausted retries) never travel
/// through this type; they are reported as [`crate::db::CommitResult`].
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    /// Construct an InternalError without structured detail.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct a segment-origin corruption error for one document.
    pub(crate) fn corrupted_document(id: &KeyPart, reason: impl Into<String>) -> Self {
        let reason = reason.into();

        Self {
            class: ErrorClass::Corruption,
            origin: ErrorOrigin::Segment,
            message: format!("corrupted document data ({id}): {reason}"),
            detail: Some(ErrorDetail::CorruptedDocument {
                id: id.clone(),
                reason,
            }),
        }
    }

    /// Construct a store-origin corruption error for an undecodable entry.
    pub(crate) fn store_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Store, message)
    }

    /// Construct an index-origin corruption error.
    pub(crate) fn index_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Index, message)
    }

    /// Construct an index-origin unsupported error.
    pub(crate) fn index_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Index, message)
    }

    /// Construct a collection-origin unsupported error.
    pub(crate) fn collection_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Collection, message)
    }

    /// Construct a batch-origin unsupported error.
    pub(crate) fn batch_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Batch, message)
    }

    /// Construct a config-origin error.
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Config, message)
    }

    /// Construct a serialize-origin internal error.
    pub(crate) fn serialize_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Serialize, message)
    }

    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self.class, ErrorClass::Corruption)
    }

    #[must_use]
    pub const fn is_corrupted_document(&self) -> bool {
        matches!(self.detail, Some(ErrorDetail::CorruptedDocument { .. }))
    }

    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self.class, ErrorClass::Validation)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

impl From<ValidationError> for InternalError {
    fn from(err: ValidationError) -> Self {
        Self {
            class: ErrorClass::Validation,
            origin: ErrorOrigin::Collection,
            message: err.to_string(),
            detail: Some(ErrorDetail::Validation(err)),
        }
    }
}

impl From<BackendError> for InternalError {
    fn from(err: BackendError) -> Self {
        let class = match err {
            BackendError::LimitExceeded { .. } => ErrorClass::Unsupported,
            _ => ErrorClass::Internal,
        };

        Self {
            class,
            origin: ErrorOrigin::Backend,
            message: err.to_string(),
            detail: Some(ErrorDetail::Backend(err)),
        }
    }
}

impl From<KeyDecodeError> for InternalError {
    fn from(err: KeyDecodeError) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Key, err.to_string())
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("corrupted document {id}: {reason}")]
    CorruptedDocument { id: KeyPart, reason: String },

    #[error("{0}")]
    Validation(ValidationError),

    #[error("{0}")]
    Backend(BackendError),
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Corruption,
    Validation,
    Internal,
    Conflict,
    Unsupported,
    InvariantViolation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Corruption => "corruption",
            Self::Validation => "validation",
            Self::Internal => "internal",
            Self::Conflict => "conflict",
            Self::Unsupported => "unsupported",
            Self::InvariantViolation => "invariant_violation",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Serialize,
    Key,
    Backend,
    Batch,
    Store,
    Index,
    Segment,
    Collection,
    Config,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Serialize => "serialize",
            Self::Key => "key",
            Self::Backend => "backend",
            Self::Batch => "batch",
            Self::Store => "store",
            Self::Index => "index",
            Self::Segment => "segment",
            Self::Collection => "collection",
            Self::Config => "config",
        };
        write!(f, "{label}")
    }
}
