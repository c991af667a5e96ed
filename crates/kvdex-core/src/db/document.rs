use crate::{key::KeyPart, kv::Versionstamp, obs::RejectKind, value::Value};
use std::fmt;

///
/// Document
///
/// One live document as read back from a collection.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: KeyPart,
    pub value: Value,
    pub versionstamp: Versionstamp,
}

impl Document {
    /// Field lookup on the document value (dotted paths supported).
    #[must_use]
    pub fn field(&self, path: &str) -> Option<&Value> {
        self.value.get_path(path)
    }
}

///
/// Commit
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Commit {
    pub id: KeyPart,
    pub versionstamp: Versionstamp,
}

///
/// Rejection
///
/// Expected, non-exceptional reason a write did not commit.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Rejection {
    /// Create-only write on an id that already holds a document.
    IdCollision,

    /// A primary-indexed field value is owned by another live document.
    IndexCollision { index: String },

    /// Every attempt lost an optimistic-concurrency race.
    Conflict { attempts: u32 },

    /// The targeted document does not exist.
    NotFound,
}

impl Rejection {
    pub(crate) const fn kind(&self) -> RejectKind {
        match self {
            Self::IdCollision => RejectKind::IdCollision,
            Self::IndexCollision { .. } => RejectKind::IndexCollision,
            Self::Conflict { .. } => RejectKind::Conflict,
            Self::NotFound => RejectKind::NotFound,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdCollision => f.write_str("id collision"),
            Self::IndexCollision { index } => write!(f, "primary index collision on '{index}'"),
            Self::Conflict { attempts } => write!(f, "write conflict after {attempts} attempts"),
            Self::NotFound => f.write_str("document not found"),
        }
    }
}

///
/// CommitResult
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CommitResult {
    Ok(Commit),
    Rejected(Rejection),
}

impl CommitResult {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    #[must_use]
    pub const fn commit(&self) -> Option<&Commit> {
        match self {
            Self::Ok(commit) => Some(commit),
            Self::Rejected(_) => None,
        }
    }

    #[must_use]
    pub const fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Ok(_) => None,
            Self::Rejected(rejection) => Some(rejection),
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<&KeyPart> {
        self.commit().map(|c| &c.id)
    }

    #[must_use]
    pub fn versionstamp(&self) -> Option<Versionstamp> {
        self.commit().map(|c| c.versionstamp)
    }
}

///
/// DeleteOutcome
///
/// Deleting an absent document is a successful no-op.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeleteOutcome {
    Deleted(Commit),
    Absent,
    Rejected(Rejection),
}

impl DeleteOutcome {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted(_))
    }
}
