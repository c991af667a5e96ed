use crate::{
    db::Document,
    key::KeyPart,
    kv::Consistency,
    value::{UpdateStrategy, Value},
};
use std::{fmt, sync::Arc};

///
/// DocumentFilter
///

pub type DocumentFilter = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

///
/// ListOptions
///
/// Scan options shared by every listing, bulk and secondary-index operation.
/// `start`/`end` bound id scans to `[start, end)` and are ignored by
/// secondary-index scans.
///

#[derive(Clone, Default)]
pub struct ListOptions {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    pub reverse: bool,
    pub consistency: Option<Consistency>,
    pub start: Option<KeyPart>,
    pub end: Option<KeyPart>,
    pub filter: Option<DocumentFilter>,
}

impl ListOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    #[must_use]
    pub const fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    #[must_use]
    pub const fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = Some(consistency);
        self
    }

    #[must_use]
    pub fn start(mut self, id: impl Into<KeyPart>) -> Self {
        self.start = Some(id.into());
        self
    }

    #[must_use]
    pub fn end(mut self, id: impl Into<KeyPart>) -> Self {
        self.end = Some(id.into());
        self
    }

    #[must_use]
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub(crate) fn accepts(&self, doc: &Document) -> bool {
        self.filter.as_ref().is_none_or(|f| f(doc))
    }
}

impl fmt::Debug for ListOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListOptions")
            .field("limit", &self.limit)
            .field("cursor", &self.cursor)
            .field("reverse", &self.reverse)
            .field("consistency", &self.consistency)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

///
/// Paged
///
/// One page of scan results. `cursor` resumes the scan after the last
/// consumed entry and is `None` once the scan is exhausted.
///

#[derive(Clone, Debug)]
pub struct Paged<T> {
    pub result: Vec<T>,
    pub cursor: Option<String>,
}

impl<T> Paged<T> {
    #[must_use]
    pub const fn len(&self) -> usize {
        self.result.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.result.is_empty()
    }
}

///
/// SetOptions
///

#[derive(Clone, Copy, Debug, Default)]
pub struct SetOptions {
    /// Replace an existing document instead of rejecting with `IdCollision`.
    pub overwrite: bool,
    /// Retries after the first attempt; the configured default when `None`.
    pub retry: Option<u32>,
}

impl SetOptions {
    #[must_use]
    pub const fn overwrite() -> Self {
        Self {
            overwrite: true,
            retry: None,
        }
    }
}

///
/// UpdateOptions
///

#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateOptions {
    /// The configured default strategy when `None`.
    pub strategy: Option<UpdateStrategy>,
    pub retry: Option<u32>,
}

impl UpdateOptions {
    #[must_use]
    pub const fn strategy(strategy: UpdateStrategy) -> Self {
        Self {
            strategy: Some(strategy),
            retry: None,
        }
    }
}

///
/// UpsertTarget
///

#[derive(Clone, Debug, PartialEq)]
pub enum UpsertTarget {
    /// Upsert by document id.
    Id(KeyPart),
    /// Upsert the document owning a primary index value; a new document
    /// gets a generated id.
    PrimaryIndex { index: String, value: Value },
}
