use crate::{
    db::{
        Document,
        collection::{Collection, DocumentEntry, ListOptions, Paged, StoredDocument},
        cursor::{decode_cursor, encode_cursor},
        index::{IndexEntry, IndexKind, IndexSpec},
    },
    error::InternalError,
    key::{KeyPart, KeySpace},
    kv::{Consistency, KvEntry, ListRequest},
    obs::{MetricsEvent, sink::record},
    serialize::deserialize,
    value::Value,
};
use futures::future::join_all;
use tracing::debug;

///
/// ScanSource
///
/// What the keys of a listing point at.
///

#[derive(Clone, Copy)]
pub(super) enum ScanSource<'a> {
    /// Document entries under the id space.
    Documents,
    /// Secondary index entries for one indexed value.
    Secondary {
        spec: &'a IndexSpec,
        part: &'a KeyPart,
    },
}

impl Collection {
    // ------------------------------------------------------------------
    // Point reads
    // ------------------------------------------------------------------

    /// Find a document by id.
    pub async fn find(&self, id: impl Into<KeyPart>) -> Result<Option<Document>, InternalError> {
        let id = id.into();

        Ok(self
            .load_stored(&id, self.consistency(None))
            .await?
            .map(|stored| stored.document))
    }

    /// Find every existing document among `ids`, in request order.
    ///
    /// Keys are fetched in groups of at most `get_many_key_limit`.
    pub async fn find_many<I, K>(&self, ids: I) -> Result<Vec<Document>, InternalError>
    where
        I: IntoIterator<Item = K>,
        K: Into<KeyPart>,
    {
        let consistency = self.consistency(None);
        let ids: Vec<KeyPart> = ids.into_iter().map(Into::into).collect();
        let keys: Vec<_> = ids.iter().map(|id| self.key_space().id_key(id)).collect();

        let limit = self.config().get_many_key_limit.max(1);
        let groups = join_all(
            keys.chunks(limit)
                .map(|group| self.backend().get_many(group, consistency)),
        )
        .await;

        let mut found = Vec::new();
        let mut ids = ids.into_iter();
        for group in groups {
            for entry in group? {
                let Some(id) = ids.next() else {
                    break;
                };
                if let Some(entry) = entry {
                    found.push((id, entry));
                }
            }
        }

        let docs = join_all(
            found
                .into_iter()
                .map(|(id, entry)| self.materialize(id, entry, consistency)),
        )
        .await;

        docs.into_iter()
            .map(|stored| stored.map(|s| s.document))
            .collect()
    }

    /// Find the document owning a primary index value.
    ///
    /// An entry whose document no longer carries the value is stale and
    /// reads as absent.
    pub async fn find_by_primary_index(
        &self,
        index: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Document>, InternalError> {
        let spec = self.index().spec(index, IndexKind::Primary)?;
        let Some(part) = value.into().to_key_part()? else {
            return Ok(None);
        };

        self.find_primary(spec, &part, self.consistency(None)).await
    }

    /// Find every live document whose secondary-indexed field equals `value`.
    pub async fn find_by_secondary_index(
        &self,
        index: &str,
        value: impl Into<Value>,
        options: ListOptions,
    ) -> Result<Paged<Document>, InternalError> {
        let spec = self.index().spec(index, IndexKind::Secondary)?;
        let Some(part) = value.into().to_key_part()? else {
            return Ok(Paged {
                result: Vec::new(),
                cursor: None,
            });
        };

        let request = self.index().secondary_scan(spec, &part);
        self.scan(request, ScanSource::Secondary { spec, part: &part }, &options)
            .await
    }

    // ------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------

    /// List documents in id order.
    pub async fn get_many(&self, options: ListOptions) -> Result<Paged<Document>, InternalError> {
        let request = self.id_scan(&options);

        self.scan(request, ScanSource::Documents, &options).await
    }

    /// First document of a listing.
    pub async fn get_one(&self, options: ListOptions) -> Result<Option<Document>, InternalError> {
        let page = self.get_many(options.limit(1)).await?;

        Ok(page.result.into_iter().next())
    }

    /// Number of documents a listing would return.
    ///
    /// Without a filter only keys are scanned and no value is decoded.
    pub async fn count(&self, options: ListOptions) -> Result<usize, InternalError> {
        if options.filter.is_some() {
            return Ok(self.get_many(options).await?.len());
        }

        let limit = options.limit.unwrap_or(usize::MAX);
        let mut request = self.id_scan(&options);
        request.consistency = self.consistency(options.consistency);
        request.reverse = options.reverse;
        request.cursor = options.cursor.as_deref().map(decode_cursor).transpose()?;

        let mut count = 0usize;
        while count < limit {
            request.limit = Some(self.config().list_page_size.min(limit - count));
            let page = self.backend().list(&request).await?;
            count += page.entries.len();

            match page.cursor {
                Some(cursor) => request.cursor = Some(cursor),
                None => break,
            }
        }

        Ok(count.min(limit))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    pub(super) fn id_scan(&self, options: &ListOptions) -> ListRequest {
        let space = self.key_space();

        ListRequest {
            start: options.start.as_ref().map(|id| space.id_key(id)),
            end: options.end.as_ref().map(|id| space.id_key(id)),
            ..ListRequest::prefix(space.id_prefix())
        }
    }

    /// Drive a listing page by page until `limit` documents were accepted.
    ///
    /// The returned cursor is the position of the last consumed entry, so a
    /// scan can stop in the middle of a substrate page and resume exactly.
    pub(super) async fn scan(
        &self,
        mut request: ListRequest,
        source: ScanSource<'_>,
        options: &ListOptions,
    ) -> Result<Paged<Document>, InternalError> {
        let consistency = self.consistency(options.consistency);
        let limit = options.limit.unwrap_or(usize::MAX);
        let page_size = self.config().list_page_size;

        request.consistency = consistency;
        request.reverse = options.reverse;
        request.cursor = options.cursor.as_deref().map(decode_cursor).transpose()?;

        let mut result = Vec::new();
        if limit == 0 {
            return Ok(Paged {
                result,
                cursor: options.cursor.clone(),
            });
        }

        loop {
            request.limit = Some(if options.filter.is_some() {
                page_size
            } else {
                page_size.min(limit - result.len())
            });

            let page = self.backend().list(&request).await?;
            let positions: Vec<Vec<u8>> = page.entries.iter().map(|e| e.key.encode()).collect();
            let resolved = join_all(
                page.entries
                    .into_iter()
                    .map(|entry| self.resolve(source, entry, consistency)),
            )
            .await;

            let consumed = resolved.len();
            for (i, doc) in resolved.into_iter().enumerate() {
                if let Some(doc) = doc? {
                    if options.accepts(&doc) {
                        result.push(doc);
                    }
                }

                if result.len() >= limit {
                    let more = i + 1 < consumed || page.cursor.is_some();
                    return Ok(Paged {
                        result,
                        cursor: more.then(|| encode_cursor(&positions[i])),
                    });
                }
            }

            match page.cursor {
                Some(cursor) => request.cursor = Some(cursor),
                None => break,
            }
        }

        Ok(Paged {
            result,
            cursor: None,
        })
    }

    /// Turn one listed entry into a live document, skipping stale index entries.
    async fn resolve(
        &self,
        source: ScanSource<'_>,
        entry: KvEntry,
        consistency: Consistency,
    ) -> Result<Option<Document>, InternalError> {
        match source {
            ScanSource::Documents => {
                let id = KeySpace::document_id(&entry.key).cloned().ok_or_else(|| {
                    InternalError::store_corruption(format!(
                        "document key {} carries no id",
                        entry.key
                    ))
                })?;

                Ok(Some(self.materialize(id, entry, consistency).await?.document))
            }
            ScanSource::Secondary { spec, part } => {
                let id = IndexEntry::decode(&entry.value)?;
                match self.load_stored(&id, consistency).await? {
                    Some(stored) if spec.matches(&stored.document, part) => {
                        Ok(Some(stored.document))
                    }
                    _ => {
                        self.stale_index(spec, part, &id);
                        Ok(None)
                    }
                }
            }
        }
    }

    pub(super) async fn find_primary(
        &self,
        spec: &IndexSpec,
        part: &KeyPart,
        consistency: Consistency,
    ) -> Result<Option<Document>, InternalError> {
        let Some(id) = self
            .index()
            .primary_owner(self.backend(), spec, part, consistency)
            .await?
        else {
            return Ok(None);
        };

        match self.load_stored(&id, consistency).await? {
            Some(stored) if spec.matches(&stored.document, part) => Ok(Some(stored.document)),
            _ => {
                self.stale_index(spec, part, &id);
                Ok(None)
            }
        }
    }

    fn stale_index(&self, spec: &IndexSpec, part: &KeyPart, id: &KeyPart) {
        debug!(
            collection = self.name(),
            index = %spec.field,
            value = %part,
            %id,
            "skipping stale index entry"
        );
        record(MetricsEvent::StaleIndexSkipped {
            collection: self.name(),
        });
    }

    /// Read and decode the current entry of `id`.
    pub(crate) async fn load_stored(
        &self,
        id: &KeyPart,
        consistency: Consistency,
    ) -> Result<Option<StoredDocument>, InternalError> {
        let key = self.key_space().id_key(id);

        match self.backend().get(&key, consistency).await? {
            Some(entry) => Ok(Some(self.materialize(id.clone(), entry, consistency).await?)),
            None => Ok(None),
        }
    }

    /// Decode a raw document entry, reassembling segments when needed.
    pub(crate) async fn materialize(
        &self,
        id: KeyPart,
        entry: KvEntry,
        consistency: Consistency,
    ) -> Result<StoredDocument, InternalError> {
        let stored: DocumentEntry = deserialize(&entry.value)
            .map_err(|err| self.segments().corrupted(&id, err.to_string()))?;

        let bytes = match &stored {
            DocumentEntry::Inline(bytes) => bytes.clone(),
            DocumentEntry::Segmented(pointer) => {
                self.segments()
                    .read(
                        self.backend(),
                        self.config().get_many_key_limit,
                        consistency,
                        &id,
                        pointer,
                    )
                    .await?
            }
        };
        let value = self.decode_value(&id, bytes)?;

        Ok(StoredDocument {
            entry: stored,
            document: Document {
                id,
                value,
                versionstamp: entry.versionstamp,
            },
        })
    }
}
