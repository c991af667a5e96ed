//! End-to-end scenarios through the public API only.

use async_trait::async_trait;
use kvdex_core::{
    config::KvdexConfig,
    db::{CollectionDescriptor, Database, ListOptions, Rejection, SetOptions},
    key::Key,
    kv::{
        AtomicOperation, BackendError, CommitStatus, Consistency, KvBackend, KvEntry, ListPage,
        ListRequest, MemoryKv,
    },
    value::Value,
};
use serde_json::json;
use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

fn doc(json: serde_json::Value) -> Value {
    Value::from_serialize(&json).unwrap()
}

///
/// Flaky
///
/// Fails exactly one commit, counted from the first.
///

struct Flaky {
    inner: MemoryKv,
    commits: AtomicU32,
    fail_on: u32,
}

impl Flaky {
    fn new(fail_on: u32) -> Self {
        Self {
            inner: MemoryKv::new(),
            commits: AtomicU32::new(0),
            fail_on,
        }
    }
}

#[async_trait]
impl KvBackend for Flaky {
    async fn get(
        &self,
        key: &Key,
        consistency: Consistency,
    ) -> Result<Option<KvEntry>, BackendError> {
        self.inner.get(key, consistency).await
    }

    async fn commit(&self, op: AtomicOperation) -> Result<CommitStatus, BackendError> {
        if self.commits.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            return Err(BackendError::Unavailable("injected".to_string()));
        }

        self.inner.commit(op).await
    }

    async fn list(&self, request: &ListRequest) -> Result<ListPage, BackendError> {
        self.inner.list(request).await
    }
}

#[tokio::test]
async fn set_find_and_overwrite_through_a_database() {
    let db = Database::builder(MemoryKv::new())
        .collection(&["app", "notes"], CollectionDescriptor::new())
        .build()
        .unwrap();
    let notes = db.collection(&["app", "notes"]).unwrap();

    let first = doc(json!({ "title": "draft", "tags": ["a", "b"], "pinned": false }));
    let created = notes
        .set("n1", first.clone(), SetOptions::default())
        .await
        .unwrap();
    assert_eq!(notes.find("n1").await.unwrap().unwrap().value, first);

    let again = notes
        .set("n1", first.clone(), SetOptions::default())
        .await
        .unwrap();
    assert_eq!(again.rejection(), Some(&Rejection::IdCollision));

    let second = doc(json!({ "title": "final" }));
    let replaced = notes.write("n1", second.clone()).await.unwrap();
    let found = notes.find("n1").await.unwrap().unwrap();

    assert_eq!(found.value, second);
    assert_ne!(created.versionstamp(), replaced.versionstamp());
    assert_eq!(Some(found.versionstamp), replaced.versionstamp());
}

#[tokio::test]
async fn concurrent_primary_index_claims_have_one_winner() {
    let db = Database::builder(MemoryKv::new())
        .collection(&["users"], CollectionDescriptor::new().primary_index("email"))
        .build()
        .unwrap();
    let users = db.collection(&["users"]).unwrap();

    let (a, b) = tokio::join!(
        users.add(doc(json!({ "email": "ada@example.com", "name": "Ada" }))),
        users.add(doc(json!({ "email": "ada@example.com", "name": "Imposter" }))),
    );
    let results = [a.unwrap(), b.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(users.count(ListOptions::default()).await.unwrap(), 1);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let db = Database::builder(MemoryKv::new())
        .collection(&["users"], CollectionDescriptor::new().secondary_index("role"))
        .build()
        .unwrap();
    let users = db.collection(&["users"]).unwrap();
    users
        .set("u1", doc(json!({ "role": "admin" })), SetOptions::default())
        .await
        .unwrap();

    assert!(users.delete("u1").await.unwrap().is_deleted());
    let twice = users.delete("u1").await.unwrap();

    assert!(twice.is_ok());
    assert!(!twice.is_deleted());
    assert_eq!(db.count_all().await.unwrap(), 0);
}

#[tokio::test]
async fn failed_chunk_batch_leaves_nothing_behind() {
    let config = KvdexConfig::from_toml_str(
        r"
        segment_chunk_bytes = 64

        [limits]
        max_mutations = 3
        ",
    )
    .unwrap();
    let backend = Arc::new(Flaky::new(2));
    let db = Database::builder(backend.clone())
        .config(config)
        .collection(&["files"], CollectionDescriptor::new().segmented())
        .build()
        .unwrap();
    let files = db.collection(&["files"]).unwrap();

    let body = doc(json!({ "body": "x".repeat(600) }));
    assert!(files.write("big", body.clone()).await.is_err());
    assert!(backend.inner.is_empty());

    // the outage was a single commit
    assert!(files.write("big", body.clone()).await.unwrap().is_ok());
    assert_eq!(files.find("big").await.unwrap().unwrap().value, body);
}
