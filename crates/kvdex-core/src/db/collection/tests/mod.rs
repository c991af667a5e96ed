
use super::*;
use crate::{
    config::KvdexConfig,
    db::{CommitResult, Database, Rejection, index::IndexEntry},
    error::ErrorClass,
    kv::{AtomicOperation, MemoryKv},
};
use std::collections::BTreeSet;

fn database(
    kv: &Arc<MemoryKv>,
    descriptor: CollectionDescriptor,
    config: KvdexConfig,
) -> Collection {
    Database::builder(kv.clone())
        .config(config)
        .collection(&["things"], descriptor)
        .build()
        .unwrap()
        .collection(&["things"])
        .unwrap()
}

fn small_chunks() -> KvdexConfig {
    KvdexConfig {
        segment_chunk_bytes: 64,
        ..KvdexConfig::default()
    }
}

fn blob(len: usize) -> Value {
    Value::object([("data", Value::Bytes(vec![7; len]))])
}

async fn raw_entry(kv: &MemoryKv, collection: &Collection, id: &str) -> DocumentEntry {
    let key = collection.key_space().id_key(&KeyPart::from(id));
    let entry = kv.get(&key, Consistency::Strong).await.unwrap().unwrap();

    deserialize(&entry.value).unwrap()
}

#[test]
fn capabilities_reflect_the_descriptor() {
    assert_eq!(
        CollectionDescriptor::new().capabilities(),
        BTreeSet::from([Capability::Plain])
    );

    let caps = CollectionDescriptor::new()
        .primary_index("email")
        .secondary_index("team")
        .segmented()
        .codec(crate::db::IdentityCodec)
        .capabilities();
    assert_eq!(
        caps,
        BTreeSet::from([
            Capability::PrimaryIndexed,
            Capability::SecondaryIndexed,
            Capability::Segmented,
            Capability::Encoded,
        ])
    );
}

#[test]
fn descriptor_rejects_duplicate_and_empty_index_fields() {
    assert!(
        CollectionDescriptor::new()
            .primary_index("email")
            .secondary_index("email")
            .check()
            .is_err()
    );
    assert!(CollectionDescriptor::new().secondary_index("a..b").check().is_err());
}

#[tokio::test]
async fn set_find_and_overwrite() {
    let kv = Arc::new(MemoryKv::new());
    let things = database(&kv, CollectionDescriptor::new(), KvdexConfig::default());
    let value = Value::object([("n", Value::from(1))]);

    let first = things.set("a", value.clone(), SetOptions::default()).await.unwrap();
    assert!(first.is_ok());

    let found = things.find("a").await.unwrap().unwrap();
    assert_eq!(found.value, value);
    assert_eq!(Some(found.versionstamp), first.versionstamp());

    let again = things.set("a", value.clone(), SetOptions::default()).await.unwrap();
    assert_eq!(again, CommitResult::Rejected(Rejection::IdCollision));

    let second = things.write("a", Value::from("replaced")).await.unwrap();
    assert!(second.versionstamp() > first.versionstamp());
    assert_eq!(
        things.find("a").await.unwrap().unwrap().value,
        Value::from("replaced")
    );
}

#[tokio::test]
async fn indexed_collections_require_objects() {
    let kv = Arc::new(MemoryKv::new());
    let things = database(
        &kv,
        CollectionDescriptor::new().secondary_index("team"),
        KvdexConfig::default(),
    );

    let err = things.add(Value::from("loose")).await.unwrap_err();

    assert_eq!(err.class, ErrorClass::Validation);
    assert!(kv.is_empty());
}

#[tokio::test]
async fn float_values_index_and_identify_documents() {
    let kv = Arc::new(MemoryKv::new());
    let scores = database(
        &kv,
        CollectionDescriptor::new()
            .primary_index("ratio")
            .secondary_index("score"),
        KvdexConfig::default(),
    );

    for (id, score, ratio) in [("a", 1.5, 0.25), ("b", 1.5, -0.5), ("c", 2.0, 0.75)] {
        let value = Value::object([("score", Value::from(score)), ("ratio", Value::from(ratio))]);
        assert!(scores.set(id, value, SetOptions::default()).await.unwrap().is_ok());
    }

    let found = scores
        .find_by_secondary_index("score", 1.5, ListOptions::default())
        .await
        .unwrap();
    let ids: Vec<_> = found.result.into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![KeyPart::from("a"), KeyPart::from("b")]);

    let owner = scores.find_by_primary_index("ratio", -0.5).await.unwrap().unwrap();
    assert_eq!(owner.id, KeyPart::from("b"));

    let clash = scores
        .set("d", Value::object([("ratio", Value::from(0.25))]), SetOptions::default())
        .await
        .unwrap();
    assert!(matches!(clash.rejection(), Some(Rejection::IndexCollision { .. })));

    let id = KeyPart::float(3.25).unwrap();
    scores
        .set(id.clone(), Value::object([("score", Value::from(9.0))]), SetOptions::default())
        .await
        .unwrap();
    let doc = scores.find(id).await.unwrap().unwrap();
    assert_eq!(doc.value.get("score"), Some(&Value::from(9.0)));
}

#[tokio::test]
async fn custom_validator_runs_before_writing() {
    let kv = Arc::new(MemoryKv::new());
    let descriptor = CollectionDescriptor::new().validator(|value: &Value| {
        if value.get("n").and_then(Value::as_int).is_some_and(|n| n >= 0) {
            Ok(())
        } else {
            Err(ValidationError::custom("n must be non-negative"))
        }
    });
    let things = database(&kv, descriptor, KvdexConfig::default());

    assert!(things.add(Value::object([("n", Value::from(1))])).await.unwrap().is_ok());
    assert!(things.add(Value::object([("n", Value::from(-1))])).await.is_err());
    assert_eq!(things.count(ListOptions::default()).await.unwrap(), 1);
}

#[tokio::test]
async fn only_oversized_values_are_segmented() {
    let kv = Arc::new(MemoryKv::new());
    let things = database(&kv, CollectionDescriptor::new().segmented(), small_chunks());

    things.write("small", blob(8)).await.unwrap();
    things.write("large", blob(500)).await.unwrap();

    assert!(matches!(raw_entry(&kv, &things, "small").await, DocumentEntry::Inline(_)));
    let DocumentEntry::Segmented(pointer) = raw_entry(&kv, &things, "large").await else {
        panic!("expected a segmented entry");
    };
    assert!(pointer.ids.len() > 1);
    assert_eq!(things.find("large").await.unwrap().unwrap().value, blob(500));
}

#[tokio::test]
async fn overwriting_a_segmented_document_reclaims_old_chunks() {
    let kv = Arc::new(MemoryKv::new());
    let things = database(&kv, CollectionDescriptor::new().segmented(), small_chunks());
    let prefix = things.key_space().segment_prefix(&KeyPart::from("doc"));

    things.write("doc", blob(600)).await.unwrap();
    things.write("doc", blob(300)).await.unwrap();

    let DocumentEntry::Segmented(pointer) = raw_entry(&kv, &things, "doc").await else {
        panic!("expected a segmented entry");
    };
    assert_eq!(kv.keys_with_prefix(&prefix).len(), pointer.ids.len());

    things.write("doc", blob(4)).await.unwrap();
    assert!(kv.keys_with_prefix(&prefix).is_empty());

    things.delete("doc").await.unwrap();
    assert!(kv.is_empty());
}

#[tokio::test]
async fn listing_pages_resume_from_the_cursor() {
    let kv = Arc::new(MemoryKv::new());
    let things = database(
        &kv,
        CollectionDescriptor::new(),
        KvdexConfig {
            list_page_size: 3,
            ..KvdexConfig::default()
        },
    );
    for i in 0..10 {
        things.set(i, Value::from(i), SetOptions::default()).await.unwrap();
    }

    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let mut options = ListOptions::new().limit(4);
        if let Some(token) = cursor.take() {
            options = options.cursor(token);
        }
        let page = things.get_many(options).await.unwrap();
        seen.extend(page.result.iter().map(|d| d.id.clone()));

        match page.cursor {
            Some(token) => cursor = Some(token),
            None => break,
        }
    }

    assert_eq!(seen, (0..10).map(KeyPart::from).collect::<Vec<_>>());

    let reversed = things.get_many(ListOptions::new().reverse().limit(2)).await.unwrap();
    let ids: Vec<_> = reversed.result.iter().map(|d| d.id.clone()).collect();
    assert_eq!(ids, vec![KeyPart::from(9), KeyPart::from(8)]);
    assert!(reversed.cursor.is_some());
}

#[tokio::test]
async fn id_range_and_filter_narrow_listings() {
    let kv = Arc::new(MemoryKv::new());
    let things = database(&kv, CollectionDescriptor::new(), KvdexConfig::default());
    for i in 0..10 {
        things.set(i, Value::from(i), SetOptions::default()).await.unwrap();
    }

    let ranged = ListOptions::new().start(3).end(7);
    assert_eq!(things.count(ranged.clone()).await.unwrap(), 4);

    let even = ranged.filter(|doc| doc.value.as_int().is_some_and(|n| n % 2 == 0));
    let docs = things.get_many(even.clone()).await.unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(things.count(even).await.unwrap(), 2);

    let first = things.get_one(ListOptions::new().start(5)).await.unwrap().unwrap();
    assert_eq!(first.id, KeyPart::from(5));
}

#[tokio::test]
async fn stale_secondary_entries_are_skipped() {
    let kv = Arc::new(MemoryKv::new());
    let things = database(
        &kv,
        CollectionDescriptor::new().secondary_index("team"),
        KvdexConfig::default(),
    );
    things
        .set("live", Value::object([("team", Value::from("red"))]), SetOptions::default())
        .await
        .unwrap();

    let ghost = KeyPart::from("ghost");
    let key = things
        .key_space()
        .secondary_index_key("team", &KeyPart::from("red"), &ghost);
    kv.commit(AtomicOperation::new().set(key, IndexEntry::encode(&ghost).unwrap()))
        .await
        .unwrap();

    let page = things
        .find_by_secondary_index("team", "red", ListOptions::default())
        .await
        .unwrap();

    assert_eq!(page.len(), 1);
    assert_eq!(page.result[0].id, KeyPart::from("live"));
}

#[tokio::test]
async fn corrupted_entry_surfaces_as_corruption() {
    let kv = Arc::new(MemoryKv::new());
    let things = database(&kv, CollectionDescriptor::new(), KvdexConfig::default());
    let key = things.key_space().id_key(&KeyPart::from("bad"));
    kv.commit(AtomicOperation::new().set(key, vec![0xff, 0x00]))
        .await
        .unwrap();

    let err = things.find("bad").await.unwrap_err();
    assert!(err.is_corrupted_document());

    // deleting it still works
    assert!(things.delete("bad").await.unwrap().is_deleted());
    assert!(kv.is_empty());
}
