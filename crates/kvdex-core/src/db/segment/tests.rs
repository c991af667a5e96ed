use super::*;
use crate::{
    error::{ErrorClass, ErrorDetail},
    kv::{AtomicOperation, MemoryKv},
};
use futures::executor::block_on;
use proptest::prelude::*;

const CHUNK: usize = 16;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| u8::try_from(i % 251).unwrap()).collect()
}

#[test]
fn should_segment_only_past_one_chunk() {
    let space = KeySpace::new(&["files"]);
    let engine = SegmentEngine::new(&space, "files", CHUNK);

    assert!(!engine.should_segment(CHUNK));
    assert!(engine.should_segment(CHUNK + 1));
}

#[test]
fn stage_splits_into_ordered_chunks() {
    let space = KeySpace::new(&["files"]);
    let engine = SegmentEngine::new(&space, "files", CHUNK);
    let id = KeyPart::from("doc");
    let mut batch = AtomicBatch::new();

    let pointer = engine.stage(&id, &payload(CHUNK * 2 + 3), &mut batch);

    assert_eq!(pointer.ids, vec![0, 1, 2]);
    assert_eq!(pointer.len, (CHUNK * 2 + 3) as u64);
    assert_eq!(pointer.digest.len(), 32);
    assert_eq!(batch.len(), 3);
}

#[test]
fn every_stage_uses_a_fresh_generation() {
    let space = KeySpace::new(&["files"]);
    let engine = SegmentEngine::new(&space, "files", CHUNK);
    let id = KeyPart::from("doc");

    let a = engine.stage(&id, &payload(40), &mut AtomicBatch::new());
    let b = engine.stage(&id, &payload(40), &mut AtomicBatch::new());

    assert_ne!(a.generation, b.generation);
}

#[tokio::test]
async fn write_then_read_round_trips() {
    let kv = MemoryKv::new();
    let space = KeySpace::new(&["files"]);
    let engine = SegmentEngine::new(&space, "files", CHUNK);
    let id = KeyPart::from("doc");
    let bytes = payload(CHUNK * 5 + 1);

    let pointer = engine
        .write(&kv, &BatchLimits::default(), &id, &bytes)
        .await
        .unwrap()
        .unwrap();
    let read = engine
        .read(&kv, 2, Consistency::Strong, &id, &pointer)
        .await
        .unwrap();

    assert_eq!(read, bytes);
    assert_eq!(kv.keys_with_prefix(&space.segment_prefix(&id)).len(), 6);
}

#[tokio::test]
async fn missing_chunk_is_corruption() {
    let kv = MemoryKv::new();
    let space = KeySpace::new(&["files"]);
    let engine = SegmentEngine::new(&space, "files", CHUNK);
    let id = KeyPart::from("doc");

    let pointer = engine
        .write(&kv, &BatchLimits::default(), &id, &payload(CHUNK * 3))
        .await
        .unwrap()
        .unwrap();
    let victim = space.segment_key(&id, &pointer.generation, 1);
    kv.commit(AtomicOperation::new().delete(victim)).await.unwrap();

    let err = engine
        .read(&kv, 10, Consistency::Strong, &id, &pointer)
        .await
        .unwrap_err();

    assert_eq!(err.class, ErrorClass::Corruption);
    assert!(matches!(
        err.detail,
        Some(ErrorDetail::CorruptedDocument { .. })
    ));
}

#[tokio::test]
async fn tampered_chunk_fails_the_digest() {
    let kv = MemoryKv::new();
    let space = KeySpace::new(&["files"]);
    let engine = SegmentEngine::new(&space, "files", CHUNK);
    let id = KeyPart::from("doc");

    let pointer = engine
        .write(&kv, &BatchLimits::default(), &id, &payload(CHUNK * 2))
        .await
        .unwrap()
        .unwrap();
    let victim = space.segment_key(&id, &pointer.generation, 0);
    kv.commit(AtomicOperation::new().set(victim, vec![0xaa; CHUNK]))
        .await
        .unwrap();

    let err = engine
        .read(&kv, 10, Consistency::Strong, &id, &pointer)
        .await
        .unwrap_err();

    assert!(err.is_corrupted_document());
    assert!(err.message.contains("digest"));
}

#[tokio::test]
async fn reclaim_removes_only_one_generation() {
    let kv = MemoryKv::new();
    let space = KeySpace::new(&["files"]);
    let engine = SegmentEngine::new(&space, "files", CHUNK);
    let id = KeyPart::from("doc");
    let limits = BatchLimits::default();

    let old = engine.write(&kv, &limits, &id, &payload(40)).await.unwrap().unwrap();
    let new = engine.write(&kv, &limits, &id, &payload(50)).await.unwrap().unwrap();
    engine.reclaim(&kv, &limits, &id, &old).await.unwrap();

    assert_eq!(
        kv.keys_with_prefix(&space.segment_prefix(&id)).len(),
        new.ids.len()
    );
    assert!(engine.read(&kv, 10, Consistency::Strong, &id, &new).await.is_ok());
}

proptest! {
    #[test]
    fn any_payload_reassembles(
        bytes in prop::collection::vec(any::<u8>(), 1..200),
        chunk in 1usize..40,
    ) {
        let kv = MemoryKv::new();
        let space = KeySpace::new(&["files"]);
        let engine = SegmentEngine::new(&space, "files", chunk);
        let id = KeyPart::from(7);

        let pointer = block_on(engine.write(&kv, &BatchLimits::default(), &id, &bytes))
            .unwrap()
            .unwrap();
        let read = block_on(engine.read(&kv, 3, Consistency::Strong, &id, &pointer)).unwrap();

        prop_assert_eq!(pointer.ids.len(), bytes.len().div_ceil(chunk));
        prop_assert_eq!(read, bytes);
    }
}
