use super::*;
use crate::kv::{MemoryKv, Versionstamp};
use std::collections::BTreeMap;

///
/// Docs
///
/// Fixed document source standing in for a collection.
///

#[derive(Default)]
struct Docs(BTreeMap<KeyPart, Document>);

impl Docs {
    fn with(mut self, id: &str, value: Value) -> Self {
        let id = KeyPart::from(id);
        self.0.insert(
            id.clone(),
            Document {
                id,
                value,
                versionstamp: Versionstamp::from_sequence(1),
            },
        );
        self
    }
}

#[async_trait]
impl DocumentSource for Docs {
    async fn load(&self, id: &KeyPart) -> Result<Option<Document>, InternalError> {
        Ok(self.0.get(id).cloned())
    }
}

fn specs() -> Vec<IndexSpec> {
    vec![IndexSpec::primary("email"), IndexSpec::secondary("team")]
}

fn user(email: &str, team: &str) -> Value {
    Value::object([("email", Value::from(email)), ("team", Value::from(team))])
}

async fn seed_primary(kv: &MemoryKv, space: &KeySpace, email: &str, owner: &str) {
    let key = space.primary_index_key("email", &KeyPart::from(email));
    let payload = IndexEntry::encode(&KeyPart::from(owner)).unwrap();
    kv.commit(AtomicOperation::new().set(key, payload)).await.unwrap();
}

#[test]
fn keys_follow_declaration_order_and_skip_missing_fields() {
    let space = KeySpace::new(&["users"]);
    let specs = specs();
    let engine = IndexEngine::new(&space, &specs);
    let id = KeyPart::from("u1");

    let keys = engine.keys(&id, &user("a@x", "red")).unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(
        keys[0].1,
        space.primary_index_key("email", &KeyPart::from("a@x"))
    );
    assert_eq!(
        keys[1].1,
        space.secondary_index_key("team", &KeyPart::from("red"), &id)
    );

    let partial = Value::object([("email", Value::from("a@x")), ("team", Value::Null)]);
    assert_eq!(engine.keys(&id, &partial).unwrap().len(), 1);
}

#[test]
fn non_scalar_index_values_are_rejected() {
    let space = KeySpace::new(&["users"]);
    let specs = specs();
    let engine = IndexEngine::new(&space, &specs);
    let value = Value::object([("email", Value::from(vec![Value::from("a")]))]);

    assert!(matches!(
        engine.keys(&KeyPart::from("u1"), &value),
        Err(ValidationError::NotIndexable { .. })
    ));
}

#[test]
fn delta_leaves_unchanged_entries_alone() {
    let space = KeySpace::new(&["users"]);
    let specs = specs();
    let engine = IndexEngine::new(&space, &specs);
    let id = KeyPart::from("u1");

    let same = engine
        .delta(&id, Some(&user("a@x", "red")), Some(&user("a@x", "red")))
        .unwrap();
    assert_eq!(same.len(), 0);

    let moved = engine
        .delta(&id, Some(&user("a@x", "red")), Some(&user("a@x", "blue")))
        .unwrap();
    assert_eq!(moved.sets.len(), 1);
    assert_eq!(moved.deletes.len(), 1);
    assert_eq!(
        moved.sets[0].key,
        space.secondary_index_key("team", &KeyPart::from("blue"), &id)
    );
    assert_eq!(
        moved.deletes[0].key,
        space.secondary_index_key("team", &KeyPart::from("red"), &id)
    );
}

#[test]
fn fresh_documents_only_add_entries() {
    let space = KeySpace::new(&["users"]);
    let specs = specs();
    let engine = IndexEngine::new(&space, &specs);
    let id = KeyPart::from("u1");

    let fresh = engine.delta(&id, None, Some(&user("a@x", "red"))).unwrap();

    assert_eq!(fresh.sets.len(), 2);
    assert!(fresh.deletes.is_empty());
    assert_eq!(
        fresh.sets[0].key,
        space.primary_index_key("email", &KeyPart::from("a@x"))
    );
}

#[test]
fn stage_deletion_removes_every_entry() {
    let space = KeySpace::new(&["users"]);
    let specs = specs();
    let engine = IndexEngine::new(&space, &specs);
    let id = KeyPart::from("u1");
    let mut batch = AtomicBatch::new();

    engine
        .stage_deletion(&id, &user("a@x", "red"), &mut batch)
        .unwrap();

    let ops = batch.split(&crate::config::BatchLimits::default()).unwrap();
    let keys: Vec<_> = ops[0].mutations.iter().map(|m| m.key.clone()).collect();
    assert_eq!(
        keys,
        vec![
            space.primary_index_key("email", &KeyPart::from("a@x")),
            space.secondary_index_key("team", &KeyPart::from("red"), &id),
        ]
    );
    assert!(
        ops[0]
            .mutations
            .iter()
            .all(|m| matches!(m.kind, crate::kv::MutationKind::Delete))
    );
}

#[test]
fn spec_lookup_checks_kind() {
    let space = KeySpace::new(&["users"]);
    let specs = specs();
    let engine = IndexEngine::new(&space, &specs);

    assert!(engine.spec("email", IndexKind::Primary).is_ok());
    assert!(engine.spec("email", IndexKind::Secondary).is_err());
    assert!(engine.spec("missing", IndexKind::Primary).is_err());
}

#[tokio::test]
async fn free_value_validates_with_absence_check() {
    let kv = MemoryKv::new();
    let space = KeySpace::new(&["users"]);
    let specs = specs();
    let engine = IndexEngine::new(&space, &specs);

    let validation = engine
        .validate(
            &kv,
            &Docs::default(),
            &user("a@x", "red"),
            &KeyPart::from("u1"),
            Consistency::Strong,
        )
        .await
        .unwrap();

    let IndexValidation::Clear(checks) = validation else {
        panic!("expected clear validation");
    };
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].versionstamp, None);
}

#[tokio::test]
async fn live_owner_is_a_collision() {
    let kv = MemoryKv::new();
    let space = KeySpace::new(&["users"]);
    let specs = specs();
    let engine = IndexEngine::new(&space, &specs);
    seed_primary(&kv, &space, "a@x", "u2").await;
    let docs = Docs::default().with("u2", user("a@x", "blue"));

    let validation = engine
        .validate(&kv, &docs, &user("a@x", "red"), &KeyPart::from("u1"), Consistency::Strong)
        .await
        .unwrap();

    assert!(matches!(validation, IndexValidation::Collision { index } if index == "email"));
}

#[tokio::test]
async fn own_entry_is_not_a_collision() {
    let kv = MemoryKv::new();
    let space = KeySpace::new(&["users"]);
    let specs = specs();
    let engine = IndexEngine::new(&space, &specs);
    seed_primary(&kv, &space, "a@x", "u1").await;
    let docs = Docs::default().with("u1", user("a@x", "red"));

    let validation = engine
        .validate(&kv, &docs, &user("a@x", "blue"), &KeyPart::from("u1"), Consistency::Strong)
        .await
        .unwrap();

    let IndexValidation::Clear(checks) = validation else {
        panic!("expected clear validation");
    };
    assert_eq!(checks.len(), 1);
    assert!(checks[0].versionstamp.is_some());
}

#[tokio::test]
async fn stale_owner_is_free_but_guarded() {
    let kv = MemoryKv::new();
    let space = KeySpace::new(&["users"]);
    let specs = specs();
    let engine = IndexEngine::new(&space, &specs);
    seed_primary(&kv, &space, "a@x", "gone").await;
    seed_primary(&kv, &space, "b@x", "moved").await;
    let docs = Docs::default().with("moved", user("c@x", "red"));

    for (email, owner) in [("a@x", "gone"), ("b@x", "moved")] {
        let validation = engine
            .validate(&kv, &docs, &user(email, "red"), &KeyPart::from("u1"), Consistency::Strong)
            .await
            .unwrap();

        let IndexValidation::Clear(checks) = validation else {
            panic!("expected clear validation for {email}");
        };
        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0].key, space.id_key(&KeyPart::from(owner)));
    }
}

#[tokio::test]
async fn primary_owner_reads_the_back_pointer() {
    let kv = MemoryKv::new();
    let space = KeySpace::new(&["users"]);
    let specs = specs();
    let engine = IndexEngine::new(&space, &specs);
    seed_primary(&kv, &space, "a@x", "u9").await;
    let spec = engine.spec("email", IndexKind::Primary).unwrap();

    let owner = engine
        .primary_owner(&kv, spec, &KeyPart::from("a@x"), Consistency::Strong)
        .await
        .unwrap();

    assert_eq!(owner, Some(KeyPart::from("u9")));
}
