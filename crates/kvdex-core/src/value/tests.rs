use super::*;
use serde::{Deserialize, Serialize};

fn profile() -> Value {
    Value::object([
        ("name", Value::from("ada")),
        (
            "address",
            Value::object([
                ("city", Value::from("london")),
                ("zip", Value::from("n1")),
            ]),
        ),
        ("tags", Value::from(vec![Value::from("a"), Value::from("b")])),
    ])
}

///
/// Merge
///

#[test]
fn replace_discards_current_value() {
    let patch = Value::object([("name", Value::from("grace"))]);

    assert_eq!(merge(profile(), patch.clone(), UpdateStrategy::Replace), patch);
}

#[test]
fn shallow_merge_replaces_nested_objects_wholesale() {
    let patch = Value::object([("address", Value::object([("city", Value::from("paris"))]))]);

    let merged = merge(profile(), patch, UpdateStrategy::Shallow);

    assert_eq!(merged.get_path("address.city"), Some(&Value::from("paris")));
    assert_eq!(merged.get_path("address.zip"), None);
    assert_eq!(merged.get("name"), Some(&Value::from("ada")));
}

#[test]
fn deep_merge_keeps_untouched_nested_fields() {
    let patch = Value::object([
        ("address", Value::object([("city", Value::from("paris"))])),
        ("tags", Value::from(vec![Value::from("c")])),
    ]);

    let merged = merge(profile(), patch, UpdateStrategy::Deep);

    assert_eq!(merged.get_path("address.city"), Some(&Value::from("paris")));
    assert_eq!(merged.get_path("address.zip"), Some(&Value::from("n1")));
    assert_eq!(merged.get("tags"), Some(&Value::from(vec![Value::from("c")])));
    assert_eq!(merged.get("name"), Some(&Value::from("ada")));
}

#[test]
fn non_object_operands_resolve_to_patch() {
    for strategy in [UpdateStrategy::Shallow, UpdateStrategy::Deep] {
        assert_eq!(merge(Value::from(1), Value::from(2), strategy), Value::from(2));
        assert_eq!(merge(profile(), Value::from("x"), strategy), Value::from("x"));
    }
}

///
/// Validation
///

#[test]
fn validator_rejects_non_finite_floats_with_path() {
    let value = Value::object([(
        "scores",
        Value::from(vec![Value::from(1.0), Value::from(f64::NAN)]),
    )]);

    let err = ValueValidator::default().validate(&value).unwrap_err();

    assert_eq!(err.to_string(), "non-finite float at 'scores[1]'");
}

#[test]
fn validator_enforces_max_depth() {
    let mut value = Value::from(1);
    for _ in 0..5 {
        value = Value::from(vec![value]);
    }

    assert!(ValueValidator { max_depth: 5 }.validate(&value).is_ok());
    assert!(matches!(
        ValueValidator { max_depth: 4 }.validate(&value),
        Err(ValidationError::TooDeep { max: 4, .. })
    ));
}

#[test]
fn closures_are_document_validators() {
    let validator = |value: &Value| {
        if value.get("name").is_some() {
            Ok(())
        } else {
            Err(ValidationError::custom("name is required"))
        }
    };

    assert!(validator.validate(&profile()).is_ok());
    assert!(validator.validate(&Value::object::<&str, _>([])).is_err());
}

#[test]
fn walk_visits_in_pre_order() {
    struct Paths(Vec<String>);

    impl ValueVisitor for Paths {
        type Error = ();

        fn visit(&mut self, path: &ValuePath, _value: &Value) -> Result<(), ()> {
            self.0.push(path.to_string());
            Ok(())
        }
    }

    let mut paths = Paths(Vec::new());
    walk(&profile(), &mut paths).unwrap();

    assert_eq!(
        paths.0,
        vec![
            "$",
            "address",
            "address.city",
            "address.zip",
            "name",
            "tags",
            "tags[0]",
            "tags[1]"
        ]
    );
}

///
/// Key parts
///

#[test]
fn key_part_conversion() {
    assert_eq!(Value::from("a").to_key_part(), Ok(Some(KeyPart::from("a"))));
    assert_eq!(Value::from(7).to_key_part(), Ok(Some(KeyPart::Int(7))));
    assert_eq!(Value::Null.to_key_part(), Ok(None));
    assert_eq!(Value::from(1.5).to_key_part(), Ok(KeyPart::float(1.5)));
    assert_eq!(Value::from(-0.0).to_key_part(), Ok(KeyPart::float(0.0)));
    assert!(matches!(
        Value::from(f64::NAN).to_key_part(),
        Err(ValidationError::NotIndexable { kind: "NaN", .. })
    ));
}

#[test]
fn not_indexable_error_names_the_field() {
    let err = profile()
        .get("tags")
        .unwrap()
        .to_key_part()
        .unwrap_err()
        .at_field("tags");

    assert_eq!(err.to_string(), "value at 'tags' is not indexable (list)");
}

///
/// Typed bridge
///

#[derive(Debug, Deserialize, PartialEq, Serialize)]
struct Account {
    owner: String,
    balance: i64,
    flags: Vec<bool>,
}

#[test]
fn typed_values_bridge_both_ways() {
    let account = Account {
        owner: "ada".to_string(),
        balance: -40,
        flags: vec![true, false],
    };

    let value = Value::from_serialize(&account).unwrap();

    assert_eq!(value.get("balance"), Some(&Value::Int(-40)));
    assert_eq!(value.deserialize_into::<Account>().unwrap(), account);
}
