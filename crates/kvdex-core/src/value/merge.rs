use crate::value::Value;
use serde::{Deserialize, Serialize};

///
/// UpdateStrategy
///
/// How an update payload is combined with the stored value.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStrategy {
    /// Value replaced wholesale.
    Replace,

    /// Top-level fields of the patch overwrite, all others are preserved.
    Shallow,

    /// Nested objects merged field-wise; lists and scalars replaced.
    #[default]
    Deep,
}

/// Combine `current` and `patch` under `strategy`.
///
/// Non-object operands always resolve to `patch`, whatever the strategy.
#[must_use]
pub fn merge(current: Value, patch: Value, strategy: UpdateStrategy) -> Value {
    match strategy {
        UpdateStrategy::Replace => patch,
        UpdateStrategy::Shallow => merge_shallow(current, patch),
        UpdateStrategy::Deep => merge_deep(current, patch),
    }
}

fn merge_shallow(current: Value, patch: Value) -> Value {
    match (current, patch) {
        (Value::Object(mut fields), Value::Object(patch_fields)) => {
            fields.extend(patch_fields);
            Value::Object(fields)
        }
        (_, patch) => patch,
    }
}

fn merge_deep(current: Value, patch: Value) -> Value {
    match (current, patch) {
        (Value::Object(mut fields), Value::Object(patch_fields)) => {
            for (field, patch_value) in patch_fields {
                let merged = match fields.remove(&field) {
                    Some(existing) => merge_deep(existing, patch_value),
                    None => patch_value,
                };
                fields.insert(field, merged);
            }
            Value::Object(fields)
        }
        (_, patch) => patch,
    }
}
