//! Typed <-> dynamic conversion.
//!
//! Typed documents reach the dynamic [`Value`] model through the CBOR data
//! model, so any `serde` type that stores as CBOR can be stored here.

use crate::{serialize::SerializeError, value::Value};
use num_bigint::BigInt;
use serde::{Serialize, de::DeserializeOwned};
use serde_cbor::Value as Cbor;
use std::collections::BTreeMap;

impl Value {
    /// Convert any serializable type into a dynamic value.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, SerializeError> {
        let cbor = serde_cbor::value::to_value(value)
            .map_err(|e| SerializeError::Serialize(e.to_string()))?;

        from_cbor(cbor)
    }

    /// Convert this dynamic value into a typed value.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, SerializeError> {
        let cbor = to_cbor(self)?;

        serde_cbor::value::from_value(cbor).map_err(|e| SerializeError::Deserialize(e.to_string()))
    }
}

fn from_cbor(cbor: Cbor) -> Result<Value, SerializeError> {
    Ok(match cbor {
        Cbor::Null => Value::Null,
        Cbor::Bool(v) => Value::Bool(v),
        Cbor::Integer(v) => {
            i64::try_from(v).map_or_else(|_| Value::BigInt(BigInt::from(v)), Value::Int)
        }
        Cbor::Float(v) => Value::Float(v),
        Cbor::Bytes(v) => Value::Bytes(v),
        Cbor::Text(v) => Value::Text(v),
        Cbor::Array(items) => Value::List(
            items
                .into_iter()
                .map(from_cbor)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Cbor::Map(entries) => {
            let mut fields = BTreeMap::new();
            for (key, value) in entries {
                let key = match key {
                    Cbor::Text(key) => key,
                    Cbor::Integer(key) => key.to_string(),
                    other => {
                        return Err(SerializeError::Serialize(format!(
                            "object keys must be text, found {other:?}"
                        )));
                    }
                };
                fields.insert(key, from_cbor(value)?);
            }
            Value::Object(fields)
        }
        Cbor::Tag(_, inner) => from_cbor(*inner)?,
        other => {
            return Err(SerializeError::Serialize(format!(
                "unsupported CBOR value: {other:?}"
            )));
        }
    })
}

fn to_cbor(value: &Value) -> Result<Cbor, SerializeError> {
    Ok(match value {
        Value::Null => Cbor::Null,
        Value::Bool(v) => Cbor::Bool(*v),
        Value::Int(v) => Cbor::Integer(i128::from(*v)),
        Value::Float(v) => Cbor::Float(*v),
        Value::BigInt(v) => Cbor::Integer(i128::try_from(v).map_err(|_| {
            SerializeError::Deserialize(format!("bigint {v} exceeds the typed integer range"))
        })?),
        Value::Text(v) => Cbor::Text(v.clone()),
        Value::Bytes(v) => Cbor::Bytes(v.clone()),
        Value::List(items) => Cbor::Array(items.iter().map(to_cbor).collect::<Result<_, _>>()?),
        Value::Object(fields) => Cbor::Map(
            fields
                .iter()
                .map(|(k, v)| Ok((Cbor::Text(k.clone()), to_cbor(v)?)))
                .collect::<Result<_, SerializeError>>()?,
        ),
    })
}
