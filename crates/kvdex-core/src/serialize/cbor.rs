use crate::serialize::SerializeError;
use serde::{Serialize, de::DeserializeOwned};
use serde_cbor::{from_slice, to_vec};
use std::panic::{AssertUnwindSafe, catch_unwind};

// Reassembled segmented documents are the largest payloads decoded here.
pub(super) const MAX_DECODE_BYTES: usize = 256 * 1024 * 1024;

/// Serialize a value into CBOR bytes.
pub(super) fn serialize<T>(t: &T) -> Result<Vec<u8>, SerializeError>
where
    T: Serialize,
{
    to_vec(t).map_err(|e| SerializeError::Serialize(e.to_string()))
}

/// Deserialize CBOR bytes into a value.
///
/// Safety guarantees:
/// - Input size is bounded before decode.
/// - Any panic during decode is caught and reported as a deserialize error.
/// - No panic escapes this function.
pub(super) fn deserialize_bounded<T>(bytes: &[u8], max_bytes: usize) -> Result<T, SerializeError>
where
    T: DeserializeOwned,
{
    if bytes.len() > max_bytes {
        return Err(SerializeError::DeserializeSizeLimitExceeded {
            len: bytes.len(),
            max_bytes,
        });
    }

    let result = catch_unwind(AssertUnwindSafe(|| from_slice(bytes)));

    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(SerializeError::Deserialize(err.to_string())),
        Err(_) => Err(SerializeError::Deserialize(
            "panic during CBOR deserialization".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_decode_rejects_oversized_payload() {
        let bytes = serialize(&vec![1u8; 32]).expect("serialize");
        let err = deserialize_bounded::<Vec<u8>>(&bytes, 8).unwrap_err();

        assert!(matches!(
            err,
            SerializeError::DeserializeSizeLimitExceeded { max_bytes: 8, .. }
        ));
    }

    #[test]
    fn garbage_input_is_a_deserialize_error() {
        let err = deserialize_bounded::<String>(&[0xff, 0x00, 0x13], 1024).unwrap_err();

        assert!(matches!(err, SerializeError::Deserialize(_)));
    }
}
