use crate::error::{ErrorClass, ErrorOrigin, InternalError};
use std::sync::Arc;
use thiserror::Error as ThisError;

///
/// CodecError
///

#[derive(Debug, ThisError)]
#[error("{codec} codec failed: {message}")]
pub struct CodecError {
    pub codec: &'static str,
    pub message: String,
}

impl CodecError {
    pub fn new(codec: &'static str, message: impl Into<String>) -> Self {
        Self {
            codec,
            message: message.into(),
        }
    }
}

impl From<CodecError> for InternalError {
    fn from(err: CodecError) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Serialize, err.to_string())
    }
}

///
/// Codec
///
/// Pluggable byte transform applied to serialized values before storage
/// (compression, encryption). `decode` must invert `encode`.
///

pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;

    fn encode(&self, bytes: Vec<u8>) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: Vec<u8>) -> Result<Vec<u8>, CodecError>;
}

impl<T: Codec + ?Sized> Codec for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn encode(&self, bytes: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        (**self).encode(bytes)
    }

    fn decode(&self, bytes: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        (**self).decode(bytes)
    }
}

///
/// IdentityCodec
///

#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityCodec;

impl Codec for IdentityCodec {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn encode(&self, bytes: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        Ok(bytes)
    }

    fn decode(&self, bytes: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        Ok(bytes)
    }
}
