//! Runtime configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config.

use crate::{
    DEFAULT_GET_MANY_KEY_LIMIT, DEFAULT_LIST_PAGE_SIZE, DEFAULT_RETRY, DEFAULT_SEGMENT_CHUNK_BYTES,
    MAX_VALUE_BYTES,
    error::InternalError,
    kv::Consistency,
    value::UpdateStrategy,
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for InternalError {
    fn from(err: ConfigError) -> Self {
        Self::config(err.to_string())
    }
}

///
/// BatchLimits
///
/// Per-atomic-operation limits of the substrate. Totals are summed over
/// every mutation (and check, for key bytes) in one operation.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct BatchLimits {
    pub max_mutations: usize,
    pub max_checks: usize,
    pub max_mutation_bytes: usize,
    pub max_key_bytes: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_mutations: 1000,
            max_checks: 10,
            max_mutation_bytes: 800 * 1024,
            max_key_bytes: 80 * 1024,
        }
    }
}

///
/// KvdexConfig
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct KvdexConfig {
    /// Retry budget for optimistic writes.
    pub retry: u32,

    /// Chunk size for segmented values.
    pub segment_chunk_bytes: usize,

    pub limits: BatchLimits,

    /// Keys per substrate multi-get.
    pub get_many_key_limit: usize,

    /// Entries fetched per substrate list page during scans.
    pub list_page_size: usize,

    pub update_strategy: UpdateStrategy,
    pub consistency: Consistency,
}

impl Default for KvdexConfig {
    fn default() -> Self {
        Self {
            retry: DEFAULT_RETRY,
            segment_chunk_bytes: DEFAULT_SEGMENT_CHUNK_BYTES,
            limits: BatchLimits::default(),
            get_many_key_limit: DEFAULT_GET_MANY_KEY_LIMIT,
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            update_strategy: UpdateStrategy::default(),
            consistency: Consistency::default(),
        }
    }
}

impl KvdexConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segment_chunk_bytes == 0 {
            return Err(ConfigError::invalid(
                "segment_chunk_bytes",
                "must be greater than zero",
            ));
        }
        if self.segment_chunk_bytes > MAX_VALUE_BYTES {
            return Err(ConfigError::invalid(
                "segment_chunk_bytes",
                format!("must not exceed the substrate value limit of {MAX_VALUE_BYTES} bytes"),
            ));
        }

        let non_zero = [
            ("limits.max_mutations", self.limits.max_mutations),
            ("limits.max_checks", self.limits.max_checks),
            ("limits.max_mutation_bytes", self.limits.max_mutation_bytes),
            ("limits.max_key_bytes", self.limits.max_key_bytes),
            ("get_many_key_limit", self.get_many_key_limit),
            ("list_page_size", self.list_page_size),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }

        // One chunk plus its key has to fit in a single atomic operation.
        if self.segment_chunk_bytes >= self.limits.max_mutation_bytes {
            return Err(ConfigError::invalid(
                "segment_chunk_bytes",
                "must be smaller than limits.max_mutation_bytes",
            ));
        }

        Ok(())
    }
}
