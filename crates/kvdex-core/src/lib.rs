//! Core runtime for kvdex: the value model, ordered keys, the substrate
//! contract, and the indexed/segmented collection engine built on top of it.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod config;
pub mod db;
pub mod error;
pub mod key;
pub mod kv;
pub mod obs;
pub mod serialize;
pub mod value;

///
/// CONSTANTS
///

/// Leading key part of every key kvdex writes.
pub const KVDEX_KEY_PREFIX: &str = "__kvdex__";

/// Maximum nesting depth accepted by the default value validator.
pub const MAX_VALUE_DEPTH: usize = 64;

/// Largest single value the substrate stores.
pub const MAX_VALUE_BYTES: usize = 65_536;

/// Largest single encoded key the substrate stores.
pub const MAX_KEY_BYTES: usize = 2_048;

/// Retries after the first attempt of an optimistic write.
pub const DEFAULT_RETRY: u32 = 10;

/// Chunk size for segmented values; inline entries never exceed it.
pub const DEFAULT_SEGMENT_CHUNK_BYTES: usize = 60_000;

/// Keys per substrate multi-get.
pub const DEFAULT_GET_MANY_KEY_LIMIT: usize = 10;

/// Entries per substrate list page during scans.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 500;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, backends, or serializers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        db::{
            Collection, CollectionDescriptor, CommitResult, Database, DatabaseBuilder,
            DeleteOutcome, Document, ListOptions, Paged, Rejection, SetOptions, UpdateOptions,
            UpsertTarget,
        },
        key::KeyPart,
        value::{UpdateStrategy, Value},
    };
}
