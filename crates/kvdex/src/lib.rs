//! ## Crate layout
//! - `core`: value model, keys, substrate contract, and the collection engine.
//! - `kv`: the substrate trait plus the in-memory backend.
//!
//! The `prelude` module carries the vocabulary most callers need; errors,
//! configuration, and backends are reached through their own paths.

pub use kvdex_core as core;

pub use crate::core::{config, kv, obs};

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use crate::core::{config::KvdexConfig, error::InternalError as Error};

///
/// Prelude
///

pub mod prelude {
    pub use crate::core::prelude::*;
    pub use crate::core::{kv::MemoryKv, value::DocumentValidator};
}

///
/// TESTS
///
