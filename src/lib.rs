//! Workspace placeholder crate.
//!
//! Hosts can depend on `catalog-mirror` alone and reach the service façade
//! and the crates behind it through these re-exports.

pub use core_service::*;

pub use core_library as library;
pub use core_runtime as runtime;
pub use core_sync as sync;
