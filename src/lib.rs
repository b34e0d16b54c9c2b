//! triplegate: serialized upsert gateway for a remote graph store.
//!
//! Library root. The binary entry point is `src/main.rs`; integration tests
//! use the same public modules.

pub mod config;
#[cfg(feature = "console")]
pub mod console;
pub mod error;
pub mod logger;
pub mod query;
pub mod store;
pub mod subsystems;

pub use query::{Object, Ref, Triple};
pub use subsystems::mutation::{GraphError, MutationSerializer};
