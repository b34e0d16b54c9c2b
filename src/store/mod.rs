//! Graph store abstraction.
//!
//! `GraphStore` is an enum over concrete backends. Add a new variant + module
//! in `backends/` for each additional store.
//!
//! Stores are cheap to clone, but the running service hands its single
//! instance to the mutation worker and nothing else addresses it.

pub mod backends;

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

/// Index declaration installed by `reset`: `id` is an exact-match (hash) and
/// trigram-searchable string, eligible for upsert matching.
pub const SCHEMA: &str = "id: string @index(hash, trigram) @upsert .";

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("unknown store backend: {0}")]
    UnknownBackend(String),
    #[error("store transport failed: {0}")]
    Transport(String),
    #[error("store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("store rejected request: {0}")]
    Rejected(String),
    #[error("store did not apply within {0:?}")]
    Timeout(Duration),
    #[error("cannot decode store response: {0}")]
    Decode(String),
}

// ── Wire types ────────────────────────────────────────────────────────────────

/// Outcome of a committed mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitInfo {
    /// Blank-node / variable name → uid for nodes created by the mutation.
    pub uids: BTreeMap<String, String>,
    pub start_ts: u64,
    pub commit_ts: u64,
}

/// Schema-level operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlterOp {
    DropAll,
    Schema(String),
}

// ── Store enum ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum GraphStore {
    #[cfg(feature = "store-dgraph")]
    Dgraph(backends::dgraph::DgraphStore),
    Memory(backends::memory::MemoryStore),
}

impl GraphStore {
    pub fn backend(&self) -> &'static str {
        match self {
            #[cfg(feature = "store-dgraph")]
            GraphStore::Dgraph(_) => "dgraph",
            GraphStore::Memory(_) => "memory",
        }
    }

    /// Run an upsert: `condition` binds variables, `statements` are the
    /// N-Quad lines that reference them.
    pub async fn mutate(
        &self,
        condition: &str,
        statements: &str,
        timeout: Duration,
    ) -> Result<CommitInfo, StoreError> {
        match self {
            #[cfg(feature = "store-dgraph")]
            GraphStore::Dgraph(s) => s.mutate(condition, statements, timeout).await,
            GraphStore::Memory(s) => s.mutate(condition, statements, timeout).await,
        }
    }

    /// Run a read-only query and return the decoded `data` object.
    pub async fn query(
        &self,
        text: &str,
        params: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<serde_json::Value, StoreError> {
        match self {
            #[cfg(feature = "store-dgraph")]
            GraphStore::Dgraph(s) => s.query(text, params, timeout).await,
            GraphStore::Memory(s) => s.query(text, params, timeout).await,
        }
    }

    /// Schema-level operation, bounded by `timeout` like `mutate`.
    pub async fn alter(&self, op: &AlterOp, timeout: Duration) -> Result<(), StoreError> {
        match self {
            #[cfg(feature = "store-dgraph")]
            GraphStore::Dgraph(s) => s.alter(op, timeout).await,
            GraphStore::Memory(s) => s.alter(op, timeout).await,
        }
    }

    /// Reachability probe.
    pub async fn ping(&self) -> Result<(), StoreError> {
        match self {
            #[cfg(feature = "store-dgraph")]
            GraphStore::Dgraph(s) => s.ping().await,
            GraphStore::Memory(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_text() {
        assert_eq!(SCHEMA, "id: string @index(hash, trigram) @upsert .");
    }

    #[test]
    fn error_display() {
        let e = StoreError::Status { status: 503, body: "busy".into() };
        assert_eq!(e.to_string(), "store returned HTTP 503: busy");
        assert!(StoreError::Timeout(Duration::from_millis(5)).to_string().contains("5ms"));
    }

    #[tokio::test]
    async fn memory_backend_name_and_ping() {
        let store = GraphStore::Memory(backends::memory::MemoryStore::new());
        assert_eq!(store.backend(), "memory");
        assert!(store.ping().await.is_ok());
    }
}
