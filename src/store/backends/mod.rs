//! Store backend implementations.
//!
//! `build(config, access_token)` is the factory, called at startup.
//! Adding a new backend = new module + new match arm.

#[cfg(feature = "store-dgraph")]
pub mod dgraph;
pub mod memory;

use crate::config::StoreConfig;
use crate::store::{GraphStore, StoreError};

/// Construct a `GraphStore` from config and an optional access token.
///
/// `access_token` is sourced from `DGRAPH_ACCESS_TOKEN` env (never TOML).
pub fn build(config: &StoreConfig, access_token: Option<String>) -> Result<GraphStore, StoreError> {
    match config.backend.as_str() {
        "memory" => Ok(GraphStore::Memory(memory::MemoryStore::new())),
        #[cfg(feature = "store-dgraph")]
        "dgraph" => {
            let s = dgraph::DgraphStore::new(config.url.clone(), config.probe_timeout, access_token)?;
            Ok(GraphStore::Dgraph(s))
        }
        _ => {
            let _ = access_token;
            Err(StoreError::UnknownBackend(config.backend.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cfg(backend: &str) -> StoreConfig {
        StoreConfig {
            backend: backend.into(),
            url: "http://localhost:8080".into(),
            probe: false,
            probe_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn builds_memory() {
        let s = build(&cfg("memory"), None).unwrap();
        assert_eq!(s.backend(), "memory");
    }

    #[cfg(feature = "store-dgraph")]
    #[test]
    fn builds_dgraph() {
        let s = build(&cfg("dgraph"), Some("token".into())).unwrap();
        assert_eq!(s.backend(), "dgraph");
    }

    #[test]
    fn unknown_backend_errors() {
        let err = build(&cfg("neo4j"), None).unwrap_err();
        assert_eq!(err, StoreError::UnknownBackend("neo4j".into()));
    }
}
