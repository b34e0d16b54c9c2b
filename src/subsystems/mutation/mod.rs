//! Mutation subsystem: serialized access to the graph store.
//!
//! [`MutationSerializer`] is the public handle. It is constructed once by the
//! composing application with [`MutationSerializer::start`], which spawns the
//! single worker ([`service::MutationService`]) that owns the store. Clone the
//! handle freely; every clone feeds the same FIFO queue, so no two store
//! operations from this process ever overlap.
//!
//! # Timeouts
//!
//! Two budgets apply to every call:
//!
//! - `apply_timeout` is handed to the store with every mutate, query and
//!   reset step. Hitting it surfaces as `GraphError::Store(StoreError::Timeout)`.
//! - `call_timeout` bounds how long the caller waits for the worker's reply,
//!   queueing included. Hitting it surfaces as `GraphError::CallTimeout`.
//!
//! `call_timeout` must be strictly greater than `apply_timeout`.
//!
//! # Limitations
//!
//! A `CallTimeout` does not cancel anything. The request stays queued, and
//! once the worker reaches it the store call runs to completion, so a
//! mutation may still be applied after its caller has treated it as failed.
//! Callers that retry after a timeout rely on the upsert being idempotent.
//!
//! Nothing is retried inside this layer.

pub mod service;

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::SerializerConfig;
use crate::query::{QueryError, Triple, UpsertQuery, count_relation_query};
use crate::store::{CommitInfo, GraphStore, StoreError};
use crate::subsystems::runtime::SubsystemHandle;

use service::{MutationCommand, MutationService, Reply};

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The batch would render malformed query text. Nothing was sent.
    #[error("invalid query input: {0}")]
    Query(#[from] QueryError),
    /// Forwarded verbatim from the store.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Drop-all succeeded, schema install did not.
    #[error("store wiped but schema install failed, store is empty and unindexed: {0}")]
    ResetIncomplete(StoreError),
    #[error("no reply from mutation worker within {0:?}")]
    CallTimeout(Duration),
    #[error("mutation worker is not running")]
    WorkerUnavailable,
    #[error("unexpected store result: {0}")]
    Decode(String),
    #[error("invalid serializer config: {0}")]
    Config(String),
}

// ── Handle ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MutationSerializer {
    cmd_tx: mpsc::UnboundedSender<MutationCommand>,
    call_timeout: Duration,
}

impl MutationSerializer {
    /// Spawn the worker and return the caller-side handle plus the worker's
    /// task handle. The worker exits when `shutdown` is cancelled or when
    /// every clone of the returned handle has been dropped.
    pub fn start(
        store: GraphStore,
        config: SerializerConfig,
        shutdown: CancellationToken,
    ) -> Result<(Self, SubsystemHandle), GraphError> {
        if config.apply_timeout.is_zero() || config.call_timeout <= config.apply_timeout {
            return Err(GraphError::Config(format!(
                "call timeout {:?} must be greater than apply timeout {:?}",
                config.call_timeout, config.apply_timeout
            )));
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let svc = MutationService::new(store, cmd_rx, shutdown, config.apply_timeout);
        let task = tokio::spawn(async move {
            svc.run().await;
            Ok(())
        });

        Ok((
            Self { cmd_tx, call_timeout: config.call_timeout },
            SubsystemHandle::from_handle("mutation", task),
        ))
    }

    /// Upsert `triples` as one mutation.
    ///
    /// The batch is rendered before it is queued, so malformed input fails
    /// immediately with [`GraphError::Query`].
    pub async fn store_triples(&self, triples: &[Triple]) -> Result<CommitInfo, GraphError> {
        let query = UpsertQuery::build(triples)?;
        self.call("store", |request_id, reply| MutationCommand::Store { request_id, query, reply })
            .await
    }

    /// Number of `relation` edges leaving the node with identity `id`, or
    /// `None` when no such node exists.
    pub async fn count_relation(&self, id: &str, relation: &str) -> Result<Option<u64>, GraphError> {
        let query = count_relation_query(id, relation)?;
        self.call("count", |request_id, reply| MutationCommand::Count { request_id, query, reply })
            .await
    }

    /// Drop all data, then reinstall the schema.
    ///
    /// On [`GraphError::ResetIncomplete`] the store has been wiped but has no
    /// schema; call `reset` again to recover.
    pub async fn reset(&self) -> Result<(), GraphError> {
        self.call("reset", |request_id, reply| MutationCommand::Reset { request_id, reply })
            .await
    }

    // ── Strict forms ──────────────────────────────────────────────────

    /// Like [`store_triples`](Self::store_triples), panicking on error.
    pub async fn must_store_triples(&self, triples: &[Triple]) -> CommitInfo {
        match self.store_triples(triples).await {
            Ok(info) => info,
            Err(e) => panic!("store_triples failed: {e}"),
        }
    }

    /// Like [`count_relation`](Self::count_relation), panicking on error.
    pub async fn must_count_relation(&self, id: &str, relation: &str) -> Option<u64> {
        match self.count_relation(id, relation).await {
            Ok(count) => count,
            Err(e) => panic!("count_relation failed: {e}"),
        }
    }

    /// Like [`reset`](Self::reset), panicking on error.
    pub async fn must_reset(&self) {
        if let Err(e) = self.reset().await {
            panic!("reset failed: {e}");
        }
    }

    // ── Plumbing ──────────────────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    async fn call<T>(
        &self,
        op: &'static str,
        make: impl FnOnce(Uuid, Reply<T>) -> MutationCommand,
    ) -> Result<T, GraphError> {
        let request_id = Uuid::now_v7();
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(request_id, reply))
            .map_err(|_| GraphError::WorkerUnavailable)?;
        debug!(%request_id, op, "queued");

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(GraphError::WorkerUnavailable),
            Err(_) => {
                warn!(%request_id, op, timeout = ?self.call_timeout, "gave up waiting for mutation worker; request still runs");
                Err(GraphError::CallTimeout(self.call_timeout))
            }
        }
    }
}
