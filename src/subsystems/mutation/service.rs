//! Mutation worker, the only task that talks to the graph store.
//!
//! Commands arrive on one unbounded queue and are executed strictly one at a
//! time, in arrival order. The worker never cancels a store call once it has
//! started: shutdown is noticed between commands, and a caller that gave up
//! waiting only loses the reply, not the effect.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::query::UpsertQuery;
use crate::query::count::{COUNT_BLOCK, COUNT_FIELD};
use crate::store::{AlterOp, CommitInfo, GraphStore, SCHEMA};

use super::GraphError;

// ── Commands ─────────────────────────────────────────────────────────────────

pub type Reply<T> = oneshot::Sender<Result<T, GraphError>>;

/// Internal command sent from [`super::MutationSerializer`] to the worker.
pub enum MutationCommand {
    Store {
        request_id: Uuid,
        query: UpsertQuery,
        reply: Reply<CommitInfo>,
    },
    Count {
        request_id: Uuid,
        query: String,
        reply: Reply<Option<u64>>,
    },
    Reset {
        request_id: Uuid,
        reply: Reply<()>,
    },
}

// ── Service ──────────────────────────────────────────────────────────────────

pub struct MutationService {
    store: GraphStore,
    cmd_rx: mpsc::UnboundedReceiver<MutationCommand>,
    shutdown: CancellationToken,
    apply_timeout: Duration,
}

impl MutationService {
    pub fn new(
        store: GraphStore,
        cmd_rx: mpsc::UnboundedReceiver<MutationCommand>,
        shutdown: CancellationToken,
        apply_timeout: Duration,
    ) -> Self {
        Self { store, cmd_rx, shutdown, apply_timeout }
    }

    /// Run until shutdown or until every handle has been dropped.
    pub async fn run(mut self) {
        info!(backend = self.store.backend(), apply_timeout = ?self.apply_timeout, "mutation worker running");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!(queued = self.cmd_rx.len(), "mutation worker shutting down");
                    break;
                }

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => {
                        info!("all serializer handles dropped, mutation worker exiting");
                        break;
                    }
                }
            }
        }
        // Dropping the receiver here fails every queued reply, which callers
        // see as `WorkerUnavailable`.
    }

    async fn handle(&self, cmd: MutationCommand) {
        match cmd {
            MutationCommand::Store { request_id, query, reply } => {
                debug!(%request_id, "store: applying upsert");
                let result = self
                    .store
                    .mutate(&query.condition, &query.statements, self.apply_timeout)
                    .await
                    .map_err(GraphError::from);
                match &result {
                    Ok(info) => debug!(%request_id, commit_ts = info.commit_ts, created = info.uids.len(), "store: committed"),
                    Err(e) => warn!(%request_id, error = %e, "store: failed"),
                }
                respond(reply, result, request_id, "store");
            }
            MutationCommand::Count { request_id, query, reply } => {
                debug!(%request_id, "count: querying");
                let result = self.count(&query).await;
                if let Err(e) = &result {
                    warn!(%request_id, error = %e, "count: failed");
                }
                respond(reply, result, request_id, "count");
            }
            MutationCommand::Reset { request_id, reply } => {
                let result = self.reset(request_id).await;
                respond(reply, result, request_id, "reset");
            }
        }
    }

    async fn count(&self, query: &str) -> Result<Option<u64>, GraphError> {
        let data = self
            .store
            .query(query, &Default::default(), self.apply_timeout)
            .await?;
        decode_count(&data)
    }

    /// Drop everything, then reinstall the schema. A failed reinstall leaves
    /// the store empty and unindexed; there is no rollback.
    async fn reset(&self, request_id: Uuid) -> Result<(), GraphError> {
        self.store.alter(&AlterOp::DropAll, self.apply_timeout).await.map_err(|e| {
            warn!(%request_id, error = %e, "reset: drop all failed");
            GraphError::Store(e)
        })?;
        info!(%request_id, "reset: store wiped");

        self.store
            .alter(&AlterOp::Schema(SCHEMA.to_string()), self.apply_timeout)
            .await
            .map_err(|e| {
                error!(%request_id, error = %e, "reset: schema install failed, store left empty and unindexed");
                GraphError::ResetIncomplete(e)
            })?;
        info!(%request_id, "reset: schema installed");
        Ok(())
    }
}

fn respond<T>(reply: Reply<T>, result: Result<T, GraphError>, request_id: Uuid, op: &str) {
    if reply.send(result).is_err() {
        // The store call already ran; only the reply is lost.
        debug!(%request_id, op, "caller stopped waiting, reply dropped");
    }
}

/// `{"countRelation": []}` → `None`, `{"countRelation": [{"c": n}]}` → `Some(n)`.
fn decode_count(data: &Value) -> Result<Option<u64>, GraphError> {
    let rows = data
        .get(COUNT_BLOCK)
        .and_then(Value::as_array)
        .ok_or_else(|| GraphError::Decode(format!("missing `{COUNT_BLOCK}` list in {data}")))?;
    match rows.as_slice() {
        [] => Ok(None),
        [row] => row
            .get(COUNT_FIELD)
            .and_then(Value::as_u64)
            .map(Some)
            .ok_or_else(|| GraphError::Decode(format!("row without integer `{COUNT_FIELD}`: {row}"))),
        _ => Err(GraphError::Decode(format!(
            "expected at most one row, got {}",
            rows.len()
        ))),
    }
}
