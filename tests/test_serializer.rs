//! End-to-end tests for the serialized upsert path over the in-memory store.
//!
//! Time-sensitive cases run on a paused clock (`start_paused`), so the
//! store delays below cost nothing in wall time.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use triplegate::config::SerializerConfig;
use triplegate::query::{QueryError, UpsertQuery};
use triplegate::store::backends::memory::MemoryStore;
use triplegate::store::{GraphStore, SCHEMA, StoreError};
use triplegate::{GraphError, MutationSerializer, Ref, Triple};

fn timeouts(apply_ms: u64, call_ms: u64) -> SerializerConfig {
    SerializerConfig {
        apply_timeout: Duration::from_millis(apply_ms),
        call_timeout: Duration::from_millis(call_ms),
    }
}

fn start(config: SerializerConfig) -> (MutationSerializer, MemoryStore, CancellationToken) {
    let mem = MemoryStore::new();
    let shutdown = CancellationToken::new();
    let (gate, _worker) =
        MutationSerializer::start(GraphStore::Memory(mem.clone()), config, shutdown.clone())
            .unwrap();
    (gate, mem, shutdown)
}

fn people() -> Vec<Triple> {
    vec![
        Triple::new("id1", "name", "Kiara"),
        Triple::new("id2", "name", "Greg"),
        Triple::new("id3", "name", "Sia"),
    ]
}

#[test]
fn labels_and_condition_text() {
    let q = UpsertQuery::build(&people()).unwrap();
    assert_eq!(
        q.condition,
        "{ a as var(func: eq(id, \"id1\"))\n\
         b as var(func: eq(id, \"id2\"))\n\
         c as var(func: eq(id, \"id3\")) }"
    );
    assert_eq!(
        q.statements,
        "uid(a) <name> \"Kiara\" .\nuid(b) <name> \"Greg\" .\nuid(c) <name> \"Sia\" ."
    );
}

#[test]
fn same_batch_renders_same_text() {
    let batch = vec![
        Triple::new("x", "follows", Ref::new("y")),
        Triple::new("y", "age", 30),
        Triple::new("x", "score", 0.5),
    ];
    assert_eq!(UpsertQuery::build(&batch).unwrap(), UpsertQuery::build(&batch).unwrap());
}

#[tokio::test]
async fn stored_people_are_found_again() {
    let (gate, mem, shutdown) = start(timeouts(500, 1000));
    gate.must_reset().await;

    let info = gate.store_triples(&people()).await.unwrap();
    assert_eq!(info.uids.len(), 3);
    assert!(info.commit_ts > info.start_ts);
    assert_eq!(mem.property("id2", "name").unwrap().as_deref(), Some("Greg"));

    // A second upsert of the same identities reuses the nodes.
    let info = gate.store_triples(&[Triple::new("id1", "follows", Ref::new("id3"))]).await.unwrap();
    assert!(info.uids.is_empty());
    assert_eq!(mem.node_count().unwrap(), 3);

    shutdown.cancel();
}

#[tokio::test]
async fn repeated_edges_are_idempotent() {
    let (gate, _mem, shutdown) = start(timeouts(500, 1000));
    let edge = [Triple::new("id1", "follows", Ref::new("id2"))];
    gate.must_store_triples(&edge).await;
    gate.must_store_triples(&edge).await;
    assert_eq!(gate.must_count_relation("id1", "follows").await, Some(1));
    shutdown.cancel();
}

#[tokio::test]
async fn count_distinguishes_missing_node_from_zero() {
    let (gate, _mem, shutdown) = start(timeouts(500, 1000));
    gate.must_store_triples(&[Triple::new("id1", "name", "Kiara")]).await;

    assert_eq!(gate.count_relation("id1", "follows").await.unwrap(), Some(0));
    assert_eq!(gate.count_relation("nobody", "follows").await.unwrap(), None);
    shutdown.cancel();
}

#[tokio::test]
async fn invalid_input_is_rejected_before_queueing() {
    let (gate, mem, shutdown) = start(timeouts(500, 1000));
    assert_eq!(
        gate.store_triples(&[]).await.unwrap_err(),
        GraphError::Query(QueryError::EmptyBatch)
    );
    assert!(matches!(
        gate.store_triples(&[Triple::new("id1", "has name", "x")]).await,
        Err(GraphError::Query(QueryError::InvalidPredicate(_)))
    ));
    assert!(matches!(
        gate.count_relation("id1", "follows } x").await,
        Err(GraphError::Query(_))
    ));
    assert_eq!(mem.mutate_calls(), 0);
    shutdown.cancel();
}

#[tokio::test]
async fn failed_schema_install_leaves_store_empty() {
    let (gate, mem, shutdown) = start(timeouts(500, 1000));
    gate.must_store_triples(&people()).await;
    mem.fail_next_schema().unwrap();

    let err = gate.reset().await.unwrap_err();
    assert!(matches!(err, GraphError::ResetIncomplete(StoreError::Rejected(_))));
    assert_eq!(gate.must_count_relation("id1", "name").await, None);
    assert_eq!(mem.node_count().unwrap(), 0);
    assert_eq!(mem.schema().unwrap(), None);

    // Retrying recovers.
    gate.reset().await.unwrap();
    assert_eq!(mem.schema().unwrap().as_deref(), Some(SCHEMA));
    shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_never_overlap() {
    let (gate, mem, shutdown) = start(timeouts(500, 1000));
    mem.set_delay(Some(Duration::from_millis(50))).unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let gate = gate.clone();
        tasks.push(tokio::spawn(async move {
            let id = format!("n{i}");
            gate.store_triples(&[Triple::new(id.as_str(), "rank", i)]).await
        }));
    }
    for t in tasks {
        t.await.unwrap().unwrap();
    }

    assert_eq!(mem.mutate_calls(), 8);
    assert_eq!(mem.max_in_flight(), 1);
    assert_eq!(mem.node_count().unwrap(), 8);
    shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn caller_timeout_does_not_cancel_mutation() {
    let (gate, mem, shutdown) = start(timeouts(1000, 1500));
    mem.set_delay(Some(Duration::from_millis(900))).unwrap();

    // The first mutation occupies the worker until t=0.9s, so the second
    // cannot finish before its caller stops waiting at t=1.5s.
    let first = [Triple::new("early", "name", "first")];
    let second = [Triple::new("late", "name", "second")];
    let (a, b) = tokio::join!(gate.store_triples(&first), gate.store_triples(&second));
    a.unwrap();
    assert_eq!(b.unwrap_err(), GraphError::CallTimeout(Duration::from_millis(1500)));

    // ...but it still lands once the worker gets to it.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(mem.property("late", "name").unwrap().as_deref(), Some("second"));
    assert_eq!(mem.mutate_calls(), 2);
    shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn slow_store_surfaces_apply_timeout() {
    let (gate, mem, shutdown) = start(timeouts(1000, 1500));
    mem.set_delay(Some(Duration::from_secs(2))).unwrap();

    let err = gate.store_triples(&people()).await.unwrap_err();
    assert_eq!(err, GraphError::Store(StoreError::Timeout(Duration::from_secs(1))));
    assert_eq!(mem.node_count().unwrap(), 0);

    let err = gate.count_relation("id1", "name").await.unwrap_err();
    assert!(matches!(err, GraphError::Store(StoreError::Timeout(_))));
    shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn slow_reset_surfaces_apply_timeout_not_call_timeout() {
    let (gate, mem, shutdown) = start(timeouts(1000, 1500));
    gate.store_triples(&people()).await.unwrap();
    mem.set_delay(Some(Duration::from_secs(30))).unwrap();

    let err = gate.reset().await.unwrap_err();
    assert_eq!(err, GraphError::Store(StoreError::Timeout(Duration::from_secs(1))));
    // The drop never completed, so nothing was wiped.
    assert_eq!(mem.node_count().unwrap(), 3);
    shutdown.cancel();
}

#[tokio::test]
async fn handles_fail_fast_after_shutdown() {
    let mem = MemoryStore::new();
    let shutdown = CancellationToken::new();
    let (gate, worker) =
        MutationSerializer::start(GraphStore::Memory(mem), timeouts(500, 1000), shutdown.clone())
            .unwrap();

    shutdown.cancel();
    worker.join().await.unwrap();
    assert_eq!(
        gate.store_triples(&people()).await.unwrap_err(),
        GraphError::WorkerUnavailable
    );
}
