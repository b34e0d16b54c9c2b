//! `memory` backend: in-process graph that speaks the same text this crate
//! sends to Dgraph.
//!
//! It understands exactly the shapes the query builder renders: the
//! `{ <var> as var(func: eq(id, "<id>")) ... }` condition block, the
//! `uid(<var>) <pred> <object> .` statement lines, and the edge-count query.
//! Anything else is rejected the way a real store rejects bad syntax.
//!
//! A variable whose lookup matched nothing creates one fresh node, and that
//! node takes the looked-up identity as its `id` value so later upserts find
//! it again.
//!
//! Clones share state, which lets tests keep a handle while the worker
//! owns the store. The fault and delay knobs exist for the same reason.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::json;
use tracing::{debug, trace};

use crate::query::count::{COUNT_BLOCK, COUNT_FIELD};
use crate::store::{AlterOp, CommitInfo, StoreError};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    graph: Mutex<Graph>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    mutate_calls: AtomicUsize,
}

#[derive(Debug, Default)]
struct Graph {
    nodes: BTreeMap<u64, Node>,
    next_uid: u64,
    ts: u64,
    schema: Option<String>,
    fail_next_schema: bool,
    delay: Option<Duration>,
}

#[derive(Debug, Default, Clone)]
struct Node {
    id: Option<String>,
    props: BTreeMap<String, String>,
    edges: BTreeMap<String, BTreeSet<u64>>,
}

/// One parsed statement line.
enum Value {
    Var(String),
    Literal(String),
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Test knobs and inspection ─────────────────────────────────────────

    /// Sleep this long inside every mutate, query and alter before applying.
    pub fn set_delay(&self, delay: Option<Duration>) -> Result<(), StoreError> {
        self.graph()?.delay = delay;
        Ok(())
    }

    /// Make the next `AlterOp::Schema` fail once.
    pub fn fail_next_schema(&self) -> Result<(), StoreError> {
        self.graph()?.fail_next_schema = true;
        Ok(())
    }

    pub fn node_count(&self) -> Result<usize, StoreError> {
        Ok(self.graph()?.nodes.len())
    }

    pub fn schema(&self) -> Result<Option<String>, StoreError> {
        Ok(self.graph()?.schema.clone())
    }

    /// Highest number of mutate/query calls ever observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn mutate_calls(&self) -> usize {
        self.inner.mutate_calls.load(Ordering::SeqCst)
    }

    /// Property value of the node with identity `id`.
    pub fn property(&self, id: &str, predicate: &str) -> Result<Option<String>, StoreError> {
        let g = self.graph()?;
        Ok(g.find(id).and_then(|uid| g.nodes[&uid].props.get(predicate).cloned()))
    }

    // ── Store contract ────────────────────────────────────────────────

    pub async fn mutate(
        &self,
        condition: &str,
        statements: &str,
        timeout: Duration,
    ) -> Result<CommitInfo, StoreError> {
        let _guard = InFlight::enter(&self.inner);
        self.inner.mutate_calls.fetch_add(1, Ordering::SeqCst);
        self.with_timeout(timeout, async {
            let bindings = parse_condition(condition)?;
            let lines = statements
                .lines()
                .map(parse_statement)
                .collect::<Result<Vec<_>, _>>()?;
            self.graph()?.apply(&bindings, &lines)
        })
        .await
    }

    pub async fn query(
        &self,
        text: &str,
        _params: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<serde_json::Value, StoreError> {
        let _guard = InFlight::enter(&self.inner);
        self.with_timeout(timeout, async {
            let (id, relation) = parse_count_query(text)?;
            let g = self.graph()?;
            let rows = match g.find(&id) {
                Some(uid) => {
                    let n = g.nodes[&uid].edges.get(&relation).map_or(0, BTreeSet::len);
                    vec![json!({ COUNT_FIELD: n })]
                }
                None => Vec::new(),
            };
            trace!(%id, %relation, rows = rows.len(), "memory count query");
            Ok(json!({ COUNT_BLOCK: rows }))
        })
        .await
    }

    pub async fn alter(&self, op: &AlterOp, timeout: Duration) -> Result<(), StoreError> {
        let _guard = InFlight::enter(&self.inner);
        self.with_timeout(timeout, async {
            let mut g = self.graph()?;
            match op {
                AlterOp::DropAll => {
                    debug!(nodes = g.nodes.len(), "memory store: drop all");
                    g.nodes.clear();
                    g.schema = None;
                    Ok(())
                }
                AlterOp::Schema(text) => {
                    if std::mem::take(&mut g.fail_next_schema) {
                        return Err(StoreError::Rejected("schema install failed".into()));
                    }
                    g.schema = Some(text.clone());
                    Ok(())
                }
            }
        })
        .await
    }

    fn graph(&self) -> Result<MutexGuard<'_, Graph>, StoreError> {
        self.inner
            .graph
            .lock()
            .map_err(|_| StoreError::Transport("memory store lock poisoned".into()))
    }

    async fn with_timeout<T>(
        &self,
        timeout: Duration,
        work: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let delay = self.graph()?.delay;
        let run = async {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            work.await
        };
        tokio::time::timeout(timeout, run)
            .await
            .map_err(|_| StoreError::Timeout(timeout))?
    }
}

impl Graph {
    fn find(&self, id: &str) -> Option<u64> {
        self.nodes
            .iter()
            .find(|(_, n)| n.id.as_deref() == Some(id))
            .map(|(&uid, _)| uid)
    }

    fn apply(
        &mut self,
        bindings: &[(String, String)],
        lines: &[(String, String, Value)],
    ) -> Result<CommitInfo, StoreError> {
        // Resolve every variable before touching the graph.
        let mut resolved: HashMap<&str, Option<u64>> = HashMap::new();
        let mut identity: HashMap<&str, &str> = HashMap::new();
        for (var, id) in bindings {
            resolved.insert(var, self.find(id));
            identity.insert(var, id);
        }
        for (subject, _, object) in lines {
            for var in std::iter::once(subject).chain(match object {
                Value::Var(v) => Some(v),
                Value::Literal(_) => None,
            }) {
                if !resolved.contains_key(var.as_str()) {
                    return Err(StoreError::Rejected(format!("variable {var} is not defined")));
                }
            }
        }

        let mut uids = BTreeMap::new();
        // An empty variable gets one new node, shared by every line using it.
        let mut uid_of = |g: &mut Graph, var: &str| -> u64 {
            match resolved.get_mut(var) {
                Some(Some(uid)) => *uid,
                slot => {
                    g.next_uid += 1;
                    let uid = g.next_uid;
                    g.nodes.insert(uid, Node {
                        id: identity.get(var).map(|s| s.to_string()),
                        ..Node::default()
                    });
                    if let Some(slot) = slot {
                        *slot = Some(uid);
                    }
                    uids.insert(format!("uid({var})"), format!("{uid:#x}"));
                    uid
                }
            }
        };

        for (subject, predicate, object) in lines {
            let s = uid_of(self, subject);
            match object {
                Value::Var(o) => {
                    let o = uid_of(self, o);
                    if let Some(node) = self.nodes.get_mut(&s) {
                        node.edges.entry(predicate.clone()).or_default().insert(o);
                    }
                }
                Value::Literal(v) => {
                    if let Some(node) = self.nodes.get_mut(&s) {
                        if predicate == "id" {
                            node.id = Some(v.clone());
                        }
                        node.props.insert(predicate.clone(), v.clone());
                    }
                }
            }
        }

        self.ts += 2;
        debug!(created = uids.len(), lines = lines.len(), "memory store: upsert applied");
        Ok(CommitInfo { uids, start_ts: self.ts - 1, commit_ts: self.ts })
    }
}

// ── In-flight accounting ─────────────────────────────────────────────────────

struct InFlight<'a>(&'a Inner);

impl<'a> InFlight<'a> {
    fn enter(inner: &'a Inner) -> Self {
        let now = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        inner.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(inner)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── Text parsing ──────────────────────────────────────────────────────────────

fn rejected(what: &str, text: &str) -> StoreError {
    StoreError::Rejected(format!("cannot parse {what}: {text:?}"))
}

/// `{ a as var(func: eq(id, "x"))\nb as ... }` → `[(a, x), (b, ...)]`
fn parse_condition(text: &str) -> Result<Vec<(String, String)>, StoreError> {
    let body = text
        .strip_prefix("{ ")
        .and_then(|s| s.strip_suffix(" }"))
        .ok_or_else(|| rejected("condition block", text))?;
    body.lines()
        .map(|frag| {
            let (var, rest) = frag
                .split_once(" as var(func: eq(id, \"")
                .ok_or_else(|| rejected("condition fragment", frag))?;
            let id = rest
                .strip_suffix("\"))")
                .ok_or_else(|| rejected("condition fragment", frag))?;
            Ok((var.to_string(), id.to_string()))
        })
        .collect()
}

/// `uid(a) <pred> uid(b) .` or `uid(a) <pred> "lit"[^^<type>] .`
fn parse_statement(line: &str) -> Result<(String, String, Value), StoreError> {
    let body = line.strip_suffix(" .").ok_or_else(|| rejected("statement", line))?;
    let rest = body.strip_prefix("uid(").ok_or_else(|| rejected("statement", line))?;
    let (subject, rest) = rest.split_once(") <").ok_or_else(|| rejected("statement", line))?;
    let (predicate, object) = rest.split_once("> ").ok_or_else(|| rejected("statement", line))?;

    let value = if let Some(var) = object.strip_prefix("uid(").and_then(|o| o.strip_suffix(')')) {
        Value::Var(var.to_string())
    } else {
        Value::Literal(parse_literal(object).ok_or_else(|| rejected("literal", object))?)
    };
    Ok((subject.to_string(), predicate.to_string(), value))
}

/// Unescape a quoted literal, ignoring any `^^<type>` suffix.
fn parse_literal(object: &str) -> Option<String> {
    let mut chars = object.strip_prefix('"')?.chars();
    let mut out = String::new();
    loop {
        match chars.next()? {
            '"' => break,
            '\\' => out.push(match chars.next()? {
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                c => c,
            }),
            c => out.push(c),
        }
    }
    let tail: String = chars.collect();
    (tail.is_empty() || tail.starts_with("^^<")).then_some(out)
}

/// `{ countRelation(func: eq(id, "x")) { c : count(rel) } }` → `(x, rel)`
fn parse_count_query(text: &str) -> Result<(String, String), StoreError> {
    let prefix = format!("{{ {COUNT_BLOCK}(func: eq(id, \"");
    let rest = text.strip_prefix(prefix.as_str()).ok_or_else(|| rejected("query", text))?;
    let (id, rest) = rest.split_once("\")) { ").ok_or_else(|| rejected("query", text))?;
    let relation = rest
        .strip_prefix(&format!("{COUNT_FIELD} : count("))
        .and_then(|r| r.strip_suffix(") } }"))
        .ok_or_else(|| rejected("query", text))?;
    Ok((id.to_string(), relation.to_string()))
}
