//! Upsert query builder.
//!
//! [`UpsertQuery::build`] is a pure transform over an ordered triple batch.
//! Equal input always renders byte-identical text, which is what makes the
//! resulting upsert safe to resend.
//!
//! ```text
//! condition:  { a as var(func: eq(id, "id1"))
//!             b as var(func: eq(id, "id2")) }
//! statements: uid(a) <follows> uid(b) .
//!             uid(a) <age> "42"^^<xs:int> .
//!             uid(b) <name> "Greg" .
//! ```

use std::collections::HashMap;

use super::varname::label;
use super::{Object, QueryError, Ref, Triple};

/// The two text halves of an upsert, ready for `GraphStore::mutate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertQuery {
    pub condition: String,
    pub statements: String,
}

impl UpsertQuery {
    pub fn build(triples: &[Triple]) -> Result<Self, QueryError> {
        if triples.is_empty() {
            return Err(QueryError::EmptyBatch);
        }
        let varnames = Varnames::from_triples(triples)?;
        Ok(Self {
            condition: render_condition(&varnames),
            statements: render_statements(&varnames, triples)?,
        })
    }
}

// ── Varnames ──────────────────────────────────────────────────────────────────

/// Ref → label assignment for one batch, in first-encounter order.
#[derive(Debug, Default)]
pub struct Varnames {
    order: Vec<(Ref, String)>,
    index: HashMap<Ref, usize>,
}

impl Varnames {
    /// Assign a label to every subject and every Ref-typed object.
    pub fn from_triples(triples: &[Triple]) -> Result<Self, QueryError> {
        let mut names = Self::default();
        for t in triples {
            names.put_if_absent(&t.subject)?;
            if let Some(obj) = t.object.as_ref_id() {
                names.put_if_absent(obj)?;
            }
        }
        Ok(names)
    }

    fn put_if_absent(&mut self, r: &Ref) -> Result<(), QueryError> {
        if self.index.contains_key(r) {
            return Ok(());
        }
        validate_id(r.id())?;
        let pos = self.order.len();
        self.order.push((r.clone(), label(pos as u64)));
        self.index.insert(r.clone(), pos);
        Ok(())
    }

    pub fn get(&self, r: &Ref) -> Option<&str> {
        self.index.get(r).map(|&i| self.order[i].1.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Ref, &str)> {
        self.order.iter().map(|(r, l)| (r, l.as_str()))
    }

}

// ── Rendering ─────────────────────────────────────────────────────────────────

pub fn render_condition(varnames: &Varnames) -> String {
    let fragments: Vec<String> = varnames
        .iter()
        .map(|(r, name)| format!("{name} as var(func: eq(id, \"{}\"))", r.id()))
        .collect();
    format!("{{ {} }}", fragments.join("\n"))
}

/// One `uid(..) <pred> object .` line per triple.
///
/// Fails with [`QueryError::UnboundRef`] rather than reference a label the
/// condition block never declared.
pub fn render_statements(varnames: &Varnames, triples: &[Triple]) -> Result<String, QueryError> {
    let mut lines = Vec::with_capacity(triples.len());
    for t in triples {
        validate_predicate(&t.predicate)?;
        let subject = bound(varnames, &t.subject)?;
        let object = match &t.object {
            Object::Ref(r) => format!("uid({})", bound(varnames, r)?),
            Object::Int(i) => format!("\"{i}\"^^<xs:int>"),
            other => format!("\"{}\"", escape_literal(&other.to_string())),
        };
        lines.push(format!("uid({subject}) <{}> {object} .", t.predicate));
    }
    Ok(lines.join("\n"))
}

fn bound<'a>(varnames: &'a Varnames, r: &Ref) -> Result<&'a str, QueryError> {
    varnames
        .get(r)
        .ok_or_else(|| QueryError::UnboundRef(r.id().to_string()))
}

pub(crate) fn validate_id(id: &str) -> Result<(), QueryError> {
    if id.is_empty() || id.contains(['"', '\\', '\n', '\r']) {
        return Err(QueryError::InvalidId(id.to_string()));
    }
    Ok(())
}

fn validate_predicate(predicate: &str) -> Result<(), QueryError> {
    let bad = predicate.is_empty()
        || predicate
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '\\'));
    if bad {
        return Err(QueryError::InvalidPredicate(predicate.to_string()));
    }
    Ok(())
}

/// N-Quad string literal escaping.
fn escape_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}
