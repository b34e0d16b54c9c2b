//! Triple data model and upsert query synthesis.
//!
//! A batch of [`Triple`]s is turned into the two text halves of a graph
//! upsert by [`upsert::UpsertQuery::build`]: a condition block that binds each
//! referenced node identity to a short label, and the mutation statements
//! that reference those labels.

pub mod count;
pub mod upsert;
pub mod varname;

use std::fmt;

use thiserror::Error;

pub use count::count_relation_query;
pub use upsert::UpsertQuery;
pub use varname::label;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Input that would render malformed query text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("empty triple batch")]
    EmptyBatch,
    #[error("object references unbound node id {0:?}")]
    UnboundRef(String),
    #[error("invalid node id {0:?}")]
    InvalidId(String),
    #[error("invalid predicate {0:?}")]
    InvalidPredicate(String),
}

// ── Ref ───────────────────────────────────────────────────────────────────────

/// Opaque external node identity. Equal when the ids are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ref {
    id: String,
}

impl Ref {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl From<&str> for Ref {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Ref {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

// ── Object ────────────────────────────────────────────────────────────────────

/// Right-hand side of a triple: an edge target or a scalar property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Ref(Ref),
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Object {
    pub fn as_ref_id(&self) -> Option<&Ref> {
        match self {
            Object::Ref(r) => Some(r),
            _ => None,
        }
    }
}

/// Canonical textual form used by the generic literal rule.
impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Ref(r) => write!(f, "{r}"),
            Object::Int(i) => write!(f, "{i}"),
            Object::Float(x) => write!(f, "{x}"),
            Object::Bool(b) => write!(f, "{b}"),
            Object::Str(s) => f.write_str(s),
        }
    }
}

impl From<Ref> for Object {
    fn from(r: Ref) -> Self {
        Object::Ref(r)
    }
}

impl From<i64> for Object {
    fn from(i: i64) -> Self {
        Object::Int(i)
    }
}

impl From<i32> for Object {
    fn from(i: i32) -> Self {
        Object::Int(i64::from(i))
    }
}

impl From<f64> for Object {
    fn from(x: f64) -> Self {
        Object::Float(x)
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Object::Bool(b)
    }
}

impl From<&str> for Object {
    fn from(s: &str) -> Self {
        Object::Str(s.to_string())
    }
}

impl From<String> for Object {
    fn from(s: String) -> Self {
        Object::Str(s)
    }
}

// ── Triple ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Triple {
    pub subject: Ref,
    pub predicate: String,
    pub object: Object,
}

impl Triple {
    pub fn new(subject: impl Into<Ref>, predicate: impl Into<String>, object: impl Into<Object>) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ref_equality_is_by_id() {
        assert_eq!(Ref::new("id1"), Ref::from("id1".to_string()));
        assert_ne!(Ref::new("id1"), Ref::new("id2"));

        let set: HashSet<Ref> = [Ref::new("x"), Ref::new("x"), Ref::new("y")].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn object_conversions() {
        assert_eq!(Object::from(7), Object::Int(7));
        assert_eq!(Object::from("Kiara"), Object::Str("Kiara".into()));
        assert_eq!(Object::from(Ref::new("id2")).as_ref_id(), Some(&Ref::new("id2")));
        assert!(Object::from(true).as_ref_id().is_none());
    }

    #[test]
    fn object_canonical_text() {
        assert_eq!(Object::Float(1.5).to_string(), "1.5");
        assert_eq!(Object::Bool(false).to_string(), "false");
        assert_eq!(Object::Str("Greg".into()).to_string(), "Greg");
    }
}
