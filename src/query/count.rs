//! Edge-count query text.

use super::QueryError;
use super::upsert::validate_id;

/// Result block name the count query binds its rows to.
pub const COUNT_BLOCK: &str = "countRelation";

/// Field inside each row that carries the count.
pub const COUNT_FIELD: &str = "c";

/// `{ countRelation(func: eq(id, "<id>")) { c : count(<relation>) } }`
pub fn count_relation_query(id: &str, relation: &str) -> Result<String, QueryError> {
    validate_id(id)?;
    let bad_relation = relation.is_empty()
        || !relation
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '~' | ':' | '-'));
    if bad_relation {
        return Err(QueryError::InvalidPredicate(relation.to_string()));
    }
    Ok(format!(
        "{{ {COUNT_BLOCK}(func: eq(id, \"{id}\")) {{ {COUNT_FIELD} : count({relation}) }} }}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_text() {
        assert_eq!(
            count_relation_query("id1", "follows").unwrap(),
            "{ countRelation(func: eq(id, \"id1\")) { c : count(follows) } }"
        );
    }

    #[test]
    fn reverse_edge_allowed() {
        assert!(count_relation_query("id1", "~follows").is_ok());
    }

    #[test]
    fn rejects_injection() {
        assert!(matches!(
            count_relation_query("x\")) { uid }", "follows"),
            Err(QueryError::InvalidId(_))
        ));
        assert!(matches!(
            count_relation_query("x", "follows) } }"),
            Err(QueryError::InvalidPredicate(_))
        ));
        assert!(matches!(count_relation_query("x", ""), Err(QueryError::InvalidPredicate(_))));
    }

    #[test]
    fn id_rules_match_upsert() {
        use crate::query::{Triple, UpsertQuery};
        for id in ["", "a\"b", "a\\b", "a\nb", "a\rb", "plain-id", "id with spaces"] {
            let counted = count_relation_query(id, "follows").err();
            let upserted = UpsertQuery::build(&[Triple::new(id, "p", 1)]).err();
            assert_eq!(counted, upserted, "rules disagree on {id:?}");
        }
    }
}
