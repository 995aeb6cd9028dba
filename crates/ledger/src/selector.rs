//! Rich query evaluation.
//!
//! Queries are JSON documents in the Mango style used by document-backed
//! state databases:
//!
//! ```json
//! { "selector": { "owner": "VisaWorld", "currentState": { "$in": [1, 2] } }, "limit": 10 }
//! ```
//!
//! Field conditions are ANDed. A condition that is not an operator object is
//! an equality test. Dotted field names address nested objects.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::LedgerError;

/// A parsed rich query.
#[derive(Debug, Clone, PartialEq)]
pub struct RichQuery {
    pub selector: Selector,
    pub limit: Option<usize>,
}

impl RichQuery {
    pub fn parse(query: &str) -> Result<Self, LedgerError> {
        let doc: Value = serde_json::from_str(query).map_err(|e| invalid(format!("{}", e)))?;
        let obj = doc
            .as_object()
            .ok_or_else(|| invalid("query must be a JSON object"))?;

        let selector = obj
            .get("selector")
            .ok_or_else(|| invalid("query has no \"selector\""))?;
        let selector = Selector::parse(selector)?;

        let limit = match obj.get("limit") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_u64()
                    .ok_or_else(|| invalid("\"limit\" must be a non-negative integer"))?
                    as usize,
            ),
        };

        Ok(RichQuery { selector, limit })
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.selector.matches(doc)
    }
}

/// A compiled selector tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    And(Vec<Selector>),
    Or(Vec<Selector>),
    Not(Box<Selector>),
    Field { path: Vec<String>, cond: Condition },
}

/// A condition on a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    All(Vec<Condition>),
}

impl Selector {
    pub fn parse(value: &Value) -> Result<Self, LedgerError> {
        let obj = value
            .as_object()
            .ok_or_else(|| invalid("selector must be a JSON object"))?;

        let mut clauses = Vec::with_capacity(obj.len());
        for (name, body) in obj {
            let clause = match name.as_str() {
                "$and" => Selector::And(parse_list(name, body)?),
                "$or" => Selector::Or(parse_list(name, body)?),
                "$not" => Selector::Not(Box::new(Selector::parse(body)?)),
                op if op.starts_with('$') => {
                    return Err(invalid(format!("unsupported combinator {}", op)));
                }
                field => Selector::Field {
                    path: field.split('.').map(str::to_string).collect(),
                    cond: Condition::parse(body)?,
                },
            };
            clauses.push(clause);
        }

        Ok(if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Selector::And(clauses)
        })
    }

    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Selector::And(all) => all.iter().all(|s| s.matches(doc)),
            Selector::Or(any) => any.iter().any(|s| s.matches(doc)),
            Selector::Not(inner) => !inner.matches(doc),
            Selector::Field { path, cond } => cond.matches(lookup(doc, path)),
        }
    }
}

impl Condition {
    fn parse(body: &Value) -> Result<Self, LedgerError> {
        let ops = match body {
            Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => map,
            other => return Ok(Condition::Eq(other.clone())),
        };

        let mut conds = Vec::with_capacity(ops.len());
        for (op, arg) in ops {
            conds.push(Condition::parse_operator(op, arg)?);
        }
        Ok(if conds.len() == 1 {
            conds.remove(0)
        } else {
            Condition::All(conds)
        })
    }

    fn parse_operator(op: &str, arg: &Value) -> Result<Self, LedgerError> {
        Ok(match op {
            "$eq" => Condition::Eq(arg.clone()),
            "$ne" => Condition::Ne(arg.clone()),
            "$gt" => Condition::Gt(arg.clone()),
            "$gte" => Condition::Gte(arg.clone()),
            "$lt" => Condition::Lt(arg.clone()),
            "$lte" => Condition::Lte(arg.clone()),
            "$in" => Condition::In(array_arg(op, arg)?),
            "$nin" => Condition::Nin(array_arg(op, arg)?),
            "$exists" => Condition::Exists(
                arg.as_bool()
                    .ok_or_else(|| invalid("$exists takes a boolean"))?,
            ),
            other => return Err(invalid(format!("unsupported operator {}", other))),
        })
    }

    fn matches(&self, field: Option<&Value>) -> bool {
        match self {
            Condition::Exists(expected) => field.is_some() == *expected,
            Condition::Ne(v) => field.map_or(true, |f| !json_eq(f, v)),
            Condition::Nin(vs) => field.map_or(true, |f| !vs.iter().any(|v| json_eq(f, v))),
            Condition::All(conds) => conds.iter().all(|c| c.matches(field)),
            _ => match field {
                None => false,
                Some(f) => match self {
                    Condition::Eq(v) => json_eq(f, v),
                    Condition::In(vs) => vs.iter().any(|v| json_eq(f, v)),
                    Condition::Gt(v) => compare(f, v) == Some(Ordering::Greater),
                    Condition::Gte(v) => {
                        matches!(compare(f, v), Some(Ordering::Greater | Ordering::Equal))
                    }
                    Condition::Lt(v) => compare(f, v) == Some(Ordering::Less),
                    Condition::Lte(v) => {
                        matches!(compare(f, v), Some(Ordering::Less | Ordering::Equal))
                    }
                    _ => false,
                },
            },
        }
    }
}

fn parse_list(name: &str, body: &Value) -> Result<Vec<Selector>, LedgerError> {
    body.as_array()
        .ok_or_else(|| invalid(format!("{} takes an array of selectors", name)))?
        .iter()
        .map(Selector::parse)
        .collect()
}

fn array_arg(op: &str, arg: &Value) -> Result<Vec<Value>, LedgerError> {
    arg.as_array()
        .cloned()
        .ok_or_else(|| invalid(format!("{} takes an array", op)))
}

fn lookup<'a>(doc: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter()
        .try_fold(doc, |cur, segment| cur.as_object()?.get(segment))
}

/// Ordering for range operators: numbers with numbers, strings with strings.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Equality where `6` and `6.0` are the same number.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn invalid(reason: impl Into<String>) -> LedgerError {
    LedgerError::InvalidQuery {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn q(s: &str) -> RichQuery {
        RichQuery::parse(s).unwrap()
    }

    #[test]
    fn implicit_equality() {
        let query = q(r#"{"selector":{"owner":"VisaWorld"}}"#);
        assert!(query.matches(&json!({"owner": "VisaWorld", "currentState": 1})));
        assert!(!query.matches(&json!({"owner": "Embassy"})));
        assert!(!query.matches(&json!({"currentState": 1})));
    }

    #[test]
    fn numeric_equality_matches_integer_codes() {
        let query = q(r#"{"selector":{"currentState":6}}"#);
        assert!(query.matches(&json!({"currentState": 6})));
        assert!(!query.matches(&json!({"currentState": 7})));
    }

    #[test]
    fn integer_and_float_numbers_compare_equal() {
        assert!(q(r#"{"selector":{"currentState":6.0}}"#).matches(&json!({"currentState": 6})));
        assert!(q(r#"{"selector":{"currentState":{"$eq":6}}}"#)
            .matches(&json!({"currentState": 6.0})));
        assert!(q(r#"{"selector":{"currentState":{"$in":[1.0,6.0]}}}"#)
            .matches(&json!({"currentState": 6})));

        let ne = q(r#"{"selector":{"currentState":{"$ne":6.0}}}"#);
        assert!(!ne.matches(&json!({"currentState": 6})));
        assert!(ne.matches(&json!({"currentState": 7})));

        let nin = q(r#"{"selector":{"currentState":{"$nin":[6.0]}}}"#);
        assert!(!nin.matches(&json!({"currentState": 6})));
        assert!(nin.matches(&json!({})));

        // Strings are never numbers.
        assert!(!q(r#"{"selector":{"currentState":"6"}}"#).matches(&json!({"currentState": 6})));
    }

    #[test]
    fn operators_and_combinators() {
        let query = q(
            r#"{"selector":{"$or":[{"currentState":{"$in":[6,7]}},{"owner":{"$eq":"x"}}]}}"#,
        );
        assert!(query.matches(&json!({"currentState": 7})));
        assert!(query.matches(&json!({"owner": "x", "currentState": 1})));
        assert!(!query.matches(&json!({"owner": "y", "currentState": 1})));

        let range = q(
            r#"{"selector":{"submissionDateTime":{"$gte":"2024-05-01","$lt":"2024-06-01"}}}"#,
        );
        assert!(range.matches(&json!({"submissionDateTime": "2024-05-15"})));
        assert!(!range.matches(&json!({"submissionDateTime": "2024-06-02"})));
    }

    #[test]
    fn not_exists_and_ne() {
        let query = q(
            r#"{"selector":{"approvingDateTime":{"$exists":false},"owner":{"$ne":"x"}}}"#,
        );
        assert!(query.matches(&json!({"owner": "y"})));
        assert!(!query.matches(&json!({"owner": "y", "approvingDateTime": "2024"})));
        assert!(!query.matches(&json!({"owner": "x"})));

        let negated = q(r#"{"selector":{"$not":{"owner":"x"}}}"#);
        assert!(negated.matches(&json!({"owner": "y"})));
    }

    #[test]
    fn nested_field_paths() {
        let query = q(r#"{"selector":{"applicant.country":"NZ"}}"#);
        assert!(query.matches(&json!({"applicant": {"country": "NZ"}})));
        assert!(!query.matches(&json!({"applicant": "NZ"})));
    }

    #[test]
    fn parses_limit() {
        assert_eq!(q(r#"{"selector":{},"limit":3}"#).limit, Some(3));
        assert_eq!(q(r#"{"selector":{}}"#).limit, None);
    }

    #[test]
    fn empty_selector_matches_everything() {
        assert!(q(r#"{"selector":{}}"#).matches(&json!({"a": 1})));
    }

    #[test]
    fn malformed_queries_are_rejected() {
        for bad in [
            "not json",
            "[]",
            r#"{"limit":1}"#,
            r#"{"selector":{"a":{"$regex":"x"}}}"#,
            r#"{"selector":{"$nor":[]}}"#,
            r#"{"selector":{"a":{"$in":1}}}"#,
            r#"{"selector":{},"limit":-1}"#,
        ] {
            assert!(
                matches!(RichQuery::parse(bad), Err(LedgerError::InvalidQuery { .. })),
                "expected rejection of {}",
                bad
            );
        }
    }
}
