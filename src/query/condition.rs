//! Query condition evaluation
//!
//! A condition is a conjunction of `(field, op, value)` predicates.
//! Predicates arrive as raw text and are compiled once per query
//! against the target table's schema; evaluation against a row is then
//! a pure function with no allocation.

use crate::table::{Datum, Table, Value, KEY_FIELD};
use crate::{LemonError, Result};
use std::cmp::Ordering;
use std::fmt;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,
}

impl CompareOp {
    /// Parse the textual operator form
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "=" => Some(CompareOp::Equal),
            "<>" => Some(CompareOp::NotEqual),
            "<" => Some(CompareOp::LessThan),
            ">" => Some(CompareOp::GreaterThan),
            "<=" => Some(CompareOp::LessEqual),
            ">=" => Some(CompareOp::GreaterEqual),
            _ => None,
        }
    }

    /// Textual operator form
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Equal => "=",
            CompareOp::NotEqual => "<>",
            CompareOp::LessThan => "<",
            CompareOp::GreaterThan => ">",
            CompareOp::LessEqual => "<=",
            CompareOp::GreaterEqual => ">=",
        }
    }

    #[inline]
    fn allows(&self, ord: Ordering) -> bool {
        match self {
            CompareOp::Equal => ord == Ordering::Equal,
            CompareOp::NotEqual => ord != Ordering::Equal,
            CompareOp::LessThan => ord == Ordering::Less,
            CompareOp::GreaterThan => ord == Ordering::Greater,
            CompareOp::LessEqual => ord != Ordering::Greater,
            CompareOp::GreaterEqual => ord != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw `(field, op, value)` triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub field: String,
    pub op: CompareOp,
    pub value: String,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: CompareOp, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.op, self.value)
    }
}

/// A predicate with its field resolved against a schema
#[derive(Debug, Clone)]
enum CompiledPredicate {
    /// "KEY" comparison, lexicographic
    Key { op: CompareOp, value: String },
    /// Value-field comparison, signed integer order
    Field {
        index: usize,
        op: CompareOp,
        value: Value,
    },
}

/// A condition compiled against one table's schema
#[derive(Debug, Clone, Default)]
pub struct CompiledCondition {
    predicates: Vec<CompiledPredicate>,
}

impl CompiledCondition {
    /// Resolve field names and parse values against `table`'s schema.
    ///
    /// Fails with `IllFormedCondition` if a field is neither in the
    /// schema nor "KEY", or an integer value does not parse.
    pub fn compile(table: &Table, predicates: &[Predicate]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(predicates.len());
        for pred in predicates {
            if pred.field == KEY_FIELD {
                compiled.push(CompiledPredicate::Key {
                    op: pred.op,
                    value: pred.value.clone(),
                });
                continue;
            }
            let index = table.field_position(&pred.field).ok_or_else(|| {
                LemonError::IllFormedCondition(format!(
                    "no such field \"{}\" in table \"{}\"",
                    pred.field,
                    table.name()
                ))
            })?;
            let value = pred.value.parse::<Value>().map_err(|_| {
                LemonError::IllFormedCondition(format!(
                    "invalid integer \"{}\" for field \"{}\"",
                    pred.value, pred.field
                ))
            })?;
            compiled.push(CompiledPredicate::Field {
                index,
                op: pred.op,
                value,
            });
        }
        Ok(Self {
            predicates: compiled,
        })
    }

    /// Whether a row satisfies every predicate; an empty condition is
    /// vacuously true.
    #[inline]
    pub fn matches(&self, key: &str, values: &[Value]) -> bool {
        self.predicates.iter().all(|pred| match pred {
            CompiledPredicate::Key { op, value } => op.allows(key.cmp(value.as_str())),
            CompiledPredicate::Field { index, op, value } => match values.get(*index) {
                Some(actual) => op.allows(actual.cmp(value)),
                None => false,
            },
        })
    }

    /// Convenience form over a whole row
    #[inline]
    pub fn matches_row(&self, datum: &Datum) -> bool {
        self.matches(datum.key(), datum.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        let mut t = Table::new("t", ["A", "B"]).unwrap();
        t.insert_by_index("k1", vec![1, 2]).unwrap();
        t.insert_by_index("k2", vec![3, 4]).unwrap();
        t
    }

    fn compile(t: &Table, preds: &[Predicate]) -> CompiledCondition {
        CompiledCondition::compile(t, preds).unwrap()
    }

    #[test]
    fn test_empty_condition_is_true() {
        let t = table();
        let cond = compile(&t, &[]);
        assert!(cond.matches_row(&t.rows()[0]));
    }

    #[test]
    fn test_field_comparisons() {
        let t = table();
        let cases = [
            (CompareOp::Equal, 1, true),
            (CompareOp::NotEqual, 1, false),
            (CompareOp::LessThan, 2, true),
            (CompareOp::GreaterThan, 1, false),
            (CompareOp::LessEqual, 1, true),
            (CompareOp::GreaterEqual, 2, false),
        ];
        for (op, value, expected) in cases {
            let cond = compile(&t, &[Predicate::new("A", op, value.to_string())]);
            assert_eq!(cond.matches_row(&t.rows()[0]), expected, "A {} {}", op, value);
        }
    }

    #[test]
    fn test_key_is_lexicographic() {
        let t = table();
        let cond = compile(
            &t,
            &[Predicate::new("KEY", CompareOp::GreaterEqual, "k2")],
        );
        assert!(!cond.matches_row(&t.rows()[0]));
        assert!(cond.matches_row(&t.rows()[1]));
    }

    #[test]
    fn test_conjunction() {
        let t = table();
        let cond = compile(
            &t,
            &[
                Predicate::new("A", CompareOp::GreaterEqual, "1"),
                Predicate::new("B", CompareOp::LessThan, "4"),
            ],
        );
        assert!(cond.matches_row(&t.rows()[0]));
        assert!(!cond.matches_row(&t.rows()[1]));
    }

    #[test]
    fn test_compile_errors() {
        let t = table();
        assert!(matches!(
            CompiledCondition::compile(&t, &[Predicate::new("C", CompareOp::Equal, "1")]),
            Err(LemonError::IllFormedCondition(_))
        ));
        assert!(matches!(
            CompiledCondition::compile(&t, &[Predicate::new("A", CompareOp::Equal, "x")]),
            Err(LemonError::IllFormedCondition(_))
        ));
        // KEY values are opaque text, never parsed as integers
        assert!(
            CompiledCondition::compile(&t, &[Predicate::new("KEY", CompareOp::Equal, "k1")])
                .is_ok()
        );
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!(CompareOp::parse("<>"), Some(CompareOp::NotEqual));
        assert_eq!(CompareOp::parse(">="), Some(CompareOp::GreaterEqual));
        assert_eq!(CompareOp::parse("=="), None);
    }
}
