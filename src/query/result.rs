//! Query result value objects

use crate::table::{Key, Value};
use crate::LemonError;
use std::fmt;

/// Final result of one query, returned to the caller after combine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    /// Query succeeded with nothing to report
    Null,
    /// Number of records affected or counted
    RecordCount(usize),
    /// Projected rows in scan order
    Rows {
        fields: Vec<String>,
        rows: Vec<(Key, Vec<Value>)>,
    },
    /// Aggregate value; `None` is the empty aggregate
    Aggregate(Option<i64>),
    /// Query failed
    Error {
        query: &'static str,
        table: String,
        message: String,
    },
}

impl QueryResult {
    /// Build the error result for a query-layer failure
    pub fn error(query: &'static str, table: impl Into<String>, err: &LemonError) -> Self {
        QueryResult::Error {
            query,
            table: table.into(),
            message: err.to_string(),
        }
    }

    /// Whether this is the error result
    pub fn is_error(&self) -> bool {
        matches!(self, QueryResult::Error { .. })
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryResult::Null => write!(f, "OK"),
            QueryResult::RecordCount(n) => write!(f, "{}", n),
            QueryResult::Rows { rows, .. } => {
                for (i, (key, values)) in rows.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "( {}", key)?;
                    for value in values {
                        write!(f, " {}", value)?;
                    }
                    write!(f, " )")?;
                }
                Ok(())
            }
            QueryResult::Aggregate(Some(value)) => write!(f, "{}", value),
            QueryResult::Aggregate(None) => write!(f, "EMPTY"),
            QueryResult::Error {
                query,
                table,
                message,
            } => write!(f, "ERROR: {} on \"{}\": {}", query, table, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_forms() {
        assert_eq!(QueryResult::Null.to_string(), "OK");
        assert_eq!(QueryResult::RecordCount(3).to_string(), "3");
        assert_eq!(QueryResult::Aggregate(Some(-5)).to_string(), "-5");
        assert_eq!(QueryResult::Aggregate(None).to_string(), "EMPTY");

        let rows = QueryResult::Rows {
            fields: vec!["A".to_string()],
            rows: vec![
                ("k1".to_string(), vec![1]),
                ("k2".to_string(), vec![2]),
            ],
        };
        assert_eq!(rows.to_string(), "( k1 1 )\n( k2 2 )");

        let err = QueryResult::error("COUNT", "t", &LemonError::TableNotFound("t".to_string()));
        assert!(err.is_error());
        assert!(err.to_string().contains("No such table"));
    }
}
