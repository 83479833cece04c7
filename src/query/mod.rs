//! Query representation
//!
//! One query is a tagged variant over a single target table plus a
//! conjunction condition. Queries are plain data here; planning and
//! execution live in [`crate::engine`].

mod condition;
mod parser;
mod result;

pub use condition::{CompareOp, CompiledCondition, Predicate};
pub use parser::parse_query;
pub use result::QueryResult;

use crate::table::Value;
use std::fmt;

/// Aggregate function over one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateFunc {
    /// Diagnostic name, also the query keyword
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
            AggregateFunc::Avg => "AVG",
        }
    }

    /// Parse the keyword form
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "SUM" => Some(AggregateFunc::Sum),
            "MIN" => Some(AggregateFunc::Min),
            "MAX" => Some(AggregateFunc::Max),
            "AVG" => Some(AggregateFunc::Avg),
            _ => None,
        }
    }
}

/// The operation a query performs on its target table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    /// Count matching rows
    Count,
    /// Project the listed fields of matching rows
    Select { fields: Vec<String> },
    /// Delete matching rows
    Delete,
    /// Duplicate matching rows under fresh keys
    Duplicate,
    /// Assign `field := value` on matching rows
    Update { assignments: Vec<(String, Value)> },
    /// Fold one field of matching rows
    Aggregate { func: AggregateFunc, field: String },
    /// Insert one row; executes inline, never partitioned
    Insert { key: String, values: Vec<Value> },
    /// No operation
    Nop,
}

/// One logical operation over one target table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub kind: QueryKind,
    pub table: String,
    pub condition: Vec<Predicate>,
}

impl Query {
    pub fn new(kind: QueryKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            condition: Vec::new(),
        }
    }

    /// Attach a condition
    pub fn with_condition(mut self, condition: Vec<Predicate>) -> Self {
        self.condition = condition;
        self
    }

    /// Diagnostic name of the query kind
    pub fn qname(&self) -> &'static str {
        match &self.kind {
            QueryKind::Count => "COUNT",
            QueryKind::Select { .. } => "SELECT",
            QueryKind::Delete => "DELETE",
            QueryKind::Duplicate => "DUPLICATE",
            QueryKind::Update { .. } => "UPDATE",
            QueryKind::Aggregate { func, .. } => func.name(),
            QueryKind::Insert { .. } => "INSERT",
            QueryKind::Nop => "NOOP",
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QUERY = {}", self.qname())?;
        if !matches!(self.kind, QueryKind::Nop) {
            write!(f, " \"{}\"", self.table)?;
        }
        if !self.condition.is_empty() {
            write!(f, " WHERE")?;
            for (i, pred) in self.condition.iter().enumerate() {
                if i > 0 {
                    write!(f, " AND")?;
                }
                write!(f, " {}", pred)?;
            }
        }
        Ok(())
    }
}
