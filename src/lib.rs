//! LemonDB Core Engine
//!
//! An in-memory relational table engine implemented in Rust.
//! Holds a set of named tables and executes a small query language
//! against them with parallel, partitioned evaluation.

pub mod config;
pub mod engine;
pub mod query;
pub mod table;

// Re-export main types
pub use config::EngineConfig;
pub use engine::Database;
pub use query::{AggregateFunc, CompareOp, Predicate, Query, QueryKind, QueryResult};
pub use table::{Datum, RowRef, Table};

/// Engine error type
#[derive(Debug, thiserror::Error)]
pub enum LemonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No such table: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    DuplicateTable(String),

    #[error("Duplicate field name: {0}")]
    DuplicateField(String),

    #[error("Field name \"{0}\" is reserved")]
    ReservedField(String),

    #[error("No such field: {0}")]
    UnknownField(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("No such key: {0}")]
    KeyNotFound(String),

    #[error("Expected {expected} values, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("Ill-formed condition: {0}")]
    IllFormedCondition(String),

    #[error("Invalid operand: {0}")]
    InvalidOperand(String),

    #[error("Malformed input at line {line}: {reason}")]
    MalformedInput { line: usize, reason: String },

    #[error("Query aborted")]
    Aborted,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, LemonError>;
