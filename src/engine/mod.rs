//! Query execution engine
//!
//! Splits a query over contiguous row ranges of its target table,
//! fans the ranges out to a worker pool and recombines the partial
//! results. See [`Database::run`] for the entry point.

mod database;
mod job;
mod task;
mod worker;

pub use database::{Database, TableCell};
