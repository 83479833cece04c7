//! Table management module
//!
//! Provides row-oriented table storage with key uniqueness, in-place
//! delete and a deferred-duplicate buffer for concurrent scanners.

mod loader;
mod table;

pub use loader::{load_table, load_table_from_path};
pub use table::{Datum, FieldId, Key, RowRef, Table, Value, KEY_FIELD};
