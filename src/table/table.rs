//! Table implementation

use crate::{LemonError, Result};
use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;

/// Unique row identifier within a table
pub type Key = String;
/// Named column of a table
pub type FieldId = String;
/// Cell value; all columns are 32-bit signed integers
pub type Value = i32;

/// Reserved pseudo-field referring to the row key
pub const KEY_FIELD: &str = "KEY";

/// A row in a table: key plus values in field order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datum {
    key: Key,
    values: Vec<Value>,
}

impl Datum {
    pub(crate) fn new(key: Key, values: Vec<Value>) -> Self {
        Self { key, values }
    }

    /// Row key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Values in field order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value at a field position
    pub fn get(&self, index: usize) -> Option<Value> {
        self.values.get(index).copied()
    }
}

/// Rows scheduled by DUPLICATE tasks, merged into the table at combine time
#[derive(Debug, Default)]
struct DuplicateBuffer {
    rows: Vec<Datum>,
    keys: AHashSet<Key>,
}

/// A table in the database
///
/// Rows are addressable by position; positions are stable only within a
/// single scan and only while the caller is the sole writer (delete is
/// swap-with-last). Duplicates produced during a scan land in a pending
/// buffer and become visible after [`Table::merge_duplicates`].
#[derive(Debug)]
pub struct Table {
    /// Table name
    name: String,
    /// Ordered field list
    fields: Vec<FieldId>,
    /// Field name -> position, populated once at construction
    field_index: AHashMap<FieldId, usize>,
    /// Ordered row storage
    rows: Vec<Datum>,
    /// Keys currently present in `rows`
    key_index: AHashSet<Key>,
    /// Append-only buffer of deferred duplicates
    pending: Mutex<DuplicateBuffer>,
}

impl Table {
    /// Create a table from a schema declaration
    pub fn new<S: Into<FieldId>>(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        let fields: Vec<FieldId> = fields.into_iter().map(Into::into).collect();
        let mut field_index = AHashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if field == KEY_FIELD {
                return Err(LemonError::ReservedField(field.clone()));
            }
            if field_index.insert(field.clone(), i).is_some() {
                return Err(LemonError::DuplicateField(field.clone()));
            }
        }
        Ok(Self {
            name: name.into(),
            fields,
            field_index,
            rows: Vec::new(),
            key_index: AHashSet::new(),
            pending: Mutex::new(DuplicateBuffer::default()),
        })
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the table
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Ordered field list
    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }

    /// Number of fields
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Position of a field by name
    pub fn field_position(&self, field: &str) -> Option<usize> {
        self.field_index.get(field).copied()
    }

    /// Position of a field, failing with `UnknownField`
    pub fn require_field(&self, field: &str) -> Result<usize> {
        self.field_position(field)
            .ok_or_else(|| LemonError::UnknownField(field.to_string()))
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.key_index.contains(key)
    }

    /// Insert a row from field-name/value pairs; unspecified fields default to 0
    pub fn insert(&mut self, key: impl Into<Key>, assoc: &[(&str, Value)]) -> Result<()> {
        let mut values = vec![0; self.fields.len()];
        for (field, value) in assoc {
            let index = self.require_field(field)?;
            values[index] = *value;
        }
        self.insert_by_index(key, values)
    }

    /// Insert a row from positional values
    pub fn insert_by_index(&mut self, key: impl Into<Key>, values: Vec<Value>) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(LemonError::InvalidOperand("empty row key".to_string()));
        }
        if values.len() != self.fields.len() {
            return Err(LemonError::ArityMismatch {
                expected: self.fields.len(),
                actual: values.len(),
            });
        }
        if !self.key_index.insert(key.clone()) {
            return Err(LemonError::DuplicateKey(key));
        }
        self.rows.push(Datum::new(key, values));
        Ok(())
    }

    /// Remove the row at `pos` in O(1) by swapping with the last row.
    ///
    /// Invalidates the last row's position; legal only from the sole
    /// writer of the table. Returns the erased key.
    pub fn erase_at(&mut self, pos: usize) -> Result<Key> {
        if pos >= self.rows.len() {
            return Err(LemonError::Internal(format!(
                "erase position {} out of range (size {})",
                pos,
                self.rows.len()
            )));
        }
        let datum = self.rows.swap_remove(pos);
        self.key_index.remove(&datum.key);
        Ok(datum.key)
    }

    /// Remove the row with `key`, resolving its position by scan.
    ///
    /// Fails with `KeyNotFound`; same writer discipline as
    /// [`Table::erase_at`].
    pub fn erase_key(&mut self, key: &str) -> Result<()> {
        if !self.key_index.contains(key) {
            return Err(LemonError::KeyNotFound(key.to_string()));
        }
        let pos = self
            .rows
            .iter()
            .position(|datum| datum.key() == key)
            .ok_or_else(|| {
                LemonError::Internal(format!("key \"{}\" indexed but not stored", key))
            })?;
        self.erase_at(pos).map(|_| ())
    }

    /// Apply `field position := value` assignments to the row at `pos`
    pub fn update_at(&mut self, pos: usize, assigns: &[(usize, Value)]) -> Result<()> {
        let datum = self.rows.get_mut(pos).ok_or_else(|| {
            LemonError::Internal(format!("update position {} out of range", pos))
        })?;
        for &(index, value) in assigns {
            match datum.values.get_mut(index) {
                Some(slot) => *slot = value,
                None => {
                    return Err(LemonError::Internal(format!(
                        "field index {} out of range",
                        index
                    )))
                }
            }
        }
        Ok(())
    }

    /// Schedule a copy of `row` into the pending-duplicate buffer.
    ///
    /// The copy gets key `{K}_copyN` for the smallest positive N not yet
    /// taken by an existing or pending key. Does not mutate `rows`; safe
    /// to call from concurrent scanners.
    pub fn schedule_duplicate(&self, row: &Datum) {
        let mut pending = self.pending.lock();
        let key = self.generate_copy_key(row.key(), &pending);
        pending.keys.insert(key.clone());
        pending.rows.push(Datum::new(key, row.values.clone()));
    }

    fn generate_copy_key(&self, base: &str, pending: &DuplicateBuffer) -> Key {
        let mut n = 1u32;
        loop {
            let candidate = format!("{}_copy{}", base, n);
            if !self.key_index.contains(&candidate) && !pending.keys.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Number of rows waiting in the pending-duplicate buffer
    pub fn pending_duplicates(&self) -> usize {
        self.pending.lock().rows.len()
    }

    /// Move the pending-duplicate buffer into `rows`, registering keys.
    ///
    /// Called exactly once per DUPLICATE query at combine time. Returns
    /// the number of rows merged.
    pub fn merge_duplicates(&mut self) -> Result<usize> {
        let buffer = {
            let mut pending = self.pending.lock();
            std::mem::take(&mut *pending)
        };
        let merged = buffer.rows.len();
        self.rows.reserve(merged);
        for datum in buffer.rows {
            if !self.key_index.insert(datum.key.clone()) {
                return Err(LemonError::DuplicateKey(datum.key));
            }
            self.rows.push(datum);
        }
        Ok(merged)
    }

    /// Remove all rows, returning the prior row count
    pub fn clear(&mut self) -> usize {
        let count = self.rows.len();
        self.rows.clear();
        self.key_index.clear();
        count
    }

    /// Row storage as a slice
    pub fn rows(&self) -> &[Datum] {
        &self.rows
    }

    /// Row handle at a position
    pub fn row(&self, pos: usize) -> Option<RowRef<'_>> {
        self.rows.get(pos).map(|datum| RowRef { table: self, datum })
    }

    /// Iterate all rows as handles
    pub fn iter(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(move |datum| RowRef { table: self, datum })
    }

    /// Iterate the half-open row range `[begin, end)` as handles
    pub fn iter_range(&self, begin: usize, end: usize) -> impl Iterator<Item = RowRef<'_>> {
        let end = end.min(self.rows.len());
        let begin = begin.min(end);
        self.rows[begin..end]
            .iter()
            .map(move |datum| RowRef { table: self, datum })
    }
}

/// Row handle scoped to one scan of its table.
///
/// Gives O(1) access by field position and O(1) amortized access by
/// field name.
#[derive(Clone, Copy)]
pub struct RowRef<'a> {
    table: &'a Table,
    datum: &'a Datum,
}

impl<'a> RowRef<'a> {
    /// Row key
    pub fn key(&self) -> &'a str {
        self.datum.key()
    }

    /// Values in field order
    pub fn values(&self) -> &'a [Value] {
        self.datum.values()
    }

    /// Value at a field position
    pub fn get(&self, index: usize) -> Option<Value> {
        self.datum.get(index)
    }

    /// Value by field name
    pub fn get_named(&self, field: &str) -> Result<Value> {
        let index = self.table.require_field(field)?;
        self.datum.get(index).ok_or_else(|| {
            LemonError::Internal(format!("field index {} out of range", index))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        let mut table = Table::new("t", ["A", "B"]).unwrap();
        table.insert_by_index("k1", vec![1, 2]).unwrap();
        table.insert_by_index("k2", vec![3, 4]).unwrap();
        table.insert_by_index("k3", vec![5, 6]).unwrap();
        table
    }

    #[test]
    fn test_schema_validation() {
        assert!(matches!(
            Table::new("t", ["A", "A"]),
            Err(LemonError::DuplicateField(_))
        ));
        assert!(matches!(
            Table::new("t", ["A", "KEY"]),
            Err(LemonError::ReservedField(_))
        ));

        let table = Table::new("t", ["A", "B", "C"]).unwrap();
        assert_eq!(table.field_count(), 3);
        assert_eq!(table.field_position("B"), Some(1));
        assert_eq!(table.field_position("KEY"), None);
    }

    #[test]
    fn test_insert_assoc_defaults() {
        let mut table = Table::new("t", ["A", "B"]).unwrap();
        table.insert("k1", &[("B", 7)]).unwrap();
        let row = table.row(0).unwrap();
        assert_eq!(row.get(0), Some(0));
        assert_eq!(row.get_named("B").unwrap(), 7);

        assert!(matches!(
            table.insert("k2", &[("C", 1)]),
            Err(LemonError::UnknownField(_))
        ));
        assert!(matches!(
            table.insert("k1", &[]),
            Err(LemonError::DuplicateKey(_))
        ));
        assert!(table.contains_key("k1"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_insert_by_index_arity() {
        let mut table = Table::new("t", ["A", "B"]).unwrap();
        assert!(matches!(
            table.insert_by_index("k1", vec![1]),
            Err(LemonError::ArityMismatch {
                expected: 2,
                actual: 1
            })
        ));
        assert!(matches!(
            table.insert_by_index("", vec![1, 2]),
            Err(LemonError::InvalidOperand(_))
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_erase_swaps_last() {
        let mut table = sample_table();
        let erased = table.erase_at(0).unwrap();
        assert_eq!(erased, "k1");
        assert_eq!(table.len(), 2);
        assert!(!table.contains_key("k1"));
        // Last row moved into the erased slot
        assert_eq!(table.row(0).unwrap().key(), "k3");

        assert!(matches!(table.erase_at(5), Err(LemonError::Internal(_))));
    }

    #[test]
    fn test_erase_key() {
        let mut table = sample_table();
        table.erase_key("k2").unwrap();
        assert_eq!(table.len(), 2);
        assert!(!table.contains_key("k2"));
        let keys: Vec<&str> = table.iter().map(|r| r.key()).collect();
        assert_eq!(keys, ["k1", "k3"]);

        assert!(matches!(
            table.erase_key("k2"),
            Err(LemonError::KeyNotFound(_))
        ));
        assert!(matches!(
            table.erase_key("nope"),
            Err(LemonError::KeyNotFound(_))
        ));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_rename() {
        let mut table = sample_table();
        table.set_name("renamed");
        assert_eq!(table.name(), "renamed");
        assert!(table.to_string().starts_with("renamed|A|B\n"));
    }

    #[test]
    fn test_update_at() {
        let mut table = sample_table();
        table.update_at(1, &[(0, 42)]).unwrap();
        assert_eq!(table.row(1).unwrap().get(0), Some(42));
        assert!(table.update_at(9, &[(0, 1)]).is_err());
    }

    #[test]
    fn test_duplicate_key_generation() {
        let mut table = sample_table();
        let row = table.rows()[0].clone();
        table.schedule_duplicate(&row);
        table.schedule_duplicate(&row);
        assert_eq!(table.pending_duplicates(), 2);

        let merged = table.merge_duplicates().unwrap();
        assert_eq!(merged, 2);
        assert_eq!(table.len(), 5);
        assert!(table.contains_key("k1_copy1"));
        assert!(table.contains_key("k1_copy2"));
        assert_eq!(table.pending_duplicates(), 0);

        // Copies carry the original values
        let copy = table.iter().find(|r| r.key() == "k1_copy1").unwrap();
        assert_eq!(copy.values(), row.values());
    }

    #[test]
    fn test_duplicate_avoids_existing_keys() {
        let mut table = sample_table();
        table.insert_by_index("k1_copy1", vec![9, 9]).unwrap();
        let row = table.rows()[0].clone();
        table.schedule_duplicate(&row);
        table.merge_duplicates().unwrap();
        assert!(table.contains_key("k1_copy2"));
    }

    #[test]
    fn test_clear() {
        let mut table = sample_table();
        assert_eq!(table.clear(), 3);
        assert!(table.is_empty());
        assert!(!table.contains_key("k1"));
        // Schema survives
        assert_eq!(table.field_count(), 2);
        table.insert_by_index("k1", vec![0, 0]).unwrap();
    }

    #[test]
    fn test_iter_range_clamps() {
        let table = sample_table();
        let keys: Vec<&str> = table.iter_range(1, 10).map(|r| r.key()).collect();
        assert_eq!(keys, ["k2", "k3"]);
        assert_eq!(table.iter_range(5, 9).count(), 0);
    }
}
