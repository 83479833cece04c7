//! Bulk-load stream parsing and table dumps
//!
//! The on-wire text format is one header line `name|field1|...|fieldK`
//! followed by one row per line `key|v1|...|vK`. Empty lines are
//! skipped. [`std::fmt::Display`] on [`Table`] emits the same format.

use super::{Table, Value};
use crate::{LemonError, Result};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Load a table from a plain-text stream
pub fn load_table<R: BufRead>(reader: R) -> Result<Table> {
    let mut lines = reader.lines().enumerate();

    let (header_no, header) = loop {
        match lines.next() {
            Some((i, line)) => {
                let line = line?;
                if !line.trim().is_empty() {
                    break (i + 1, line);
                }
            }
            None => {
                return Err(LemonError::MalformedInput {
                    line: 1,
                    reason: "missing header line".to_string(),
                })
            }
        }
    };

    let mut parts = header.trim().split('|');
    let name = match parts.next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            return Err(LemonError::MalformedInput {
                line: header_no,
                reason: "missing table name".to_string(),
            })
        }
    };
    let mut table = Table::new(name, parts)?;
    let arity = table.field_count();

    for (i, line) in lines {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_no = i + 1;
        let mut parts = line.split('|');
        let key = parts.next().unwrap_or_default();
        let values = parts
            .map(|v| {
                v.parse::<Value>().map_err(|_| LemonError::MalformedInput {
                    line: line_no,
                    reason: format!("invalid integer \"{}\"", v),
                })
            })
            .collect::<Result<Vec<Value>>>()?;
        if values.len() != arity {
            return Err(LemonError::MalformedInput {
                line: line_no,
                reason: format!("expected {} values, got {}", arity, values.len()),
            });
        }
        table.insert_by_index(key, values)?;
    }

    Ok(table)
}

/// Load a table from a file
pub fn load_table_from_path(path: impl AsRef<Path>) -> Result<Table> {
    let file = File::open(path)?;
    load_table(BufReader::new(file))
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        for field in self.fields() {
            write!(f, "|{}", field)?;
        }
        writeln!(f)?;
        for row in self.iter() {
            write!(f, "{}", row.key())?;
            for value in row.values() {
                write!(f, "|{}", value)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;

    #[test]
    fn test_load_basic() {
        let input = "t|A|B\nk1|1|2\n\nk2|3|4\n";
        let table = load_table(Cursor::new(input)).unwrap();
        assert_eq!(table.name(), "t");
        assert_eq!(table.fields(), ["A", "B"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(1).unwrap().key(), "k2");
        assert_eq!(table.row(1).unwrap().get(1), Some(4));
    }

    #[test]
    fn test_load_arity_mismatch() {
        let err = load_table(Cursor::new("t|A|B\nk1|1\n")).unwrap_err();
        assert!(matches!(err, LemonError::MalformedInput { line: 2, .. }));
    }

    #[test]
    fn test_load_bad_integer() {
        let err = load_table(Cursor::new("t|A\nk1|x\n")).unwrap_err();
        assert!(matches!(err, LemonError::MalformedInput { line: 2, .. }));
    }

    #[test]
    fn test_load_duplicate_key() {
        let err = load_table(Cursor::new("t|A\nk1|1\nk1|2\n")).unwrap_err();
        assert!(matches!(err, LemonError::DuplicateKey(_)));
    }

    #[test]
    fn test_load_empty_stream() {
        let err = load_table(Cursor::new("\n\n")).unwrap_err();
        assert!(matches!(err, LemonError::MalformedInput { line: 1, .. }));
    }

    #[test]
    fn test_dump_reloads() {
        let input = "t|A|B\nk1|1|2\nk2|-3|4\n";
        let table = load_table(Cursor::new(input)).unwrap();
        let dumped = table.to_string();
        assert_eq!(dumped, input);
        let reloaded = load_table(Cursor::new(dumped.as_bytes())).unwrap();
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.tbl");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "t|A\nk1|1\n").unwrap();
        let table = load_table_from_path(&path).unwrap();
        assert_eq!(table.len(), 1);
    }
}
