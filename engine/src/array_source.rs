//! FILENAME: engine/src/array_source.rs
//! PURPOSE: The in-memory `array` datasource driver.
//! CONTEXT: The first row of an ArrayTable holds the column names, the rest
//! are data rows of optional strings. Column kinds default to String and can
//! be declared per column; the engine converts the text when a row is read.

use serde::{Deserialize, Serialize};

use crate::datasource::{ColumnDef, ColumnSetter, DataSourceDriver, QueryDriver, QuerySource};
use crate::error::{EngineError, EngineResult};
use crate::value::ValueKind;

pub const ARRAY_DRIVER: &str = "array";

/// Rows of text; row 0 is the header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayTable {
    pub rows: Vec<Vec<Option<String>>>,
    #[serde(default)]
    pub types: Vec<ValueKind>,
}

impl ArrayTable {
    /// Builds a table from string rows; the first row is the header.
    pub fn from_rows(rows: &[&[&str]]) -> Self {
        ArrayTable {
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| Some(cell.to_string())).collect())
                .collect(),
            types: Vec::new(),
        }
    }

    pub fn with_types(mut self, types: &[ValueKind]) -> Self {
        self.types = types.to_vec();
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }

    pub fn columns(&self) -> Vec<ColumnDef> {
        let header = match self.rows.first() {
            Some(header) => header,
            None => return Vec::new(),
        };
        header
            .iter()
            .enumerate()
            .map(|(i, name)| {
                ColumnDef::new(
                    name.clone().unwrap_or_default(),
                    self.types.get(i).copied().unwrap_or(ValueKind::String),
                )
            })
            .collect()
    }
}

/// Driver serving ArrayTable queries.
#[derive(Debug, Default)]
pub struct ArrayDriver;

impl DataSourceDriver for ArrayDriver {
    fn driver_name(&self) -> &str {
        ARRAY_DRIVER
    }

    fn open_query(&mut self, name: &str, source: QuerySource) -> EngineResult<Box<dyn QueryDriver>> {
        match source {
            QuerySource::Array(table) => {
                if table.rows.is_empty() {
                    return Err(EngineError::UnsupportedQuery {
                        source_name: ARRAY_DRIVER.to_string(),
                        query: name.to_string(),
                        reason: "the array has no header row".to_string(),
                    });
                }
                Ok(Box::new(ArrayCursor::new(table)))
            }
            QuerySource::Text(_) => Err(EngineError::UnsupportedQuery {
                source_name: ARRAY_DRIVER.to_string(),
                query: name.to_string(),
                reason: "only in-memory arrays are supported".to_string(),
            }),
        }
    }
}

/// Cursor over an ArrayTable. Position 0 is before the first data row.
#[derive(Debug)]
pub struct ArrayCursor {
    table: ArrayTable,
    columns: Vec<ColumnDef>,
    position: usize,
}

impl ArrayCursor {
    pub fn new(table: ArrayTable) -> Self {
        let columns = table.columns();
        ArrayCursor {
            table,
            columns,
            position: 0,
        }
    }
}

impl QueryDriver for ArrayCursor {
    fn describe(&self) -> Vec<ColumnDef> {
        self.columns.clone()
    }

    fn rewind(&mut self) {
        self.position = 0;
    }

    fn next(&mut self) -> bool {
        if self.position <= self.table.row_count() {
            self.position += 1;
        }
        !self.is_done()
    }

    fn is_done(&self) -> bool {
        self.position > self.table.row_count()
    }

    fn populate_result(&self, setter: &mut ColumnSetter<'_>) {
        let row = match self.position {
            0 => None,
            p => self.table.rows.get(p),
        };
        match row {
            Some(row) => {
                for index in 0..setter.column_count() {
                    let cell = row.get(index).and_then(|c| c.as_deref());
                    setter.set(index, cell.map(str::as_bytes));
                }
            }
            None => setter.set_all_null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> ArrayTable {
        ArrayTable::from_rows(&[&["name", "age"], &["Fred", "31"], &["Mary", "28"]])
            .with_types(&[ValueKind::String, ValueKind::Number])
    }

    #[test]
    fn test_columns_from_header() {
        let columns = people().columns();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0], ColumnDef::new("name", ValueKind::String));
        assert_eq!(columns[1], ColumnDef::new("age", ValueKind::Number));
    }

    #[test]
    fn test_cursor_walks_rows() {
        let mut cursor = ArrayCursor::new(people());
        assert!(!cursor.is_done());
        assert!(cursor.next());
        assert!(cursor.next());
        assert!(!cursor.next());
        assert!(cursor.is_done());
        assert!(!cursor.next());

        cursor.rewind();
        assert!(cursor.next());
        assert_eq!(cursor.position, 1);
    }

    #[test]
    fn test_text_queries_rejected() {
        let mut driver = ArrayDriver;
        let result = driver.open_query("q", QuerySource::Text("select 1".into()));
        assert!(matches!(result, Err(EngineError::UnsupportedQuery { .. })));
        let result = driver.open_query("q", QuerySource::Array(ArrayTable::default()));
        assert!(result.is_err());
    }

    #[test]
    fn test_table_from_json() {
        let table: ArrayTable =
            serde_json::from_str(r#"{"rows": [["a"], ["1"], [null]], "types": ["number"]}"#).unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.columns()[0].kind, ValueKind::Number);
        assert_eq!(table.rows[2][0], None);
    }
}
