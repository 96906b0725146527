//! FILENAME: engine/src/datasource.rs
//! PURPOSE: The driver interface between the engine and tabular inputs.
//! CONTEXT: A datasource is a named, connected driver instance. Queries are
//! opened on a datasource and return a cursor (`QueryDriver`). The engine
//! never sees driver-native values: a cursor reports each column of the
//! current row as optional bytes through a `ColumnSetter`, which converts
//! them to the column's declared kind.
//!
//! LIFECYCLE:
//! connect --> open_query --> (describe, rewind, next/populate_result ...) --> free --> close

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::encoding::{decode_column, Encoding};
use crate::error::EngineResult;
use crate::slot::Slot;
use crate::value::{Coercion, ResultValue, ValueKind};
use crate::query::QueryColumn;
use crate::array_source::ArrayTable;

/// Name and declared kind of a result column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ValueKind,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        ColumnDef {
            name: name.into(),
            kind,
        }
    }
}

/// What a query asks its datasource for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuerySource {
    /// Driver-specific query text (SQL, a file name, ...).
    Text(String),
    /// In-memory rows.
    Array(ArrayTable),
}

impl QuerySource {
    pub fn kind_name(&self) -> &'static str {
        match self {
            QuerySource::Text(_) => "text",
            QuerySource::Array(_) => "array",
        }
    }
}

/// A datasource driver instance.
pub trait DataSourceDriver: fmt::Debug {
    /// The registry name of the driver.
    fn driver_name(&self) -> &str;

    fn connect(&mut self) -> EngineResult<()> {
        Ok(())
    }

    /// Opens a query. Drivers reject sources they cannot serve.
    fn open_query(&mut self, name: &str, source: QuerySource) -> EngineResult<Box<dyn QueryDriver>>;

    fn close(&mut self) {}
}

/// A cursor over the rows of one query.
///
/// The cursor starts before the first row. `next` moves to the following
/// row and reports whether one exists; after the last row `is_done` holds
/// and `populate_result` reports every column as NULL.
pub trait QueryDriver: fmt::Debug {
    fn describe(&self) -> Vec<ColumnDef>;

    /// Moves back before the first row.
    fn rewind(&mut self);

    fn next(&mut self) -> bool;

    fn is_done(&self) -> bool;

    /// Reports the current row's columns.
    fn populate_result(&self, setter: &mut ColumnSetter<'_>);

    /// Releases driver resources; the cursor is not used afterwards.
    fn free(&mut self) {}
}

// ========================================
// COLUMN SETTER
// ========================================

/// Writes driver data into the Current slot of a query's columns.
pub struct ColumnSetter<'a> {
    columns: &'a mut [QueryColumn],
    coercion: Coercion<'a>,
    encoding: Option<Encoding>,
    scratch: String,
}

impl<'a> ColumnSetter<'a> {
    pub fn new(
        columns: &'a mut [QueryColumn],
        coercion: Coercion<'a>,
        encoding: Option<Encoding>,
    ) -> Self {
        ColumnSetter {
            columns,
            coercion,
            encoding,
            scratch: String::new(),
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Sets column `index` of the current row. `None` is NULL. Indexes past
    /// the described columns are ignored.
    pub fn set(&mut self, index: usize, bytes: Option<&[u8]>) {
        let column = match self.columns.get_mut(index) {
            Some(column) => column,
            None => return,
        };
        let value = match bytes {
            None => ResultValue::null(column.kind),
            Some(bytes) => {
                let text = decode_column(bytes, self.encoding, &mut self.scratch);
                ResultValue::from_text(column.kind, Some(text), &self.coercion)
            }
        };
        *column.ring.get_mut(Slot::Current) = value;
    }

    /// Sets every column to NULL.
    pub fn set_all_null(&mut self) {
        for column in self.columns.iter_mut() {
            *column.ring.get_mut(Slot::Current) = ResultValue::null(column.kind);
        }
    }
}

// ========================================
// DATASOURCE
// ========================================

/// A named datasource of a report context.
#[derive(Debug)]
pub struct DataSource {
    name: String,
    driver: Box<dyn DataSourceDriver>,
    encoding: Option<Encoding>,
}

impl DataSource {
    pub fn new(name: &str, mut driver: Box<dyn DataSourceDriver>) -> EngineResult<Self> {
        driver.connect()?;
        Ok(DataSource {
            name: name.to_string(),
            driver,
            encoding: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver_name(&self) -> &str {
        self.driver.driver_name()
    }

    /// Default encoding for queries of this datasource.
    pub fn set_encoding(&mut self, encoding: Option<&str>) -> EngineResult<()> {
        self.encoding = encoding.map(Encoding::from_name).transpose()?;
        Ok(())
    }

    pub fn encoding(&self) -> Option<Encoding> {
        self.encoding
    }

    pub fn open_query(&mut self, name: &str, source: QuerySource) -> EngineResult<Box<dyn QueryDriver>> {
        log::debug!(
            "datasource '{}': opening {} query '{}'",
            self.name,
            source.kind_name(),
            name
        );
        self.driver.open_query(name, source)
    }
}

impl Drop for DataSource {
    fn drop(&mut self) {
        self.driver.close();
    }
}
