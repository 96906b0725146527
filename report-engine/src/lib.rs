//! FILENAME: report-engine/src/lib.rs
//! Report layer on top of the expression and query engine.
//!
//! Layers:
//! - `definition`: Serializable document definitions (what a document IS)
//! - `layout`: The part/row/column tree that holds reports
//! - `breaks`, `variables`: Grouping and per-row aggregates
//! - `scope`: Name resolution for `v.`, `r.` and `brrownum()`
//! - `report`, `execute`: Building and running one report
//! - `document`: The top-level context owning engine and layout

pub mod breaks;
pub mod definition;
pub mod document;
pub mod error;
pub mod execute;
pub mod layout;
pub mod report;
pub mod scope;
pub mod variables;

pub use breaks::{check_break_fields, Break, BreakAttributes, BreakDef};
pub use definition::*;
pub use document::ReportDocument;
pub use error::{ReportError, ReportResult};
pub use execute::RunSummary;
pub use layout::{Column, ColumnId, Layout, Part, PartId, ReportId, Row, RowId};
pub use report::{BreakCallback, Report, ReportCallback, ReportExpression, ReportView};
pub use scope::{ReportScope, ReportValues, STAGE_NAMES};
pub use variables::{Accumulator, Variable, VariableDef, VariableKind};
