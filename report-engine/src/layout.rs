//! FILENAME: report-engine/src/layout.rs
//! PURPOSE: The layout tree of a report document.
//! CONTEXT: A document is a list of parts. A part stacks rows, a row places
//! columns side by side, and a column stacks reports. Nodes are addressed
//! by position ids handed out when they are created; nothing is ever
//! removed, so an id stays valid for the life of the document.

use std::fmt;

use crate::error::{ReportError, ReportResult};
use crate::report::Report;

// ========================================
// IDS
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId {
    pub part: usize,
    pub row: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnId {
    pub part: usize,
    pub row: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReportId {
    pub part: usize,
    pub row: usize,
    pub column: usize,
    pub report: usize,
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "report {}.{}.{}.{}", self.part, self.row, self.column, self.report)
    }
}

// ========================================
// NODES
// ========================================

#[derive(Default)]
pub struct Part {
    pub rows: Vec<Row>,
}

#[derive(Default)]
pub struct Row {
    pub columns: Vec<Column>,
}

#[derive(Default)]
pub struct Column {
    pub reports: Vec<Report>,
}

/// The parts of a document and the operations that grow them.
#[derive(Default)]
pub struct Layout {
    parts: Vec<Part>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn new_part(&mut self) -> PartId {
        self.parts.push(Part::default());
        PartId(self.parts.len() - 1)
    }

    pub fn new_row(&mut self, part: PartId) -> ReportResult<RowId> {
        let rows = &mut self
            .parts
            .get_mut(part.0)
            .ok_or(ReportError::InvalidLayout("part"))?
            .rows;
        rows.push(Row::default());
        Ok(RowId {
            part: part.0,
            row: rows.len() - 1,
        })
    }

    pub fn new_column(&mut self, row: RowId) -> ReportResult<ColumnId> {
        let columns = &mut self
            .parts
            .get_mut(row.part)
            .and_then(|p| p.rows.get_mut(row.row))
            .ok_or(ReportError::InvalidLayout("row"))?
            .columns;
        columns.push(Column::default());
        Ok(ColumnId {
            part: row.part,
            row: row.row,
            column: columns.len() - 1,
        })
    }

    pub fn new_report(&mut self, column: ColumnId, report: Report) -> ReportResult<ReportId> {
        let reports = &mut self
            .parts
            .get_mut(column.part)
            .and_then(|p| p.rows.get_mut(column.row))
            .and_then(|r| r.columns.get_mut(column.column))
            .ok_or(ReportError::InvalidLayout("column"))?
            .reports;
        reports.push(report);
        Ok(ReportId {
            part: column.part,
            row: column.row,
            column: column.column,
            report: reports.len() - 1,
        })
    }

    /// Adds `report` below the last report of `part` (the last part when
    /// `None`), creating the part, row and column it needs.
    pub fn append_report(&mut self, part: Option<PartId>, report: Report) -> ReportResult<ReportId> {
        let part = match part {
            Some(part) => part,
            None if self.parts.is_empty() => self.new_part(),
            None => PartId(self.parts.len() - 1),
        };
        let rows = self
            .parts
            .get(part.0)
            .ok_or(ReportError::InvalidLayout("part"))?
            .rows
            .len();
        let row = match rows {
            0 => self.new_row(part)?,
            n => RowId {
                part: part.0,
                row: n - 1,
            },
        };
        let columns = self.parts[row.part].rows[row.row].columns.len();
        let column = match columns {
            0 => self.new_column(row)?,
            n => ColumnId {
                part: row.part,
                row: row.row,
                column: n - 1,
            },
        };
        self.new_report(column, report)
    }

    pub fn report(&self, id: ReportId) -> Option<&Report> {
        self.parts
            .get(id.part)?
            .rows
            .get(id.row)?
            .columns
            .get(id.column)?
            .reports
            .get(id.report)
    }

    pub fn report_mut(&mut self, id: ReportId) -> Option<&mut Report> {
        self.parts
            .get_mut(id.part)?
            .rows
            .get_mut(id.row)?
            .columns
            .get_mut(id.column)?
            .reports
            .get_mut(id.report)
    }

    /// Every report id in document order: parts, then rows, then columns.
    pub fn report_ids(&self) -> Vec<ReportId> {
        let mut ids = Vec::new();
        for (p, part) in self.parts.iter().enumerate() {
            for (r, row) in part.rows.iter().enumerate() {
                for (c, column) in row.columns.iter().enumerate() {
                    ids.extend((0..column.reports.len()).map(|report| ReportId {
                        part: p,
                        row: r,
                        column: c,
                        report,
                    }));
                }
            }
        }
        ids
    }

    /// Finds a report by name.
    pub fn find_report(&self, name: &str) -> Option<ReportId> {
        self.report_ids()
            .into_iter()
            .find(|id| self.report(*id).and_then(Report::name) == Some(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_building() {
        let mut layout = Layout::new();
        let part = layout.new_part();
        let row = layout.new_row(part).unwrap();
        let left = layout.new_column(row).unwrap();
        let right = layout.new_column(row).unwrap();
        let a = layout.new_report(left, Report::named("a")).unwrap();
        let b = layout.new_report(right, Report::named("b")).unwrap();
        let c = layout.new_report(left, Report::named("c")).unwrap();

        assert_eq!(layout.report_ids(), vec![a, c, b]);
        assert_eq!(c.report, 1);
        assert_eq!(layout.find_report("b"), Some(b));
        assert_eq!(layout.find_report("zzz"), None);
    }

    #[test]
    fn test_append_creates_missing_nodes() {
        let mut layout = Layout::new();
        let first = layout.append_report(None, Report::new()).unwrap();
        let second = layout.append_report(None, Report::new()).unwrap();
        assert_eq!(layout.parts().len(), 1);
        assert_eq!((first.column, first.report), (0, 0));
        assert_eq!((second.column, second.report), (0, 1));

        let other = layout.new_part();
        let third = layout.append_report(Some(other), Report::new()).unwrap();
        assert_eq!(third.part, 1);
    }

    #[test]
    fn test_invalid_ids() {
        let mut layout = Layout::new();
        assert!(matches!(layout.new_row(PartId(3)), Err(ReportError::InvalidLayout("part"))));
        assert!(layout
            .new_column(RowId { part: 0, row: 0 })
            .is_err());
        assert!(layout.append_report(Some(PartId(1)), Report::new()).is_err());
    }
}
