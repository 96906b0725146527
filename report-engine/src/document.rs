//! FILENAME: report-engine/src/document.rs
//! PURPOSE: The top-level report context: the engine (settings, functions,
//! datasources, queries) plus the layout tree of reports.
//! CONTEXT: Owned by one caller and used from one thread. Builder methods
//! address reports by `ReportId` and queries by name.

use engine::{EngineConfig, EngineContext, QueryId, UserFunction};

use crate::breaks::BreakDef;
use crate::error::{ReportError, ReportResult};
use crate::execute::RunSummary;
use crate::layout::{ColumnId, Layout, PartId, ReportId, RowId};
use crate::report::Report;
use crate::variables::VariableDef;

#[derive(Default)]
pub struct ReportDocument {
    engine: EngineContext,
    layout: Layout,
}

impl ReportDocument {
    pub fn new(config: EngineConfig) -> Self {
        ReportDocument {
            engine: EngineContext::new(config),
            layout: Layout::new(),
        }
    }

    pub fn engine(&self) -> &EngineContext {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut EngineContext {
        &mut self.engine
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn register_function(&mut self, function: UserFunction) {
        self.engine.register_function(function);
    }

    fn query(&self, name: &str) -> ReportResult<QueryId> {
        self.engine
            .query_id(name)
            .ok_or_else(|| ReportError::UnknownQuery(name.to_string()))
    }

    /// Attaches `follower` to `leader` 1:1.
    pub fn add_follower(&mut self, leader: &str, follower: &str) -> ReportResult<()> {
        let (leader, follower) = (self.query(leader)?, self.query(follower)?);
        Ok(self.engine.add_follower(leader, follower)?)
    }

    /// Attaches `follower` to `leader` N:1, selecting rows by `match_text`.
    pub fn add_follower_n_to_1(&mut self, leader: &str, follower: &str, match_text: &str) -> ReportResult<()> {
        let (leader, follower) = (self.query(leader)?, self.query(follower)?);
        Ok(self.engine.add_follower_n_to_1(leader, follower, match_text)?)
    }

    // ========================================
    // LAYOUT
    // ========================================

    pub fn new_part(&mut self) -> PartId {
        self.layout.new_part()
    }

    pub fn new_row(&mut self, part: PartId) -> ReportResult<RowId> {
        self.layout.new_row(part)
    }

    pub fn new_column(&mut self, row: RowId) -> ReportResult<ColumnId> {
        self.layout.new_column(row)
    }

    pub fn new_report(&mut self, column: ColumnId, report: Report) -> ReportResult<ReportId> {
        self.layout.new_report(column, report)
    }

    pub fn append_report(&mut self, part: Option<PartId>, report: Report) -> ReportResult<ReportId> {
        self.layout.append_report(part, report)
    }

    pub fn report(&self, id: ReportId) -> Option<&Report> {
        self.layout.report(id)
    }

    /// Mutable access for registering callbacks.
    pub fn report_mut(&mut self, id: ReportId) -> ReportResult<&mut Report> {
        self.layout.report_mut(id).ok_or(ReportError::InvalidLayout("report"))
    }

    // ========================================
    // REPORT BUILDING
    // ========================================

    pub fn set_main_query(&mut self, id: ReportId, query: &str) -> ReportResult<()> {
        self.query(query)?;
        self.report_mut(id)?.set_query(query);
        Ok(())
    }

    pub fn new_break(&mut self, id: ReportId, def: &BreakDef) -> ReportResult<()> {
        let report = self.layout.report_mut(id).ok_or(ReportError::InvalidLayout("report"))?;
        report.new_break(def, &self.engine.compiler())
    }

    pub fn add_breakfield(&mut self, id: ReportId, break_name: &str, text: &str) -> ReportResult<()> {
        let report = self.layout.report_mut(id).ok_or(ReportError::InvalidLayout("report"))?;
        report.add_breakfield(break_name, text, &self.engine.compiler())
    }

    pub fn new_variable(&mut self, id: ReportId, def: &VariableDef) -> ReportResult<()> {
        let report = self.layout.report_mut(id).ok_or(ReportError::InvalidLayout("report"))?;
        report.new_variable(def, &self.engine.compiler())
    }

    pub fn add_expression(&mut self, id: ReportId, name: Option<&str>, text: &str) -> ReportResult<usize> {
        let report = self.layout.report_mut(id).ok_or(ReportError::InvalidLayout("report"))?;
        report.add_expression(name, text, &self.engine.compiler())
    }

    // ========================================
    // EXECUTION
    // ========================================

    pub fn execute_report(&mut self, id: ReportId) -> ReportResult<RunSummary> {
        let report = self.layout.report_mut(id).ok_or(ReportError::InvalidLayout("report"))?;
        report.run(&mut self.engine)
    }

    /// Runs every report in document order.
    pub fn execute(&mut self) -> ReportResult<Vec<(ReportId, RunSummary)>> {
        let ids = self.layout.report_ids();
        log::debug!("executing {} reports", ids.len());
        ids.into_iter()
            .map(|id| self.execute_report(id).map(|summary| (id, summary)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::ArrayTable;

    #[test]
    fn test_unknown_names() {
        let mut doc = ReportDocument::default();
        let id = doc.append_report(None, Report::new()).unwrap();
        assert!(matches!(
            doc.set_main_query(id, "missing"),
            Err(ReportError::UnknownQuery(_))
        ));
        assert!(matches!(doc.add_follower("a", "b"), Err(ReportError::UnknownQuery(_))));
        assert!(matches!(doc.execute_report(id), Err(ReportError::NoMainQuery)));

        let stale = ReportId {
            part: 0,
            row: 0,
            column: 0,
            report: 9,
        };
        assert!(matches!(
            doc.new_break(stale, &BreakDef::new("b", &["x"])),
            Err(ReportError::InvalidLayout("report"))
        ));
    }

    #[test]
    fn test_followers_by_name() {
        let mut doc = ReportDocument::default();
        doc.engine_mut().add_datasource("mem", "array").unwrap();
        for name in ["a", "b"] {
            let table = ArrayTable::from_rows(&[&["x"], &["1"]]);
            doc.engine_mut().add_query_array(name, "mem", table).unwrap();
        }
        doc.add_follower("a", "b").unwrap();
        assert!(matches!(doc.add_follower("b", "a"), Err(ReportError::Engine(_))));
    }
}
