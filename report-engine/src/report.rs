//! FILENAME: report-engine/src/report.rs
//! PURPOSE: A report: a main query with breaks, variables, computed
//! expressions and the callbacks that observe a run.
//! CONTEXT: Reports are built through the methods here (or from a
//! definition) and run by `execute`. Callbacks get a `ReportView`, a
//! read-only window on the row being produced.

use std::fmt;

use engine::{CompiledExpr, Compiler, EngineContext, QueryId, ResultSource, ResultValue, Scope, Slot};

use crate::breaks::{Break, BreakAttributes, BreakDef};
use crate::error::{ReportError, ReportResult};
use crate::scope::{ReportIndex, ReportScope, ReportValues};
use crate::variables::{Variable, VariableDef};

// ========================================
// CALLBACKS
// ========================================

pub type ReportCallback = Box<dyn FnMut(&ReportView<'_>)>;
/// Receives the view and the name of the break that triggered.
pub type BreakCallback = Box<dyn FnMut(&ReportView<'_>, &str)>;

/// Observers of a run. Each list is called in registration order.
#[derive(Default)]
pub(crate) struct Callbacks {
    pub(crate) start: Vec<ReportCallback>,
    pub(crate) done: Vec<ReportCallback>,
    pub(crate) row: Vec<ReportCallback>,
    pub(crate) breaks: Vec<BreakCallback>,
    pub(crate) precalculated: Vec<ReportCallback>,
}

impl Callbacks {
    pub(crate) fn fire(list: &mut [ReportCallback], view: &ReportView<'_>) {
        for callback in list.iter_mut() {
            callback(view);
        }
    }
}

// ========================================
// REPORT
// ========================================

/// A computed expression of the report, evaluated once per row after
/// the variables.
#[derive(Debug)]
pub struct ReportExpression {
    pub name: Option<String>,
    pub(crate) expr: CompiledExpr,
}

impl ReportExpression {
    pub fn text(&self) -> &str {
        self.expr.text()
    }

    /// Whether the expression reads a precalculated variable.
    pub fn is_delayed(&self) -> bool {
        self.expr.is_delayed()
    }
}

#[derive(Default)]
pub struct Report {
    name: Option<String>,
    query: Option<String>,
    pub(crate) breaks: Vec<Break>,
    pub(crate) variables: Vec<Variable>,
    pub(crate) expressions: Vec<ReportExpression>,
    pub(crate) callbacks: Callbacks,

    // State of the last run
    pub(crate) main: Option<QueryId>,
    pub(crate) index: ReportIndex,
    pub(crate) values: ReportValues,
    pub(crate) row: u64,
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report")
            .field("name", &self.name)
            .field("query", &self.query)
            .field("breaks", &self.breaks.len())
            .field("variables", &self.variables.len())
            .field("expressions", &self.expressions.len())
            .finish()
    }
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: &str) -> Self {
        Report {
            name: Some(name.to_string()),
            ..Report::default()
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The main query. Without one the document's first query is used.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = Some(query.to_string());
    }

    pub fn breaks(&self) -> &[Break] {
        &self.breaks
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn expressions(&self) -> &[ReportExpression] {
        &self.expressions
    }

    // ========================================
    // BUILDING
    // ========================================

    /// Adds a break after the existing ones, so it nests inside them.
    pub fn new_break(&mut self, def: &BreakDef, compiler: &Compiler<'_>) -> ReportResult<()> {
        if self.breaks.iter().any(|b| b.name == def.name) {
            return Err(ReportError::DuplicateBreak(def.name.clone()));
        }
        let brk = Break::from_def(def, compiler)?;
        log::debug!("break '{}' added with {} fields", brk.name, brk.fields.len());
        self.breaks.push(brk);
        Ok(())
    }

    pub fn add_breakfield(&mut self, break_name: &str, text: &str, compiler: &Compiler<'_>) -> ReportResult<()> {
        let brk = self
            .breaks
            .iter_mut()
            .find(|b| b.name == break_name)
            .ok_or_else(|| ReportError::UnknownBreak(break_name.to_string()))?;
        brk.add_field(compiler.compile_str(text)?);
        Ok(())
    }

    pub fn new_variable(&mut self, def: &VariableDef, compiler: &Compiler<'_>) -> ReportResult<()> {
        let variable = Variable::compile(def, compiler, &self.variables)?;
        self.variables.push(variable);
        Ok(())
    }

    /// Adds a computed expression and returns its position.
    pub fn add_expression(&mut self, name: Option<&str>, text: &str, compiler: &Compiler<'_>) -> ReportResult<usize> {
        self.expressions.push(ReportExpression {
            name: name.map(str::to_string),
            expr: compiler.compile_str(text)?,
        });
        Ok(self.expressions.len() - 1)
    }

    pub fn on_start(&mut self, callback: impl FnMut(&ReportView<'_>) + 'static) {
        self.callbacks.start.push(Box::new(callback));
    }

    pub fn on_done(&mut self, callback: impl FnMut(&ReportView<'_>) + 'static) {
        self.callbacks.done.push(Box::new(callback));
    }

    pub fn on_row(&mut self, callback: impl FnMut(&ReportView<'_>) + 'static) {
        self.callbacks.row.push(Box::new(callback));
    }

    /// Called once for every break that triggers, outermost first.
    pub fn on_break(&mut self, callback: impl FnMut(&ReportView<'_>, &str) + 'static) {
        self.callbacks.breaks.push(Box::new(callback));
    }

    pub fn on_precalculated(&mut self, callback: impl FnMut(&ReportView<'_>) + 'static) {
        self.callbacks.precalculated.push(Box::new(callback));
    }

    pub(crate) fn view<'a>(&'a self, engine: &'a EngineContext) -> ReportView<'a> {
        ReportView {
            report: self,
            scope: ReportScope::new(engine.query_scope(self.main), &self.index, &self.values),
        }
    }
}

// ========================================
// VIEW
// ========================================

/// Read-only access to the state of a running report.
pub struct ReportView<'a> {
    report: &'a Report,
    scope: ReportScope<'a>,
}

impl<'a> ReportView<'a> {
    pub fn report(&self) -> &'a Report {
        self.report
    }

    /// 1-based number of the row being produced; 0 before the first one.
    pub fn row(&self) -> u64 {
        self.report.row
    }

    pub fn scope(&self) -> &ReportScope<'a> {
        &self.scope
    }

    /// The value of a named report expression on this row.
    pub fn expression(&self, name: &str) -> Option<ResultValue> {
        let position = self
            .report
            .expressions
            .iter()
            .position(|e| e.name.as_deref() == Some(name))?;
        self.expression_at(position)
    }

    pub fn expression_at(&self, position: usize) -> Option<ResultValue> {
        let expr = &self.report.expressions.get(position)?.expr;
        Some(expr.result(Slot::Current, &self.scope).into_owned())
    }

    /// A variable's value; the final value for precalculated variables.
    pub fn variable(&self, name: &str) -> Option<ResultValue> {
        let source = self.scope.resolve_variable(name)?;
        self.lookup(&source)
    }

    /// A query column of the current row.
    pub fn column(&self, query: Option<&str>, name: &str) -> Option<ResultValue> {
        let source = self.scope.resolve_column(query, name)?;
        self.lookup(&source)
    }

    pub fn break_row_number(&self, name: &str) -> Option<ResultValue> {
        let source = self.scope.resolve_break_row_number(name)?;
        self.lookup(&source)
    }

    pub fn break_attributes(&self, name: &str) -> Option<BreakAttributes> {
        self.report
            .breaks
            .iter()
            .find(|b| b.name == name)
            .map(Break::attributes)
    }

    fn lookup(&self, source: &ResultSource) -> Option<ResultValue> {
        self.scope.lookup(source, Slot::Current).map(|v| v.into_owned())
    }
}
