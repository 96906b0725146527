//! FILENAME: report-engine/src/scope.rs
//! PURPOSE: The report layer of name resolution and value lookup.
//! CONTEXT: `ReportScope` stacks on top of the engine's `QueryScope`. It
//! adds `v.name` variables, the `r.baseexpr`, `r.intermedexpr` and
//! `r.intermed2expr` stages of the custom variable being resolved, and
//! `brrownum('break')` counters. The values live in `ReportValues`, apart
//! from the expressions that compute them, so a variable's expressions can
//! be evaluated while other variables' values are read.

use rustc_hash::FxHashMap;
use std::borrow::Cow;

use engine::{QueryScope, ResultSource, ResultValue, Scope, Slot, ValueKind, ValueRing};

/// Row variable names of the custom variable stages, by stage.
pub const STAGE_NAMES: [&str; 3] = ["baseexpr", "intermedexpr", "intermed2expr"];

/// Name to index maps of the breaks and variables that survived resolution.
#[derive(Debug, Default, Clone)]
pub struct ReportIndex {
    pub(crate) breaks: FxHashMap<String, usize>,
    pub(crate) variables: FxHashMap<String, usize>,
    /// Whether each variable is read from its Precalculated slot.
    pub(crate) precalculated: Vec<bool>,
}

impl ReportIndex {
    pub fn break_index(&self, name: &str) -> Option<usize> {
        self.breaks.get(name).copied()
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables.get(name).copied()
    }

    pub(crate) fn clear(&mut self) {
        self.breaks.clear();
        self.variables.clear();
        self.precalculated.clear();
    }
}

/// The result and stage values of one variable.
#[derive(Debug, Clone)]
pub struct VariableSlots {
    pub result: ValueRing,
    pub stages: [ValueRing; 3],
}

impl Default for VariableSlots {
    fn default() -> Self {
        VariableSlots {
            result: ValueRing::null(ValueKind::Number),
            stages: [
                ValueRing::null(ValueKind::Number),
                ValueRing::null(ValueKind::Number),
                ValueRing::null(ValueKind::Number),
            ],
        }
    }
}

/// Everything a report computes per row besides its expressions.
#[derive(Debug, Default, Clone)]
pub struct ReportValues {
    pub variables: Vec<VariableSlots>,
    pub break_rows: Vec<ValueRing>,
}

impl ReportValues {
    pub(crate) fn with_sizes(variables: usize, breaks: usize) -> Self {
        ReportValues {
            variables: vec![VariableSlots::default(); variables],
            break_rows: vec![ValueRing::null(ValueKind::Number); breaks],
        }
    }
}

pub struct ReportScope<'a> {
    queries: QueryScope<'a>,
    index: &'a ReportIndex,
    values: &'a ReportValues,
    /// The custom variable whose stages `r.*` names refer to.
    variable: Option<usize>,
    /// Precalculated variables are read from their Current slot while the
    /// precalculation pass computes them.
    precalculating: bool,
}

impl<'a> ReportScope<'a> {
    pub fn new(queries: QueryScope<'a>, index: &'a ReportIndex, values: &'a ReportValues) -> Self {
        ReportScope {
            queries,
            index,
            values,
            variable: None,
            precalculating: false,
        }
    }

    /// Resolves `r.baseexpr` and friends to the stages of `variable`.
    pub fn for_variable(mut self, variable: usize) -> Self {
        self.variable = Some(variable);
        self
    }

    pub(crate) fn precalculating(mut self, precalculating: bool) -> Self {
        self.precalculating = precalculating;
        self
    }

    pub fn queries(&self) -> &QueryScope<'a> {
        &self.queries
    }

    pub fn index(&self) -> &'a ReportIndex {
        self.index
    }
}

impl Scope for ReportScope<'_> {
    fn resolve_column(&self, query: Option<&str>, name: &str) -> Option<ResultSource> {
        self.queries.resolve_column(query, name)
    }

    fn resolve_variable(&self, name: &str) -> Option<ResultSource> {
        let index = self.index.variable_index(name)?;
        let precalculated = self.index.precalculated.get(index).copied().unwrap_or(false);
        Some(ResultSource::Variable {
            index,
            precalculated,
        })
    }

    fn resolve_row_variable(&self, name: &str) -> Option<ResultSource> {
        let index = self.variable?;
        let stage = STAGE_NAMES.iter().position(|s| s.eq_ignore_ascii_case(name))?;
        Some(ResultSource::VariableStage { index, stage })
    }

    fn resolve_query_row_number(&self, query: Option<&str>) -> Option<ResultSource> {
        self.queries.resolve_query_row_number(query)
    }

    fn resolve_break_row_number(&self, name: &str) -> Option<ResultSource> {
        let index = self.index.break_index(name)?;
        Some(ResultSource::BreakRowNumber { index })
    }

    fn lookup(&self, source: &ResultSource, slot: Slot) -> Option<Cow<'_, ResultValue>> {
        match source {
            ResultSource::Variable {
                index,
                precalculated,
            } => {
                let slot = if *precalculated && !self.precalculating {
                    Slot::Precalculated
                } else {
                    slot
                };
                self.values
                    .variables
                    .get(*index)
                    .map(|v| Cow::Borrowed(v.result.get(slot)))
            }
            ResultSource::VariableStage { index, stage } => self
                .values
                .variables
                .get(*index)
                .and_then(|v| v.stages.get(*stage))
                .map(|ring| Cow::Borrowed(ring.get(slot))),
            ResultSource::BreakRowNumber { index } => self
                .values
                .break_rows
                .get(*index)
                .map(|ring| Cow::Borrowed(ring.get(slot))),
            _ => self.queries.lookup(source, slot),
        }
    }
}
