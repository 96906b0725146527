//! FILENAME: report-engine/src/execute.rs
//! PURPOSE: Runs a report over its main query.
//! CONTEXT: A run has up to three phases.
//!
//! LIFECYCLE:
//! resolve --> precalculate (only with precalculated variables) --> render
//!
//! - a break defined without fields fails the run with `UselessBreak`
//!   before anything is resolved.
//! - resolve binds every expression once. Break fields and variables whose
//!   references cannot be bound are dropped with a warning, as is a break
//!   whose fields were all dropped or a variable resetting on an unknown
//!   break.
//!   Report expressions are kept and evaluate to "invalid identifier".
//! - precalculate walks the whole data, evaluating breaks and variables,
//!   and keeps the final value of every precalculated variable for each of
//!   its reset groups.
//! - render walks the data again. Per row: break fields are compared with
//!   the previous row, triggered breaks call back and reset their
//!   variables, then variables and expressions are evaluated.

use std::mem;

use engine::{optimize, resolve, EngineContext, NumericValue, QueryId, ResultValue, Slot, ValueKind};

use crate::breaks::check_break_fields;
use crate::error::{ReportError, ReportResult};
use crate::report::{Callbacks, Report};
use crate::scope::{ReportScope, ReportValues, VariableSlots};
use crate::variables::{Variable, VariableKind};

/// What a run produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Rows rendered.
    pub rows: u64,
    /// Break triggers, counting each nested break separately.
    pub triggers: u64,
}

impl Report {
    /// Runs the report: resolve, precalculate when needed, then render.
    pub fn run(&mut self, engine: &mut EngineContext) -> ReportResult<RunSummary> {
        check_break_fields(&self.breaks)?;
        let main = self.main_query(engine)?;
        self.main = Some(main);
        self.resolve_all(engine, main);

        let mut callbacks = mem::take(&mut self.callbacks);
        let summary = self.run_passes(engine, main, &mut callbacks);
        self.callbacks = callbacks;
        summary
    }

    fn main_query(&self, engine: &EngineContext) -> ReportResult<QueryId> {
        match self.query() {
            Some(name) => engine
                .query_id(name)
                .ok_or_else(|| ReportError::UnknownQuery(name.to_string())),
            None => engine.queries().ids().next().ok_or(ReportError::NoMainQuery),
        }
    }

    fn run_passes(&mut self, engine: &mut EngineContext, main: QueryId, callbacks: &mut Callbacks) -> ReportResult<RunSummary> {
        let precalculating = self.variables.iter().any(Variable::is_precalculated);
        if precalculating {
            self.precalculate(engine, main)?;
            self.reset_state();
            self.load_precalculated_groups();
            Callbacks::fire(&mut callbacks.precalculated, &self.view(engine));
        }

        Callbacks::fire(&mut callbacks.start, &self.view(engine));
        let summary = self.render(engine, main, callbacks)?;
        Callbacks::fire(&mut callbacks.done, &self.view(engine));
        log::debug!(
            "report {:?} rendered {} rows with {} break triggers",
            self.name(),
            summary.rows,
            summary.triggers
        );
        Ok(summary)
    }

    // ========================================
    // RESOLVE
    // ========================================

    fn resolve_all(&mut self, engine: &EngineContext, main: QueryId) {
        self.index.clear();
        let settings = engine.settings();
        let empty = ReportValues::default();

        let mut breaks = Vec::with_capacity(self.breaks.len());
        for mut brk in mem::take(&mut self.breaks) {
            {
                let scope = ReportScope::new(engine.query_scope(Some(main)), &self.index, &empty);
                brk.fields.retain_mut(|field| {
                    let unresolved = resolve(field, &scope);
                    for message in &unresolved {
                        log::warn!("break '{}': dropping field '{}': {}", brk.name, field.text(), message);
                    }
                    unresolved.is_empty()
                });
            }
            if let Err(err) = brk.check() {
                log::warn!("{}; dropped", err);
                continue;
            }
            for field in brk.fields.iter_mut() {
                optimize(field, &settings.numeric, settings.date_order);
            }
            self.index.breaks.insert(brk.name.clone(), breaks.len());
            breaks.push(brk);
        }
        self.breaks = breaks;

        let mut variables: Vec<Variable> = Vec::with_capacity(self.variables.len());
        for mut variable in mem::take(&mut self.variables) {
            let position = variables.len();
            let reset_break = match variable.reset_on_break.as_deref() {
                Some(name) => match self.index.break_index(name) {
                    Some(index) => Some(index),
                    None => {
                        log::warn!("variable '{}': unknown reset break '{}'; dropped", variable.name, name);
                        continue;
                    }
                },
                None => None,
            };
            let unresolved: Vec<String> = {
                let scope =
                    ReportScope::new(engine.query_scope(Some(main)), &self.index, &empty).for_variable(position);
                variable
                    .expressions_mut()
                    .flat_map(|expr| resolve(expr, &scope))
                    .collect()
            };
            if !unresolved.is_empty() {
                log::warn!("variable '{}': {}; dropped", variable.name, unresolved.join(", "));
                continue;
            }
            for expr in variable.expressions_mut() {
                optimize(expr, &settings.numeric, settings.date_order);
            }
            variable.reset_break = reset_break;
            self.index.variables.insert(variable.name.clone(), position);
            self.index.precalculated.push(variable.precalculate);
            variables.push(variable);
        }
        self.variables = variables;

        {
            let scope = ReportScope::new(engine.query_scope(Some(main)), &self.index, &empty);
            for expression in self.expressions.iter_mut() {
                for message in resolve(&mut expression.expr, &scope) {
                    log::warn!("expression '{}': {}", expression.expr.text(), message);
                }
            }
        }
        for expression in self.expressions.iter_mut() {
            optimize(&mut expression.expr, &settings.numeric, settings.date_order);
        }

        self.reset_state();
    }

    /// Clears everything a pass computed.
    fn reset_state(&mut self) {
        for brk in self.breaks.iter_mut() {
            for field in brk.fields.iter_mut() {
                field.reset_iteration();
            }
        }
        for variable in self.variables.iter_mut() {
            variable.restart();
            variable.group = 0;
        }
        for expression in self.expressions.iter_mut() {
            expression.expr.reset_iteration();
        }
        self.values = ReportValues::with_sizes(self.variables.len(), self.breaks.len());
        self.row = 0;
    }

    // ========================================
    // PASSES
    // ========================================

    fn precalculate(&mut self, engine: &mut EngineContext, main: QueryId) -> ReportResult<()> {
        for variable in self.variables.iter_mut() {
            variable.precalculated_groups.clear();
        }
        engine.navigate_start(main)?;
        while engine.navigate_next(main)? {
            self.row += 1;
            let first = self.row == 1;
            if let Some(from) = self.evaluate_breaks(engine, main, first, true) {
                self.reset_variables(from, true);
            }
            self.evaluate_variables(engine, main, true);
        }
        let Report { variables, values, .. } = self;
        for (variable, slots) in variables.iter_mut().zip(values.variables.iter()) {
            if variable.precalculate {
                variable
                    .precalculated_groups
                    .push(slots.result.get(Slot::Current).clone());
            }
        }
        log::debug!("precalculation pass over {} rows", self.row);
        Ok(())
    }

    fn render(&mut self, engine: &mut EngineContext, main: QueryId, callbacks: &mut Callbacks) -> ReportResult<RunSummary> {
        let mut summary = RunSummary::default();
        engine.navigate_start(main)?;
        while engine.navigate_next(main)? {
            self.row += 1;
            let first = self.row == 1;
            if let Some(from) = self.evaluate_breaks(engine, main, first, false) {
                summary.triggers += (self.breaks.len() - from) as u64;
                if !callbacks.breaks.is_empty() {
                    let view = self.view(engine);
                    for brk in &self.breaks[from..] {
                        for callback in callbacks.breaks.iter_mut() {
                            callback(&view, &brk.name);
                        }
                    }
                }
                self.reset_variables(from, false);
            }
            self.evaluate_variables(engine, main, false);
            self.evaluate_expressions(engine, main);
            summary.rows += 1;
            Callbacks::fire(&mut callbacks.row, &self.view(engine));
        }
        Ok(summary)
    }

    // ========================================
    // ROW STEPS
    // ========================================

    /// Evaluates every break field and advances the break row counters.
    /// Returns the first break that triggered; the ones after it trigger
    /// with it.
    fn evaluate_breaks(&mut self, engine: &EngineContext, main: QueryId, first: bool, precalculating: bool) -> Option<usize> {
        let settings = engine.settings();
        let Report {
            breaks,
            index,
            values,
            ..
        } = self;

        let mut fired = None;
        {
            let scope = ReportScope::new(engine.query_scope(Some(main)), index, values).precalculating(precalculating);
            let env = settings.env(&scope);
            for (i, brk) in breaks.iter_mut().enumerate() {
                let mut changed = false;
                for field in brk.fields.iter_mut() {
                    field.evaluate(&env);
                    if !first && !field.result(Slot::Current, &scope).same_as(&field.result(Slot::Previous, &scope)) {
                        changed = true;
                    }
                }
                if changed && fired.is_none() {
                    fired = Some(i);
                }
            }
        }

        for (i, ring) in values.break_rows.iter_mut().enumerate() {
            let continues = !first && fired.map_or(true, |from| i < from);
            let next = match ring.get(Slot::Current).as_number() {
                Some(n) if continues => ResultValue::number(n.add(&NumericValue::one(), &settings.numeric)),
                _ => ResultValue::from_i64(1),
            };
            ring.push(Slot::Current, next);
        }
        fired
    }

    /// Restarts the variables that reset on break `from` or a later one.
    fn reset_variables(&mut self, from: usize, precalculating: bool) {
        let Report { variables, values, .. } = self;
        for (variable, slots) in variables.iter_mut().zip(values.variables.iter_mut()) {
            if !variable.reset_break.map_or(false, |b| b >= from) {
                continue;
            }
            if variable.precalculate {
                if precalculating {
                    let finished = slots.result.get(Slot::Current).clone();
                    variable.precalculated_groups.push(finished);
                } else {
                    variable.group += 1;
                    load_group(variable, slots);
                }
            }
            variable.restart();
        }
    }

    fn evaluate_variables(&mut self, engine: &EngineContext, main: QueryId, precalculating: bool) {
        let settings = engine.settings();
        let Report {
            variables,
            index,
            values,
            ..
        } = self;

        for (i, variable) in variables.iter_mut().enumerate() {
            for stage in 0..variable.stages.len() {
                let expr = match variable.stages[stage].as_mut() {
                    Some(expr) => expr,
                    None => continue,
                };
                let value = {
                    let scope = ReportScope::new(engine.query_scope(Some(main)), index, values)
                        .for_variable(i)
                        .precalculating(precalculating);
                    expr.evaluate(&settings.env(&scope))
                };
                values.variables[i].stages[stage].push(Slot::Current, value);
            }

            let result = match variable.kind {
                VariableKind::Custom => match variable.result.as_mut() {
                    Some(expr) => {
                        let scope = ReportScope::new(engine.query_scope(Some(main)), index, values)
                            .for_variable(i)
                            .precalculating(precalculating);
                        expr.evaluate(&settings.env(&scope))
                    }
                    None => ResultValue::null(ValueKind::Number),
                },
                kind => {
                    // Without a base every row counts
                    let base = match variable.stages[0] {
                        Some(_) => values.variables[i].stages[0].get(Slot::Current).clone(),
                        None => ResultValue::from_i64(1),
                    };
                    variable.accumulator.add(kind, &base, &settings.numeric)
                }
            };
            values.variables[i].result.push(Slot::Current, result);
        }
    }

    fn evaluate_expressions(&mut self, engine: &EngineContext, main: QueryId) {
        let Report {
            expressions,
            index,
            values,
            ..
        } = self;
        let scope = ReportScope::new(engine.query_scope(Some(main)), index, values);
        let env = engine.settings().env(&scope);
        for expression in expressions.iter_mut() {
            expression.expr.evaluate(&env);
        }
    }

    /// Points every precalculated variable at its first group.
    fn load_precalculated_groups(&mut self) {
        let Report { variables, values, .. } = self;
        for (variable, slots) in variables.iter_mut().zip(values.variables.iter_mut()) {
            if variable.precalculate {
                variable.group = 0;
                load_group(variable, slots);
            }
        }
    }
}

fn load_group(variable: &Variable, slots: &mut VariableSlots) {
    let value = variable
        .precalculated_groups
        .get(variable.group)
        .cloned()
        .unwrap_or_else(|| ResultValue::null(ValueKind::Number));
    *slots.result.get_mut(Slot::Precalculated) = value;
}
