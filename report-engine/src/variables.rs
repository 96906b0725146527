//! FILENAME: report-engine/src/variables.rs
//! PURPOSE: Report variables: running aggregates, plain expressions and
//! custom multi-stage computations.
//! CONTEXT: A variable is evaluated once per row, after the breaks. Its
//! definition is checked when it is created; its expressions are bound to
//! query columns when the report runs.
//!
//! Reference rules for `v.` names inside a variable's expressions:
//! - Expression variables may not reference any variable.
//! - Aggregates may only reference Expression variables.
//! - Custom variables may reference any variable defined before them.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use engine::{CompiledExpr, Compiler, NodeKind, NumericContext, NumericValue, ResultValue, ValueKind};

use crate::error::{ReportError, ReportResult};

// ========================================
// DEFINITION
// ========================================

/// How a variable combines its base value with its previous result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    /// Number of non-null base values, or of rows without a base.
    Count,
    /// Number of rows.
    CountAll,
    Sum,
    /// Sum divided by the number of non-null values.
    Average,
    /// Sum divided by the number of rows.
    AverageAll,
    Lowest,
    Highest,
    /// The base value itself.
    Expression,
    /// base, intermediate, intermediate2 and result expressions chained.
    Custom,
}

impl VariableKind {
    pub fn is_aggregate(&self) -> bool {
        !matches!(self, VariableKind::Expression | VariableKind::Custom)
    }

    fn needs_base(&self) -> bool {
        !matches!(
            self,
            VariableKind::Count | VariableKind::CountAll | VariableKind::Custom
        )
    }
}

/// A variable as a report definition describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDef {
    pub name: String,
    pub kind: VariableKind,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub intermediate: Option<String>,
    #[serde(default)]
    pub intermediate2: Option<String>,
    /// The result expression of a custom variable.
    #[serde(default)]
    pub result: Option<String>,
    /// The break whose trigger restarts the variable.
    #[serde(default)]
    pub reset_on_break: Option<String>,
    /// Computed over the whole data in advance; reads give the final value.
    #[serde(default)]
    pub precalculate: bool,
}

impl VariableDef {
    pub fn new(name: &str, kind: VariableKind, base: Option<&str>) -> Self {
        VariableDef {
            name: name.to_string(),
            kind,
            base: base.map(str::to_string),
            intermediate: None,
            intermediate2: None,
            result: None,
            reset_on_break: None,
            precalculate: false,
        }
    }

    pub fn custom(name: &str, base: Option<&str>, intermediate: Option<&str>, intermediate2: Option<&str>, result: &str) -> Self {
        VariableDef {
            intermediate: intermediate.map(str::to_string),
            intermediate2: intermediate2.map(str::to_string),
            result: Some(result.to_string()),
            ..VariableDef::new(name, VariableKind::Custom, base)
        }
    }

    pub fn reset_on(mut self, break_name: &str) -> Self {
        self.reset_on_break = Some(break_name.to_string());
        self
    }

    pub fn precalculated(mut self) -> Self {
        self.precalculate = true;
        self
    }
}

// ========================================
// ACCUMULATOR
// ========================================

/// Running state of an aggregate variable.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    rows: u64,
    count: u64,
    sum: Option<NumericValue>,
    lowest: Option<ResultValue>,
    highest: Option<ResultValue>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Accumulator::default();
    }

    /// Adds one row's base value and returns the variable's new result.
    pub fn add(&mut self, kind: VariableKind, base: &ResultValue, ctx: &NumericContext) -> ResultValue {
        self.rows += 1;
        if base.is_error() {
            return base.clone();
        }
        if kind == VariableKind::Expression {
            return base.clone();
        }

        if !base.is_null() {
            if let Err(error) = self.accumulate(kind, base, ctx) {
                return error;
            }
        }
        self.result(kind, ctx)
    }

    fn accumulate(&mut self, kind: VariableKind, base: &ResultValue, ctx: &NumericContext) -> Result<(), ResultValue> {
        self.count += 1;
        match kind {
            VariableKind::Sum | VariableKind::Average | VariableKind::AverageAll => {
                let n = base.as_number().ok_or_else(ResultValue::invalid_operands)?;
                self.sum = Some(match &self.sum {
                    Some(sum) => sum.add(n, ctx),
                    None => n.clone(),
                });
            }
            VariableKind::Lowest => {
                if replaces(base, self.lowest.as_ref(), Ordering::Less)? {
                    self.lowest = Some(base.clone());
                }
            }
            VariableKind::Highest => {
                if replaces(base, self.highest.as_ref(), Ordering::Greater)? {
                    self.highest = Some(base.clone());
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// The result for the values seen so far.
    pub fn result(&self, kind: VariableKind, ctx: &NumericContext) -> ResultValue {
        let count = |n: u64| ResultValue::from_i64(i64::try_from(n).unwrap_or(i64::MAX));
        let mean = |divisor: u64| match &self.sum {
            Some(sum) if divisor > 0 => sum
                .div(&NumericValue::from_i64(i64::try_from(divisor).unwrap_or(i64::MAX)), ctx)
                .map(ResultValue::number)
                .unwrap_or_else(|| ResultValue::null(ValueKind::Number)),
            _ => ResultValue::null(ValueKind::Number),
        };
        match kind {
            VariableKind::Count => count(self.count),
            VariableKind::CountAll => count(self.rows),
            VariableKind::Sum => ResultValue::number(self.sum.clone().unwrap_or_else(NumericValue::zero)),
            VariableKind::Average => mean(self.count),
            VariableKind::AverageAll => mean(self.rows),
            VariableKind::Lowest => self
                .lowest
                .clone()
                .unwrap_or_else(|| ResultValue::null(ValueKind::Number)),
            VariableKind::Highest => self
                .highest
                .clone()
                .unwrap_or_else(|| ResultValue::null(ValueKind::Number)),
            VariableKind::Expression | VariableKind::Custom => ResultValue::null(ValueKind::Number),
        }
    }
}

/// Whether `candidate` beats `current` in direction `wanted`. Values of
/// different kinds cannot be ranked.
fn replaces(candidate: &ResultValue, current: Option<&ResultValue>, wanted: Ordering) -> Result<bool, ResultValue> {
    let current = match current {
        Some(current) => current,
        None => return Ok(true),
    };
    let ordering = match (candidate.as_number(), current.as_number()) {
        (Some(a), Some(b)) => a.compare(b),
        _ => match (candidate.as_str(), current.as_str()) {
            (Some(a), Some(b)) => a.cmp(b),
            _ => match (candidate.as_datetime(), current.as_datetime()) {
                (Some(a), Some(b)) => a.compare(b),
                _ => return Err(ResultValue::invalid_operands()),
            },
        },
    };
    Ok(ordering == wanted)
}

// ========================================
// VARIABLE
// ========================================

/// A compiled report variable.
#[derive(Debug)]
pub struct Variable {
    pub(crate) name: String,
    pub(crate) kind: VariableKind,
    /// base, intermediate and intermediate2, in stage order.
    pub(crate) stages: [Option<CompiledExpr>; 3],
    pub(crate) result: Option<CompiledExpr>,
    pub(crate) reset_on_break: Option<String>,
    pub(crate) precalculate: bool,
    /// Index of the reset break once the report is resolved.
    pub(crate) reset_break: Option<usize>,
    pub(crate) accumulator: Accumulator,
    /// Final values of each reset group, filled by the precalculation pass.
    pub(crate) precalculated_groups: Vec<ResultValue>,
    pub(crate) group: usize,
}

impl Variable {
    /// Compiles `def` and checks its references against the variables
    /// defined before it.
    pub(crate) fn compile(def: &VariableDef, compiler: &Compiler<'_>, earlier: &[Variable]) -> ReportResult<Variable> {
        if earlier.iter().any(|v| v.name == def.name) {
            return Err(ReportError::DuplicateVariable(def.name.clone()));
        }
        if def.kind.needs_base() && def.base.is_none() {
            return Err(ReportError::invalid_variable(&def.name, "a base expression is required"));
        }
        if def.kind == VariableKind::Custom && def.result.is_none() {
            return Err(ReportError::invalid_variable(&def.name, "a result expression is required"));
        }
        if def.kind != VariableKind::Custom
            && (def.intermediate.is_some() || def.intermediate2.is_some() || def.result.is_some())
        {
            return Err(ReportError::invalid_variable(
                &def.name,
                "only custom variables have intermediate and result expressions",
            ));
        }

        let compile = |text: &Option<String>| -> ReportResult<Option<CompiledExpr>> {
            match text {
                Some(text) => Ok(Some(compiler.compile_str(text)?)),
                None => Ok(None),
            }
        };
        let stages = [
            compile(&def.base)?,
            compile(&def.intermediate)?,
            compile(&def.intermediate2)?,
        ];
        let result = compile(&def.result)?;

        let referenced: Vec<String> = stages
            .iter()
            .chain(std::iter::once(&result))
            .flatten()
            .flat_map(referenced_variables)
            .collect();
        check_references(def, &referenced, earlier)?;

        Ok(Variable {
            name: def.name.clone(),
            kind: def.kind,
            stages,
            result,
            reset_on_break: def.reset_on_break.clone(),
            precalculate: def.precalculate,
            reset_break: None,
            accumulator: Accumulator::new(),
            precalculated_groups: Vec::new(),
            group: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    pub fn is_precalculated(&self) -> bool {
        self.precalculate
    }

    pub fn reset_on_break(&self) -> Option<&str> {
        self.reset_on_break.as_deref()
    }

    pub(crate) fn expressions_mut(&mut self) -> impl Iterator<Item = &mut CompiledExpr> {
        self.stages.iter_mut().chain(std::iter::once(&mut self.result)).flatten()
    }

    /// Restarts accumulation, as on a reset break.
    pub(crate) fn restart(&mut self) {
        self.accumulator.reset();
        for expr in self.expressions_mut() {
            expr.reset_iteration();
        }
    }
}

/// Names of the `v.` variables an expression reads.
fn referenced_variables(expr: &CompiledExpr) -> Vec<String> {
    let mut names = Vec::new();
    expr.root().walk(&mut |node| {
        if let NodeKind::ReportVariable { name } = &node.kind {
            names.push(name.clone());
        }
    });
    names
}

fn check_references(def: &VariableDef, referenced: &[String], earlier: &[Variable]) -> ReportResult<()> {
    for name in referenced {
        let target = earlier.iter().find(|v| &v.name == name);
        let allowed = match (def.kind, target) {
            (VariableKind::Expression, _) | (_, None) => false,
            (VariableKind::Custom, Some(_)) => true,
            (kind, Some(target)) => kind.is_aggregate() && target.kind == VariableKind::Expression,
        };
        if !allowed {
            let reason = match (def.kind, target) {
                (VariableKind::Expression, _) => "expression variables cannot reference variables".to_string(),
                (_, None) => format!("references unknown variable '{}'", name),
                _ => format!("aggregates may only reference expression variables, not '{}'", name),
            };
            return Err(ReportError::invalid_variable(&def.name, reason));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{DateOrder, FunctionRegistry};

    fn numbers(kind: VariableKind, values: &[Option<i64>]) -> Vec<String> {
        let ctx = NumericContext::default();
        let mut acc = Accumulator::new();
        values
            .iter()
            .map(|v| {
                let base = match v {
                    Some(n) => ResultValue::from_i64(*n),
                    None => ResultValue::null(ValueKind::Number),
                };
                acc.add(kind, &base, &ctx).to_string()
            })
            .collect()
    }

    #[test]
    fn test_accumulators() {
        let values = [Some(4), None, Some(2), Some(6)];
        assert_eq!(numbers(VariableKind::Count, &values), vec!["1", "1", "2", "3"]);
        assert_eq!(numbers(VariableKind::CountAll, &values), vec!["1", "2", "3", "4"]);
        assert_eq!(numbers(VariableKind::Sum, &values), vec!["4", "4", "6", "12"]);
        assert_eq!(numbers(VariableKind::Average, &values), vec!["4", "4", "3", "4"]);
        assert_eq!(numbers(VariableKind::AverageAll, &values), vec!["4", "2", "2", "3"]);
        assert_eq!(numbers(VariableKind::Lowest, &values), vec!["4", "4", "2", "2"]);
        assert_eq!(numbers(VariableKind::Highest, &values), vec!["4", "4", "4", "6"]);
        assert_eq!(numbers(VariableKind::Expression, &values), vec!["4", "", "2", "6"]);
    }

    #[test]
    fn test_accumulator_errors_and_reset() {
        let ctx = NumericContext::default();
        let mut acc = Accumulator::new();
        acc.add(VariableKind::Sum, &ResultValue::from_i64(5), &ctx);
        let bad = acc.add(VariableKind::Sum, &ResultValue::string("x"), &ctx);
        assert_eq!(bad, ResultValue::invalid_operands());
        let failed = acc.add(VariableKind::Sum, &ResultValue::error("boom"), &ctx);
        assert_eq!(failed.error_message(), Some("boom"));

        acc.reset();
        assert_eq!(acc.result(VariableKind::Sum, &ctx), ResultValue::from_i64(0));
        assert!(acc.result(VariableKind::Average, &ctx).is_null());
    }

    #[test]
    fn test_lowest_of_strings() {
        let ctx = NumericContext::default();
        let mut acc = Accumulator::new();
        for name in ["Mary", "Fred", "Tot"] {
            acc.add(VariableKind::Lowest, &ResultValue::string(name), &ctx);
        }
        assert_eq!(acc.result(VariableKind::Lowest, &ctx), ResultValue::string("Fred"));
        let mixed = acc.add(VariableKind::Lowest, &ResultValue::from_i64(1), &ctx);
        assert_eq!(mixed, ResultValue::invalid_operands());
    }

    fn compile(defs: &[VariableDef]) -> ReportResult<Vec<Variable>> {
        let registry = FunctionRegistry::new();
        let numeric = NumericContext::default();
        let compiler = Compiler::new(&registry, &numeric, DateOrder::DayFirst);
        let mut variables = Vec::new();
        for def in defs {
            let variable = Variable::compile(def, &compiler, &variables)?;
            variables.push(variable);
        }
        Ok(variables)
    }

    #[test]
    fn test_reference_rules() {
        let doubled = VariableDef::new("doubled", VariableKind::Expression, Some("age * 2"));
        let total = VariableDef::new("total", VariableKind::Sum, Some("v.doubled"));
        assert!(compile(&[doubled.clone(), total.clone()]).is_ok());

        let nested = VariableDef::new("nested", VariableKind::Expression, Some("v.doubled + 1"));
        assert!(matches!(
            compile(&[doubled.clone(), nested]),
            Err(ReportError::InvalidVariable { .. })
        ));

        let on_sum = VariableDef::new("on_sum", VariableKind::Highest, Some("v.total"));
        assert!(matches!(
            compile(&[doubled.clone(), total.clone(), on_sum]),
            Err(ReportError::InvalidVariable { .. })
        ));

        let custom = VariableDef::custom("custom", None, None, None, "v.total + v.doubled");
        assert!(compile(&[doubled.clone(), total, custom.clone()]).is_ok());
        // Only variables defined before it
        assert!(compile(&[custom, doubled]).is_err());
    }

    #[test]
    fn test_definition_checks() {
        assert!(matches!(
            compile(&[VariableDef::new("s", VariableKind::Sum, None)]),
            Err(ReportError::InvalidVariable { .. })
        ));
        assert!(compile(&[VariableDef::new("c", VariableKind::Count, None)]).is_ok());
        let twice = VariableDef::new("c", VariableKind::CountAll, None);
        assert!(matches!(
            compile(&[twice.clone(), twice]),
            Err(ReportError::DuplicateVariable(_))
        ));
        assert!(matches!(
            compile(&[VariableDef::new("p", VariableKind::Sum, Some("1 +"))]),
            Err(ReportError::Engine(_))
        ));
    }

    #[test]
    fn test_definition_from_json() {
        let def: VariableDef = serde_json::from_str(
            r#"{"name": "oldest", "kind": "highest", "base": "age", "precalculate": true}"#,
        )
        .unwrap();
        assert_eq!(def.kind, VariableKind::Highest);
        assert!(def.precalculate);
        assert_eq!(def.reset_on_break, None);
    }
}
