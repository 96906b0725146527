//! FILENAME: engine/src/compile.rs
//! PURPOSE: Turns the parser's AST into an evaluatable expression tree.
//! CONTEXT: Operators become calls of their builtin functions, literals are
//! converted once to their final values, and function names are looked up
//! in the report's function table. Identifiers are left unbound; `resolve`
//! binds them later.

use parser::{Expression, Value, VariableScope};

use crate::error::{EngineError, EngineResult};
use crate::expr::{CompiledExpr, ExprNode, NodeKind};
use crate::functions::{Arity, FunctionRef, FunctionRegistry};
use crate::numeric::{NumericContext, NumericValue};
use crate::temporal::{DateOrder, TemporalValue};
use crate::value::ResultValue;

/// Settings a compilation needs.
#[derive(Clone, Copy)]
pub struct Compiler<'a> {
    pub registry: &'a FunctionRegistry,
    pub numeric: &'a NumericContext,
    pub date_order: DateOrder,
}

impl<'a> Compiler<'a> {
    pub fn new(registry: &'a FunctionRegistry, numeric: &'a NumericContext, date_order: DateOrder) -> Self {
        Compiler {
            registry,
            numeric,
            date_order,
        }
    }

    /// Parses and compiles `text`.
    pub fn compile_str(&self, text: &str) -> EngineResult<CompiledExpr> {
        let ast = parser::parse(text)?;
        let root = self.compile(&ast)?;
        Ok(CompiledExpr::new(root, text))
    }

    pub fn compile(&self, ast: &Expression) -> EngineResult<ExprNode> {
        match ast {
            Expression::Literal(value) => self.literal(value).map(ExprNode::constant),

            Expression::Identifier {
                domain,
                name,
                dot_prefixed,
            } => Ok(ExprNode::reference(NodeKind::Identifier {
                query: domain.clone(),
                name: name.clone(),
                dot_prefixed: *dot_prefixed,
            })),

            Expression::Variable { scope, name } => {
                let name = name.clone();
                Ok(ExprNode::reference(match scope {
                    VariableScope::Environment => NodeKind::Environment { name },
                    VariableScope::Row => NodeKind::RowVariable { name },
                    VariableScope::Report => NodeKind::ReportVariable { name },
                }))
            }

            Expression::BinaryOp { left, op, right } => {
                let operands = vec![self.compile(left)?, self.compile(right)?];
                self.call(op.function_name(), operands)
            }

            Expression::UnaryOp { op, operand } => {
                let operand = self.compile(operand)?;
                match op.function_name() {
                    Some(name) => self.call(name, vec![operand]),
                    None => Ok(operand),
                }
            }

            Expression::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let operands = vec![
                    self.compile(condition)?,
                    self.compile(then_branch)?,
                    self.compile(else_branch)?,
                ];
                self.call("iif", operands)
            }

            Expression::FunctionCall { name, args } => {
                let operands = args
                    .iter()
                    .map(|arg| {
                        // An argument is its own unit, like a parenthesized operand
                        self.compile(arg).map(|mut node| {
                            node.parenthesized = true;
                            node
                        })
                    })
                    .collect::<EngineResult<Vec<_>>>()?;
                self.call(name, operands)
            }

            Expression::Grouped(inner) => {
                let mut node = self.compile(inner)?;
                node.parenthesized = true;
                Ok(node)
            }
        }
    }

    fn literal(&self, value: &Value) -> EngineResult<ResultValue> {
        match value {
            Value::Number(text) => NumericValue::parse(text, self.numeric)
                .map(ResultValue::number)
                .ok_or_else(|| EngineError::InvalidNumber(text.clone())),
            Value::String(text) => Ok(ResultValue::string(text.as_str())),
            Value::Datetime(text) => TemporalValue::parse(text, self.date_order)
                .map(ResultValue::datetime)
                .ok_or_else(|| EngineError::InvalidDatetime(text.clone())),
        }
    }

    fn call(&self, name: &str, operands: Vec<ExprNode>) -> EngineResult<ExprNode> {
        let function: FunctionRef = self
            .registry
            .lookup(name)
            .ok_or_else(|| EngineError::UnknownFunction(name.to_string()))?;
        if let Arity::Exact(expected) = function.arity() {
            if expected != operands.len() {
                return Err(EngineError::Arity {
                    name: function.name().to_string(),
                    expected,
                    got: operands.len(),
                });
            }
        }
        Ok(ExprNode::call(function, operands))
    }
}

/// Parses and compiles `text` in one call.
pub fn compile_str(
    text: &str,
    registry: &FunctionRegistry,
    numeric: &NumericContext,
    date_order: DateOrder,
) -> EngineResult<CompiledExpr> {
    Compiler::new(registry, numeric, date_order).compile_str(text)
}
