//! FILENAME: engine/src/optimizer.rs
//! PURPOSE: Rewrites compiled expressions into cheaper equivalent trees.
//! CONTEXT: Runs after compilation and resolution, once per expression.
//! Three rewrites are applied bottom-up:
//!
//! 1. Flattening: `add(add(a, b), c)` becomes `add(a, b, c)` for functions
//!    that are commutative and associative. For left-associative functions
//!    only the first operand and operands written without parentheses are
//!    pulled up, so `a - (b - c)` keeps its shape.
//! 2. Folding: a call whose operands are all constants is evaluated once and
//!    replaced by its result.
//! 3. Splitting: in a commutative and associative call that mixes numeric
//!    constants with other operands, the constants are folded into one.
//!
//! Calls marked "don't optimize" (random, rownum, now, prevval, ...) are
//! never folded or flattened.

use crate::evaluator::{Clock, EvalEnv};
use crate::expr::{CompiledExpr, ExprNode, NodeKind};
use crate::numeric::NumericContext;
use crate::resolver::EmptyScope;
use crate::temporal::DateOrder;
use crate::value::{ResultValue, ValueKind};

/// Optimizes `expr` in place.
pub fn optimize(expr: &mut CompiledExpr, numeric: &NumericContext, date_order: DateOrder) {
    let clock = Clock::new();
    let env = EvalEnv::new(numeric, date_order, &clock, &EmptyScope);
    let before = expr.nodes();
    optimize_node(expr.root_mut(), &env);
    let after = expr.nodes();
    if after != before {
        log::debug!(
            "optimized '{}': {} -> {} nodes, now {}",
            expr.text(),
            before,
            after,
            expr
        );
    }
}

fn optimize_node(node: &mut ExprNode, env: &EvalEnv<'_>) {
    if let NodeKind::Call { operands, .. } = &mut node.kind {
        for operand in operands.iter_mut() {
            optimize_node(operand, env);
        }
    } else {
        return;
    }

    while flatten(node) {}
    if !fold(node, env) {
        split_constants(node, env);
    }
}

/// Pulls up operands that call the same function. Returns whether anything
/// changed.
fn flatten(node: &mut ExprNode) -> bool {
    let (function, operands) = match &mut node.kind {
        NodeKind::Call { function, operands } => (function, operands),
        _ => return false,
    };
    let props = function.properties();
    if props.dont_optimize {
        return false;
    }
    let comm_assoc = props.commutative && props.associative;
    if !comm_assoc && !props.left_associative {
        return false;
    }

    let mut changed = false;
    let mut flattened = Vec::with_capacity(operands.len());
    for (i, operand) in std::mem::take(operands).into_iter().enumerate() {
        let pull = match &operand.kind {
            NodeKind::Call { function: inner, .. } if inner.same_as(function) => {
                comm_assoc || i == 0 || !operand.parenthesized
            }
            _ => false,
        };
        match operand.kind {
            NodeKind::Call {
                operands: inner, ..
            } if pull => {
                flattened.extend(inner);
                changed = true;
            }
            kind => flattened.push(ExprNode {
                kind,
                ring: operand.ring,
                parenthesized: operand.parenthesized,
            }),
        }
    }
    *operands = flattened;
    changed
}

/// Replaces an all-constant call by its value.
fn fold(node: &mut ExprNode, env: &EvalEnv<'_>) -> bool {
    let value = match &node.kind {
        NodeKind::Call { function, operands }
            if !function.properties().dont_optimize
                && !operands.is_empty()
                && operands.iter().all(ExprNode::is_constant) =>
        {
            let values: Vec<&ResultValue> =
                operands.iter().filter_map(ExprNode::constant_value).collect();
            function.call(&values, env)
        }
        _ => return false,
    };
    let parenthesized = node.parenthesized;
    *node = ExprNode::constant(value);
    node.parenthesized = parenthesized;
    true
}

/// Folds the numeric constants of a commutative and associative call.
fn split_constants(node: &mut ExprNode, env: &EvalEnv<'_>) {
    let (function, operands) = match &mut node.kind {
        NodeKind::Call { function, operands } => (function, operands),
        _ => return,
    };
    let props = function.properties();
    if props.dont_optimize || !(props.commutative && props.associative) {
        return;
    }

    let constants: Vec<&ResultValue> = operands.iter().filter_map(ExprNode::constant_value).collect();
    if constants.len() < 2 || constants.len() == operands.len() {
        return;
    }
    // Strings concatenate in order; datetimes change how numbers are read
    if constants
        .iter()
        .any(|c| c.kind() != ValueKind::Number || c.is_null())
    {
        return;
    }

    let folded = function.call(&constants, env);
    if folded.is_error() {
        return;
    }

    let first = operands.iter().position(ExprNode::is_constant).unwrap_or(0);
    let mut rest: Vec<ExprNode> = Vec::with_capacity(operands.len());
    for (i, operand) in std::mem::take(operands).into_iter().enumerate() {
        if i == first {
            rest.push(ExprNode::constant(folded.clone()));
        } else if !operand.is_constant() {
            rest.push(operand);
        }
    }
    *operands = rest;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile_str;
    use crate::functions::FunctionRegistry;

    fn optimized(text: &str) -> CompiledExpr {
        let numeric = NumericContext::default();
        let mut expr =
            compile_str(text, &FunctionRegistry::new(), &numeric, DateOrder::DayFirst).unwrap();
        optimize(&mut expr, &numeric, DateOrder::DayFirst);
        expr
    }

    #[test]
    fn test_constant_folding() {
        let expr = optimized("1 + 2 * 3");
        assert!(expr.is_constant());
        assert_eq!(expr.constant_value(), Some(&ResultValue::from_i64(7)));
        assert_eq!(optimized("upper('abc')").to_string(), "'ABC'");
        assert_eq!(optimized("1 / 0").to_string(), "error('division by zero')");
    }

    #[test]
    fn test_flatten_commutative_associative() {
        let expr = optimized("a + b + c + d");
        assert_eq!(expr.to_string(), "add(.'a',.'b',.'c',.'d')");
        assert_eq!(expr.nodes(), 5);

        let expr = optimized("a * (b * c)");
        assert_eq!(expr.to_string(), "mul(.'a',.'b',.'c')");
    }

    #[test]
    fn test_flatten_left_associative() {
        assert_eq!(optimized("a - b - c").to_string(), "sub(.'a',.'b',.'c')");
        assert_eq!(optimized("a - (b - c)").to_string(), "sub(.'a',sub(.'b',.'c'))");
        assert_eq!(optimized("a / b / c").nodes(), 4);
    }

    #[test]
    fn test_split_numeric_constants() {
        let expr = optimized("1 + a + 2 + 3");
        assert_eq!(expr.to_string(), "add(6,.'a')");
        assert_eq!(expr.nodes(), 3);

        // String constants keep their order
        assert_eq!(optimized("'a' + x + 'b'").nodes(), 4);
    }

    #[test]
    fn test_volatile_calls_untouched() {
        assert_eq!(optimized("rownum() + 1 + 2").to_string(), "add(rownum(),3)");
        assert!(!optimized("random()").is_constant());
        assert!(!optimized("prevval(1)").is_constant());
    }

    #[test]
    fn test_optimized_tree_evaluates_the_same() {
        let numeric = NumericContext::default();
        let clock = Clock::new();
        let env = EvalEnv::new(&numeric, DateOrder::DayFirst, &clock, &EmptyScope);
        for text in ["(2 + 3) * (4 - 1) / 5", "10 - 2 - 3", "2 ^ 3 ^ 2", "left('hello' + 'world', 7)"] {
            let mut plain =
                compile_str(text, &FunctionRegistry::new(), &numeric, DateOrder::DayFirst).unwrap();
            let mut fast = optimized(text);
            assert_eq!(plain.evaluate(&env), fast.evaluate(&env), "{}", text);
        }
    }
}
