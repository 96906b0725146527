//! FILENAME: engine/src/functions/math.rs
//! PURPOSE: Transcendental builtins, computed in f64 and converted back.

use super::{check_all, FnResult};
use crate::evaluator::EvalEnv;
use crate::value::{ResultValue, ValueKind};

/// Applies `f` to a single numeric operand. Results outside the reals
/// (NaN, infinities) are errors.
pub(super) fn apply<F>(args: &[&ResultValue], env: &EvalEnv<'_>, f: F) -> FnResult
where
    F: Fn(f64) -> f64,
{
    check_all(args, ValueKind::Number, ValueKind::Number)?;
    args[0]
        .as_number()
        .and_then(|n| n.map_f64(env.numeric, f))
        .map(ResultValue::number)
        .ok_or_else(ResultValue::invalid_operands)
}
