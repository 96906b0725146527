//! FILENAME: engine/src/evaluator.rs
//! PURPOSE: Bottom-up evaluation of compiled expression trees.
//! CONTEXT: Evaluation never fails structurally. Every problem becomes an
//! Error Result stored in the node, and parents decide whether to
//! re-surface it. Each function call node rotates its own ring when a new
//! Current value is stored, so its Previous slot always holds the result of
//! the evaluation before.

use once_cell::unsync::OnceCell;
use smallvec::SmallVec;
use std::borrow::Cow;

use crate::config::EngineConfig;
use crate::expr::{ExprNode, NodeKind};
use crate::functions::Builtin;
use crate::numeric::NumericContext;
use crate::resolver::Scope;
use crate::slot::{ResultSlot, Slot};
use crate::temporal::{DateOrder, TemporalValue};
use crate::value::{Coercion, ResultValue};

/// Today's date and the current timestamp, read once per report run so
/// every row sees the same values.
#[derive(Debug, Default)]
pub struct Clock {
    today: OnceCell<TemporalValue>,
    now: OnceCell<TemporalValue>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock frozen at `at`.
    pub fn fixed(at: TemporalValue) -> Self {
        let clock = Clock::new();
        let mut date = at;
        date.hour = 0;
        date.minute = 0;
        date.second = 0;
        date.time_valid = false;
        let _ = clock.today.set(date);
        let _ = clock.now.set(at);
        clock
    }

    pub fn today(&self) -> TemporalValue {
        *self.today.get_or_init(TemporalValue::today)
    }

    pub fn now(&self) -> TemporalValue {
        *self.now.get_or_init(TemporalValue::now)
    }
}

/// The evaluation settings of one report context.
#[derive(Debug, Default)]
pub struct EvalSettings {
    pub numeric: NumericContext,
    pub date_order: DateOrder,
    /// Column text uses a decimal comma.
    pub decimal_comma: bool,
    pub clock: Clock,
}

impl EvalSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        EvalSettings {
            numeric: config.numeric_context(),
            date_order: config.date_order(),
            decimal_comma: config.uses_decimal_comma(),
            clock: Clock::new(),
        }
    }

    /// An environment evaluating into the Current slot of `scope`.
    pub fn env<'a>(&'a self, scope: &'a dyn Scope) -> EvalEnv<'a> {
        EvalEnv::new(&self.numeric, self.date_order, &self.clock, scope)
    }

    pub fn coercion(&self) -> Coercion<'_> {
        Coercion {
            numeric: &self.numeric,
            date_order: self.date_order,
            decimal_comma: self.decimal_comma,
        }
    }
}

/// Everything a function sees besides its operands.
#[derive(Clone, Copy)]
pub struct EvalEnv<'a> {
    pub numeric: &'a NumericContext,
    pub date_order: DateOrder,
    pub clock: &'a Clock,
    pub scope: &'a dyn Scope,
    /// The slot being evaluated into.
    pub slot: Slot,
}

impl<'a> EvalEnv<'a> {
    pub fn new(
        numeric: &'a NumericContext,
        date_order: DateOrder,
        clock: &'a Clock,
        scope: &'a dyn Scope,
    ) -> Self {
        EvalEnv {
            numeric,
            date_order,
            clock,
            scope,
            slot: Slot::Current,
        }
    }

    pub fn with_slot(self, slot: Slot) -> Self {
        EvalEnv { slot, ..self }
    }

    /// Evaluates the call nodes of `node` bottom-up into `self.slot`.
    /// Constants and references hold or borrow their values already.
    pub fn evaluate_node(&self, node: &mut ExprNode, self_value: Option<&ResultValue>) {
        if node.ring.source().is_some() {
            return;
        }
        let (function, operands) = match &mut node.kind {
            NodeKind::Call { function, operands } => (function, operands),
            _ => return,
        };

        for operand in operands.iter_mut() {
            self.evaluate_node(operand, self_value);
        }

        let result = if function.builtin() == Some(Builtin::Prevval) {
            self.previous_value(operands, self_value)
        } else {
            let values: SmallVec<[Cow<'_, ResultValue>; 4]> = operands
                .iter()
                .map(|op| op.value(self.slot, self.scope, self_value))
                .collect();
            let refs: SmallVec<[&ResultValue; 4]> = values.iter().map(|v| v.as_ref()).collect();
            function.call(&refs, self)
        };

        node.ring.push(self.slot, Some(ResultSlot::Owned(result)));
    }

    /// prevval(x): x as it was one evaluation ago.
    fn previous_value(&self, operands: &[ExprNode], self_value: Option<&ResultValue>) -> ResultValue {
        let operand = match operands {
            [operand] => operand,
            _ => return ResultValue::invalid_operands(),
        };
        if operand.ring.get(Slot::Previous).is_none() {
            return ResultValue::error("Subexpression has no previous result");
        }
        operand
            .value(Slot::Previous, self.scope, self_value)
            .into_owned()
    }
}

impl std::fmt::Debug for EvalEnv<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalEnv")
            .field("numeric", self.numeric)
            .field("date_order", &self.date_order)
            .field("slot", &self.slot)
            .finish()
    }
}
