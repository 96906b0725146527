//! FILENAME: engine/src/expr.rs
//! PURPOSE: The compiled expression tree with per-node result slots.
//! CONTEXT: The parser produces an AST; `compile` turns it into ExprNodes.
//! Every node carries a SlotRing. Constants own one value in every slot,
//! resolved references borrow a value owned elsewhere (a query column, a
//! variable, a counter) and function calls own the value they computed.
//!
//! LIFECYCLE:
//! parse --> compile --> resolve --> optimize --> evaluate (once per row)
//!
//! Identifiers compile to a constant "invalid identifier" error. Resolution
//! replaces the slots with a borrowed source, so an expression whose
//! references cannot be resolved still evaluates (to that error) and prints.

use std::borrow::Cow;
use std::fmt;

use crate::evaluator::EvalEnv;
use crate::functions::FunctionRef;
use crate::resolver::Scope;
use crate::slot::{ResultSlot, ResultSource, Slot, SlotRing};
use crate::value::{Payload, ResultValue, ValueKind};

/// What a node is.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// A literal or folded value; the value lives in the ring.
    Constant,
    /// `m.NAME`
    Environment { name: String },
    /// `r.NAME`
    RowVariable { name: String },
    /// `v.NAME`
    ReportVariable { name: String },
    /// `name`, `.name` or `query.name`
    Identifier {
        query: Option<String>,
        name: String,
        dot_prefixed: bool,
    },
    /// A function or operator application.
    Call {
        function: FunctionRef,
        operands: Vec<ExprNode>,
    },
}

#[derive(Debug, Clone)]
pub struct ExprNode {
    pub kind: NodeKind,
    pub ring: SlotRing,
    /// Written in parentheses (or as a function argument). Keeps
    /// left-associative functions from flattening it into its parent.
    pub parenthesized: bool,
}

impl ExprNode {
    pub fn constant(value: ResultValue) -> Self {
        ExprNode {
            kind: NodeKind::Constant,
            ring: SlotRing::constant(value),
            parenthesized: false,
        }
    }

    /// A reference node; it evaluates to an error until it is resolved.
    pub fn reference(kind: NodeKind) -> Self {
        let mut node = ExprNode {
            kind,
            ring: SlotRing::empty(),
            parenthesized: false,
        };
        node.ring = SlotRing::constant(ResultValue::error(node.invalid_identifier()));
        node
    }

    pub fn call(function: FunctionRef, operands: Vec<ExprNode>) -> Self {
        ExprNode {
            kind: NodeKind::Call { function, operands },
            ring: SlotRing::empty(),
            parenthesized: false,
        }
    }

    /// The message an unresolved reference evaluates to.
    pub fn invalid_identifier(&self) -> String {
        let name = match &self.kind {
            NodeKind::Environment { name } => format!("m.{}", name),
            NodeKind::RowVariable { name } => format!("r.{}", name),
            NodeKind::ReportVariable { name } => format!("v.{}", name),
            NodeKind::Identifier {
                query,
                name,
                dot_prefixed,
            } => match query {
                Some(q) => format!("{}.{}", q, name),
                None if *dot_prefixed => format!(".{}", name),
                None => name.clone(),
            },
            _ => String::new(),
        };
        format!("invalid identifier '{}'", name)
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, NodeKind::Constant)
    }

    /// The value of a constant node.
    pub fn constant_value(&self) -> Option<&ResultValue> {
        match self.kind {
            NodeKind::Constant => self.ring.owned(Slot::Current),
            _ => None,
        }
    }

    /// The value of this node in `slot`. `self_value` answers `r.self`.
    pub fn value<'a>(
        &'a self,
        slot: Slot,
        scope: &'a dyn Scope,
        self_value: Option<&'a ResultValue>,
    ) -> Cow<'a, ResultValue> {
        match self.ring.get(slot) {
            Some(ResultSlot::Owned(value)) => Cow::Borrowed(value),
            Some(ResultSlot::Borrowed(ResultSource::SelfResult)) => match self_value {
                Some(value) => Cow::Borrowed(value),
                None => Cow::Owned(ResultValue::null(ValueKind::Number)),
            },
            Some(ResultSlot::Borrowed(source)) => scope
                .lookup(source, slot)
                .unwrap_or_else(|| Cow::Owned(ResultValue::error(self.invalid_identifier()))),
            None => Cow::Owned(ResultValue::invalid_operands()),
        }
    }

    /// Number of nodes in this subtree.
    pub fn nodes(&self) -> usize {
        match &self.kind {
            NodeKind::Call { operands, .. } => {
                1 + operands.iter().map(ExprNode::nodes).sum::<usize>()
            }
            _ => 1,
        }
    }

    /// Visits every node, parents before children.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a ExprNode)) {
        visit(self);
        if let NodeKind::Call { operands, .. } = &self.kind {
            for operand in operands {
                operand.walk(visit);
            }
        }
    }

    /// Every borrowed source in the subtree.
    pub fn sources<'a>(&'a self) -> Vec<&'a ResultSource> {
        let mut sources = Vec::new();
        self.walk(&mut |node: &'a ExprNode| {
            if let Some(source) = node.ring.source() {
                sources.push(source);
            }
        });
        sources
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Canonical form: `add(1,mul(2,3))`, `.'age'`, `q.'col'`, `v.'name'`.
impl fmt::Display for ExprNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Constant => match self.ring.owned(Slot::Current).map(|v| (v, v.payload())) {
                Some((v, _)) if v.is_null() => write!(f, "null{}", kind_suffix(v.kind())),
                Some((_, Payload::Number(n))) => write!(f, "{}", n),
                Some((_, Payload::String(s))) => write!(f, "{}", quote(s)),
                Some((_, Payload::Datetime(dt))) => write!(f, "{{{}}}", dt),
                Some((_, Payload::Error(message))) => write!(f, "error({})", quote(message)),
                None => write!(f, "?"),
            },
            NodeKind::Environment { name } => write!(f, "m.{}", quote(name)),
            NodeKind::RowVariable { name } => write!(f, "r.{}", quote(name)),
            NodeKind::ReportVariable { name } => write!(f, "v.{}", quote(name)),
            NodeKind::Identifier { query, name, .. } => match query {
                Some(q) => write!(f, "{}.{}", q, quote(name)),
                None => write!(f, ".{}", quote(name)),
            },
            NodeKind::Call { function, operands } => {
                write!(f, "{}(", function.name())?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", operand)?;
                }
                write!(f, ")")
            }
        }
    }
}

fn kind_suffix(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Number => "n()",
        ValueKind::String => "s()",
        ValueKind::Datetime => "dt()",
        ValueKind::Error => "()",
    }
}

// ========================================
// COMPILED EXPRESSION
// ========================================

/// A compiled expression with its iteration state.
///
/// An expression referencing `r.self` is iterative: each evaluation sees the
/// previous result. The first evaluation sees the initial value; with
/// `start_with_initial` the first evaluation yields the initial value itself.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    root: ExprNode,
    text: String,
    initial: Option<ResultValue>,
    start_with_initial: bool,
    evaluated: bool,
}

impl CompiledExpr {
    pub fn new(root: ExprNode, text: impl Into<String>) -> Self {
        CompiledExpr {
            root,
            text: text.into(),
            initial: None,
            start_with_initial: false,
            evaluated: false,
        }
    }

    /// A constant expression.
    pub fn from_value(value: ResultValue) -> Self {
        let text = ExprNode::constant(value.clone()).to_string();
        CompiledExpr::new(ExprNode::constant(value), text)
    }

    pub fn root(&self) -> &ExprNode {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut ExprNode {
        &mut self.root
    }

    /// The source text the expression was compiled from.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn nodes(&self) -> usize {
        self.root.nodes()
    }

    pub fn is_constant(&self) -> bool {
        self.root.is_constant()
    }

    pub fn constant_value(&self) -> Option<&ResultValue> {
        self.root.constant_value()
    }

    /// Whether the expression reads its own previous result.
    pub fn is_iterative(&self) -> bool {
        self.root
            .sources()
            .iter()
            .any(|s| matches!(s, ResultSource::SelfResult))
    }

    /// Whether the expression reads a precalculated variable, so its value is
    /// only final once the precalculation pass has run.
    pub fn is_delayed(&self) -> bool {
        self.root.sources().iter().any(|s| {
            matches!(
                s,
                ResultSource::Variable {
                    precalculated: true,
                    ..
                }
            )
        })
    }

    pub fn sources(&self) -> Vec<&ResultSource> {
        self.root.sources()
    }

    /// Sets the value `r.self` has before the first evaluation.
    pub fn set_initial_value(&mut self, value: ResultValue) {
        self.initial = Some(value);
    }

    pub fn initial_value(&self) -> Option<&ResultValue> {
        self.initial.as_ref()
    }

    /// Makes the first evaluation yield the initial value unchanged.
    pub fn set_start_with_initial(&mut self, start: bool) {
        self.start_with_initial = start;
    }

    /// Restarts iteration: the next evaluation is a first one again.
    pub fn reset_iteration(&mut self) {
        self.evaluated = false;
    }

    /// Evaluates into `env.slot` and returns the result.
    pub fn evaluate(&mut self, env: &EvalEnv<'_>) -> ResultValue {
        let initial = self
            .initial
            .clone()
            .unwrap_or_else(|| ResultValue::null(ValueKind::Number));

        if !self.evaluated && self.start_with_initial {
            self.evaluated = true;
            if matches!(self.root.kind, NodeKind::Call { .. }) {
                self.root
                    .ring
                    .push(env.slot, Some(ResultSlot::Owned(initial.clone())));
            }
            return initial;
        }

        let previous = if self.evaluated {
            self.root
                .value(env.slot, env.scope, Some(&initial))
                .into_owned()
        } else {
            initial
        };

        env.evaluate_node(&mut self.root, Some(&previous));
        self.evaluated = true;
        self.root
            .value(env.slot, env.scope, Some(&previous))
            .into_owned()
    }

    /// The value last evaluated into `slot`.
    pub fn result<'a>(&'a self, slot: Slot, scope: &'a dyn Scope) -> Cow<'a, ResultValue> {
        self.root.value(slot, scope, self.initial.as_ref())
    }
}

impl fmt::Display for CompiledExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}
