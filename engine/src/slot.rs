//! FILENAME: engine/src/slot.rs
//! PURPOSE: The three result slots kept by every expression node, column and counter.
//! CONTEXT: `Slot::Current` receives the value of the row being evaluated,
//! `Slot::Previous` keeps the value of the evaluation before it, and
//! `Slot::Precalculated` holds the value a precalculation pass left behind.
//! Writing a new Current value first rotates Current into Previous, so
//! comparing a row against the one before it never needs re-evaluation.

use crate::query::QueryId;
use crate::value::{ResultValue, ValueKind};

/// Selects one of the three slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Current,
    Previous,
    Precalculated,
}

impl Slot {
    fn index(self) -> usize {
        match self {
            Slot::Current => 0,
            Slot::Previous => 1,
            Slot::Precalculated => 2,
        }
    }
}

/// Three values addressed by `Slot`.
#[derive(Debug, Clone, PartialEq)]
pub struct Ring<T> {
    items: [T; 3],
}

impl<T: Clone> Ring<T> {
    /// A ring holding `value` in every slot.
    pub fn splat(value: T) -> Self {
        Ring {
            items: [value.clone(), value.clone(), value],
        }
    }

    /// Copies Current into Precalculated.
    pub fn save_precalculated(&mut self) {
        self.items[2] = self.items[0].clone();
    }

    /// Fills every slot with `value`.
    pub fn fill(&mut self, value: T) {
        self.items = [value.clone(), value.clone(), value];
    }
}

impl<T> Ring<T> {
    pub fn get(&self, slot: Slot) -> &T {
        &self.items[slot.index()]
    }

    pub fn get_mut(&mut self, slot: Slot) -> &mut T {
        &mut self.items[slot.index()]
    }

    /// Makes the Current value the Previous one. Current then holds the
    /// stale value from two evaluations ago until it is overwritten.
    pub fn rotate(&mut self) {
        self.items.swap(0, 1);
    }

    /// Stores a value; storing into Current rotates first.
    pub fn push(&mut self, slot: Slot, value: T) {
        if slot == Slot::Current {
            self.rotate();
        }
        self.items[slot.index()] = value;
    }
}

/// A value ring for columns, counters and variables.
pub type ValueRing = Ring<ResultValue>;

impl ValueRing {
    pub fn null(kind: ValueKind) -> Self {
        Ring::splat(ResultValue::null(kind))
    }
}

/// Where a borrowed slot reads its value from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResultSource {
    /// A column of a query.
    Column { query: QueryId, column: usize },
    /// The 1-based row counter of a query.
    RowNumber { query: QueryId },
    /// The row counter of a report break, by break index.
    BreakRowNumber { index: usize },
    /// The result of a report variable. A precalculated variable is always
    /// read from its Precalculated slot.
    Variable { index: usize, precalculated: bool },
    /// One stage of a custom variable: 0 base, 1 intermediate, 2 intermediate2.
    VariableStage { index: usize, stage: usize },
    /// An environment value (`m.NAME`).
    Environment { name: String },
    /// The expression's own previous result (`r.self`).
    SelfResult,
}

/// One slot of an expression node: a value the node owns, or an alias of
/// a value owned elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultSlot {
    Owned(ResultValue),
    Borrowed(ResultSource),
}

/// The slots of an expression node. A slot stays empty until the node has
/// been evaluated into it.
pub type SlotRing = Ring<Option<ResultSlot>>;

impl SlotRing {
    pub fn empty() -> Self {
        Ring::splat(None)
    }

    /// A ring with the same owned value in every slot, used by constants.
    pub fn constant(value: ResultValue) -> Self {
        Ring::splat(Some(ResultSlot::Owned(value)))
    }

    /// A ring aliasing `source` in every slot.
    pub fn borrowed(source: ResultSource) -> Self {
        Ring::splat(Some(ResultSlot::Borrowed(source)))
    }

    /// The alias target if the node is a borrowed reference.
    pub fn source(&self) -> Option<&ResultSource> {
        match self.get(Slot::Current) {
            Some(ResultSlot::Borrowed(source)) => Some(source),
            _ => None,
        }
    }

    pub fn owned(&self, slot: Slot) -> Option<&ResultValue> {
        match self.get(slot) {
            Some(ResultSlot::Owned(value)) => Some(value),
            _ => None,
        }
    }
}
