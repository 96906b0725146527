//! FILENAME: engine/src/resolver.rs
//! PURPOSE: Binds the references of an expression to the values they name.
//! CONTEXT: A `Scope` answers two questions: at resolution time, which
//! `ResultSource` a name refers to, and at evaluation time, what value a
//! source holds in a given slot. Layers stack: `QueryScope` knows query
//! columns, row counters and the environment; the report layer adds
//! variables and break counters on top of it.

use std::borrow::Cow;

use crate::environment::Environment;
use crate::expr::{CompiledExpr, ExprNode, NodeKind};
use crate::functions::Builtin;
use crate::query::{QueryArena, QueryId};
use crate::slot::{ResultSource, Slot, SlotRing};
use crate::value::ResultValue;

pub trait Scope {
    /// `query.name`, `.name` or `name`.
    fn resolve_column(&self, _query: Option<&str>, _name: &str) -> Option<ResultSource> {
        None
    }

    /// `v.name`
    fn resolve_variable(&self, _name: &str) -> Option<ResultSource> {
        None
    }

    /// `r.name` other than `r.self`.
    fn resolve_row_variable(&self, _name: &str) -> Option<ResultSource> {
        None
    }

    /// `rownum()` (default query) or `rownum('query')`.
    fn resolve_query_row_number(&self, _query: Option<&str>) -> Option<ResultSource> {
        None
    }

    /// `brrownum('break')`
    fn resolve_break_row_number(&self, _name: &str) -> Option<ResultSource> {
        None
    }

    /// The value `source` holds in `slot`.
    fn lookup(&self, source: &ResultSource, slot: Slot) -> Option<Cow<'_, ResultValue>>;
}

/// A scope with nothing in it. Used for constant folding.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyScope;

impl Scope for EmptyScope {
    fn lookup(&self, _source: &ResultSource, _slot: Slot) -> Option<Cow<'_, ResultValue>> {
        None
    }
}

// ========================================
// QUERY SCOPE
// ========================================

/// Query columns, query row counters and environment values.
pub struct QueryScope<'a> {
    arena: &'a QueryArena,
    environment: Option<&'a dyn Environment>,
    default_query: Option<QueryId>,
}

impl<'a> QueryScope<'a> {
    pub fn new(arena: &'a QueryArena) -> Self {
        QueryScope {
            arena,
            environment: None,
            default_query: None,
        }
    }

    pub fn with_environment(mut self, environment: &'a dyn Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// The query searched first for unqualified columns and counted by a
    /// bare `rownum()`.
    pub fn with_default_query(mut self, query: Option<QueryId>) -> Self {
        self.default_query = query;
        self
    }

    pub fn arena(&self) -> &'a QueryArena {
        self.arena
    }

    fn column_in(&self, query: QueryId, name: &str) -> Option<ResultSource> {
        let column = self.arena.get(query)?.column_index(name)?;
        Some(ResultSource::Column { query, column })
    }
}

impl Scope for QueryScope<'_> {
    fn resolve_column(&self, query: Option<&str>, name: &str) -> Option<ResultSource> {
        if let Some(query) = query {
            return self.column_in(self.arena.id_of(query)?, name);
        }
        // The default query and its followers first, then every query
        let preferred = self
            .default_query
            .map(|id| self.arena.family(id))
            .unwrap_or_default();
        preferred
            .into_iter()
            .chain(self.arena.ids())
            .find_map(|id| self.column_in(id, name))
    }

    fn resolve_query_row_number(&self, query: Option<&str>) -> Option<ResultSource> {
        let query = match query {
            Some(name) => self.arena.id_of(name)?,
            None => self.default_query.or_else(|| self.arena.ids().next())?,
        };
        Some(ResultSource::RowNumber { query })
    }

    fn lookup(&self, source: &ResultSource, slot: Slot) -> Option<Cow<'_, ResultValue>> {
        match source {
            ResultSource::Column { query, column } => self
                .arena
                .get(*query)?
                .column(*column)
                .map(|c| Cow::Borrowed(c.ring.get(slot))),
            ResultSource::RowNumber { query } => self
                .arena
                .get(*query)
                .map(|q| Cow::Borrowed(q.rownum().get(slot))),
            ResultSource::Environment { name } => {
                self.environment.map(|env| Cow::Owned(env.get(name)))
            }
            _ => None,
        }
    }
}

// ========================================
// RESOLUTION
// ========================================

/// Binds every reference of `expr` in `scope`. Returns the references that
/// could not be bound; those keep evaluating to "invalid identifier".
pub fn resolve(expr: &mut CompiledExpr, scope: &dyn Scope) -> Vec<String> {
    let mut unresolved = Vec::new();
    resolve_node(expr.root_mut(), scope, &mut unresolved);
    unresolved
}

fn resolve_node(node: &mut ExprNode, scope: &dyn Scope, unresolved: &mut Vec<String>) {
    let source = match &mut node.kind {
        NodeKind::Constant => return,
        NodeKind::Environment { name } => Some(ResultSource::Environment { name: name.clone() }),
        NodeKind::RowVariable { name } if name.as_str() == "self" => Some(ResultSource::SelfResult),
        NodeKind::RowVariable { name } => scope.resolve_row_variable(name),
        NodeKind::ReportVariable { name } => scope.resolve_variable(name),
        NodeKind::Identifier { query, name, .. } => scope.resolve_column(query.as_deref(), name),
        NodeKind::Call { function, operands } => {
            for operand in operands.iter_mut() {
                resolve_node(operand, scope, unresolved);
            }
            let counter = match function.builtin() {
                Some(Builtin::Rownum) => Some(Builtin::Rownum),
                Some(Builtin::Brrownum) => Some(Builtin::Brrownum),
                _ => None,
            };
            if let Some(counter) = counter {
                resolve_counter(node, counter, scope);
            }
            return;
        }
    };

    match source {
        Some(source) => node.ring = SlotRing::borrowed(source),
        None => {
            let message = node.invalid_identifier();
            log::debug!("unresolved reference: {}", message);
            node.ring = SlotRing::constant(ResultValue::error(message.clone()));
            unresolved.push(message);
        }
    }
}

/// rownum() and brrownum() with a constant operand alias the counter
/// directly; an unknown name becomes a constant error.
fn resolve_counter(node: &mut ExprNode, counter: Builtin, scope: &dyn Scope) {
    let operands = match &node.kind {
        NodeKind::Call { operands, .. } => operands,
        _ => return,
    };
    let name = match operands.as_slice() {
        [] => None,
        [operand] => match operand.constant_value().and_then(|v| v.as_str()) {
            Some(name) => Some(name.to_string()),
            // Resolved again at every evaluation
            None => return,
        },
        _ => return,
    };

    let source = match (counter, name.as_deref()) {
        (Builtin::Rownum, query) => scope.resolve_query_row_number(query),
        (_, Some(name)) => scope.resolve_break_row_number(name),
        (_, None) => None,
    };

    match source {
        Some(source) => node.ring = SlotRing::borrowed(source),
        None => {
            let message = match counter {
                Builtin::Rownum => "rownum(): no such query",
                _ => "brrownum(): no such break",
            };
            *node = ExprNode::constant(ResultValue::error(message));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array_source::{ArrayCursor, ArrayTable};
    use crate::compile::compile_str;
    use crate::environment::MapEnvironment;
    use crate::functions::FunctionRegistry;
    use crate::numeric::NumericContext;
    use crate::query::Query;
    use crate::temporal::DateOrder;

    fn compile(text: &str) -> CompiledExpr {
        compile_str(text, &FunctionRegistry::new(), &NumericContext::default(), DateOrder::DayFirst)
            .unwrap()
    }

    fn arena() -> QueryArena {
        let mut arena = QueryArena::new();
        for (name, header) in [("people", ["name", "age"]), ("cities", ["city", "age"])] {
            let table = ArrayTable::from_rows(&[&header]);
            arena
                .insert(Query::new(name, "array", Box::new(ArrayCursor::new(table))))
                .unwrap();
        }
        arena
    }

    #[test]
    fn test_columns_resolve_qualified_and_by_default_query() {
        let arena = arena();
        let cities = arena.id_of("cities").unwrap();
        let scope = QueryScope::new(&arena).with_default_query(Some(cities));

        let mut expr = compile("age + people.age");
        assert!(resolve(&mut expr, &scope).is_empty());
        let sources = expr.sources();
        assert_eq!(sources[0], &ResultSource::Column { query: cities, column: 1 });
        assert_eq!(
            sources[1],
            &ResultSource::Column {
                query: arena.id_of("people").unwrap(),
                column: 1
            }
        );
    }

    #[test]
    fn test_unresolved_reference_is_an_error_node() {
        let arena = arena();
        let scope = QueryScope::new(&arena);
        let mut expr = compile("nosuch + v.total");
        let unresolved = resolve(&mut expr, &scope);
        assert_eq!(
            unresolved,
            vec!["invalid identifier 'nosuch'", "invalid identifier 'v.total'"]
        );
        assert_eq!(expr.to_string(), "add(.'nosuch',v.'total')");
    }

    #[test]
    fn test_row_counters() {
        let arena = arena();
        let scope = QueryScope::new(&arena);

        let mut expr = compile("rownum()");
        resolve(&mut expr, &scope);
        assert_eq!(expr.sources(), vec![&ResultSource::RowNumber { query: QueryId(0) }]);

        let mut expr = compile("rownum('cities')");
        resolve(&mut expr, &scope);
        assert_eq!(expr.sources(), vec![&ResultSource::RowNumber { query: QueryId(1) }]);

        let mut expr = compile("rownum('nope')");
        resolve(&mut expr, &scope);
        assert_eq!(
            expr.constant_value(),
            Some(&ResultValue::error("rownum(): no such query"))
        );

        let mut expr = compile("brrownum('b')");
        resolve(&mut expr, &scope);
        assert_eq!(
            expr.constant_value(),
            Some(&ResultValue::error("brrownum(): no such break"))
        );
    }

    #[test]
    fn test_environment_lookup() {
        let arena = arena();
        let env = MapEnvironment::new().with("USER", ResultValue::string("ada"));
        let scope = QueryScope::new(&arena).with_environment(&env);
        let source = ResultSource::Environment { name: "USER".into() };
        assert_eq!(
            scope.lookup(&source, Slot::Current).map(Cow::into_owned),
            Some(ResultValue::string("ada"))
        );
        assert!(QueryScope::new(&arena).lookup(&source, Slot::Current).is_none());
    }

    #[test]
    fn test_self_reference() {
        let mut expr = compile("r.self + 1");
        assert!(resolve(&mut expr, &EmptyScope).is_empty());
        assert!(expr.is_iterative());
    }
}
