//! FILENAME: engine/src/lib.rs
//! PURPOSE: Main library entry point for the report expression and query engine.
//! CONTEXT: Re-exports public types and modules for use by the report layer.
//!
//! Layers:
//! - values: `numeric`, `temporal`, `value`, `slot`
//! - expressions: `compile`, `expr`, `resolver`, `optimizer`, `evaluator`, `functions`
//! - data: `datasource`, `registry`, `array_source`, `encoding`, `query`, `navigation`
//! - `context`: the engine half of a report context

pub mod array_source;
pub mod compile;
pub mod config;
pub mod context;
pub mod datasource;
pub mod encoding;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod functions;
pub mod navigation;
pub mod numeric;
pub mod optimizer;
pub mod query;
pub mod registry;
pub mod resolver;
pub mod slot;
pub mod temporal;
pub mod value;

// Re-export commonly used types at the crate root
pub use array_source::{ArrayDriver, ArrayTable};
pub use compile::{compile_str, Compiler};
pub use config::EngineConfig;
pub use context::EngineContext;
pub use datasource::{ColumnDef, ColumnSetter, DataSource, DataSourceDriver, QueryDriver, QuerySource};
pub use encoding::Encoding;
pub use environment::{Environment, MapEnvironment, ProcessEnvironment};
pub use error::{EngineError, EngineResult};
pub use evaluator::{Clock, EvalEnv, EvalSettings};
pub use expr::{CompiledExpr, ExprNode, NodeKind};
pub use functions::{Arity, FunctionProperties, FunctionRef, FunctionRegistry, UserFunction};
pub use numeric::{NumericContext, NumericValue, RoundingMode};
pub use optimizer::optimize;
pub use query::{Query, QueryArena, QueryId};
pub use registry::DriverRegistry;
pub use resolver::{resolve, EmptyScope, QueryScope, Scope};
pub use slot::{ResultSlot, ResultSource, Slot, SlotRing, ValueRing};
pub use temporal::{DateOrder, TemporalValue};
pub use value::{ResultValue, ValueKind};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_runs_an_expression_over_a_query() {
        let mut ctx = EngineContext::default();
        ctx.add_datasource("array", "array").unwrap();
        let table = ArrayTable::from_rows(&[&["name", "age"], &["Fred", "31"], &["Mary", "28"], &["Tot", "0.5"]])
            .with_types(&[ValueKind::String, ValueKind::Number]);
        let people = ctx.add_query_array("people", "array", table).unwrap();

        let mut expr = ctx.compiler().compile_str("age * 2").unwrap();
        {
            let scope = ctx.query_scope(Some(people));
            assert!(resolve(&mut expr, &scope).is_empty());
        }
        optimize(&mut expr, &ctx.settings().numeric, ctx.settings().date_order);

        ctx.navigate_start(people).unwrap();
        let mut values = Vec::new();
        while ctx.navigate_next(people).unwrap() {
            let scope = ctx.query_scope(Some(people));
            let env = ctx.settings().env(&scope);
            values.push(expr.evaluate(&env).to_string());
        }
        assert_eq!(values, vec!["62", "56", "1"]);
    }

    #[test]
    fn it_counts_rows() {
        let mut ctx = EngineContext::default();
        ctx.add_datasource("array", "array").unwrap();
        let table = ArrayTable::from_rows(&[&["x"], &["a"], &["b"], &["c"]]);
        let q = ctx.add_query_array("q", "array", table).unwrap();

        let mut expr = ctx.compiler().compile_str("rownum()").unwrap();
        resolve(&mut expr, &ctx.query_scope(Some(q)));

        ctx.navigate_start(q).unwrap();
        let mut values = Vec::new();
        while ctx.navigate_next(q).unwrap() {
            let scope = ctx.query_scope(Some(q));
            values.push(expr.evaluate(&ctx.settings().env(&scope)).to_string());
        }
        assert_eq!(values, vec!["1", "2", "3"]);
    }
}
