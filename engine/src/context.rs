//! FILENAME: engine/src/context.rs
//! PURPOSE: The engine half of a report context: settings, functions,
//! environment, datasources and queries.
//! CONTEXT: Owned by one report instance and used from one thread. Only the
//! driver registry it creates datasources from is shared between contexts.

use rustc_hash::FxHashMap;

use crate::array_source::ArrayTable;
use crate::config::EngineConfig;
use crate::datasource::{DataSource, QuerySource};
use crate::environment::{Environment, ProcessEnvironment};
use crate::error::{EngineError, EngineResult};
use crate::evaluator::EvalSettings;
use crate::expr::{CompiledExpr, NodeKind};
use crate::functions::{FunctionRegistry, UserFunction};
use crate::compile::Compiler;
use crate::optimizer::optimize;
use crate::query::{Query, QueryArena, QueryId};
use crate::registry::DriverRegistry;
use crate::resolver::{resolve, QueryScope};

pub struct EngineContext {
    config: EngineConfig,
    settings: EvalSettings,
    functions: FunctionRegistry,
    environment: Box<dyn Environment>,
    datasources: FxHashMap<String, DataSource>,
    queries: QueryArena,
}

impl Default for EngineContext {
    fn default() -> Self {
        EngineContext::new(EngineConfig::default())
    }
}

impl EngineContext {
    pub fn new(config: EngineConfig) -> Self {
        EngineContext {
            settings: EvalSettings::from_config(&config),
            config,
            functions: FunctionRegistry::new(),
            environment: Box::new(ProcessEnvironment),
            datasources: FxHashMap::default(),
            queries: QueryArena::new(),
        }
    }

    // ========================================
    // SETTINGS
    // ========================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replaces the numeric and locale settings. Expressions compiled
    /// before keep the literal values they were compiled with.
    pub fn set_config(&mut self, config: EngineConfig) {
        self.settings = EvalSettings::from_config(&config);
        self.config = config;
    }

    pub fn settings(&self) -> &EvalSettings {
        &self.settings
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn register_function(&mut self, function: UserFunction) {
        self.functions.register(function);
    }

    pub fn environment(&self) -> &dyn Environment {
        self.environment.as_ref()
    }

    pub fn set_environment(&mut self, environment: Box<dyn Environment>) {
        self.environment = environment;
    }

    pub fn compiler(&self) -> Compiler<'_> {
        Compiler::new(&self.functions, &self.settings.numeric, self.settings.date_order)
    }

    // ========================================
    // DATASOURCES
    // ========================================

    /// Adds a datasource. Adding an existing name succeeds only with the
    /// same driver.
    pub fn add_datasource(&mut self, name: &str, driver: &str) -> EngineResult<()> {
        if let Some(existing) = self.datasources.get(name) {
            if existing.driver_name() == driver {
                return Ok(());
            }
            return Err(EngineError::DatasourceConflict(name.to_string()));
        }
        let source = DataSource::new(name, DriverRegistry::global().create(driver)?)?;
        log::debug!("datasource '{}' added with driver '{}'", name, driver);
        self.datasources.insert(name.to_string(), source);
        Ok(())
    }

    pub fn datasource(&self, name: &str) -> Option<&DataSource> {
        self.datasources.get(name)
    }

    pub fn datasource_mut(&mut self, name: &str) -> Option<&mut DataSource> {
        self.datasources.get_mut(name)
    }

    // ========================================
    // QUERIES
    // ========================================

    pub fn add_query(&mut self, name: &str, datasource: &str, source: QuerySource) -> EngineResult<QueryId> {
        if self.queries.id_of(name).is_some() {
            return Err(EngineError::DuplicateQuery(name.to_string()));
        }
        let ds = self
            .datasources
            .get_mut(datasource)
            .ok_or_else(|| EngineError::UnknownDatasource(datasource.to_string()))?;
        let driver = ds.open_query(name, source)?;
        let mut query = Query::new(name, datasource, driver);
        query.set_default_encoding(ds.encoding());
        self.queries.insert(query)
    }

    pub fn add_query_array(&mut self, name: &str, datasource: &str, table: ArrayTable) -> EngineResult<QueryId> {
        self.add_query(name, datasource, QuerySource::Array(table))
    }

    pub fn remove_query(&mut self, id: QueryId) -> EngineResult<()> {
        self.queries.remove(id).map(|_| ())
    }

    pub fn queries(&self) -> &QueryArena {
        &self.queries
    }

    pub fn queries_mut(&mut self) -> &mut QueryArena {
        &mut self.queries
    }

    pub fn query_id(&self, name: &str) -> Option<QueryId> {
        self.queries.id_of(name)
    }

    pub fn add_follower(&mut self, leader: QueryId, follower: QueryId) -> EngineResult<()> {
        self.queries.add_follower(leader, follower)
    }

    /// Attaches an N:1 follower whose rows are selected by `match_text`.
    /// The expression may only reference query columns.
    pub fn add_follower_n_to_1(&mut self, leader: QueryId, follower: QueryId, match_text: &str) -> EngineResult<()> {
        let mut matcher = self.compiler().compile_str(match_text)?;
        check_match_references(&matcher)?;
        {
            let scope = QueryScope::new(&self.queries).with_default_query(Some(leader));
            for message in resolve(&mut matcher, &scope) {
                log::warn!("N:1 match expression '{}': {}", match_text, message);
            }
        }
        optimize(&mut matcher, &self.settings.numeric, self.settings.date_order);
        self.queries.add_follower_n_to_1(leader, follower, matcher)
    }

    /// A scope over the queries and the environment.
    pub fn query_scope(&self, default_query: Option<QueryId>) -> QueryScope<'_> {
        QueryScope::new(&self.queries)
            .with_environment(self.environment.as_ref())
            .with_default_query(default_query)
    }

    // ========================================
    // NAVIGATION
    // ========================================

    pub fn navigate_start(&mut self, id: QueryId) -> EngineResult<()> {
        self.queries.navigate_start(id)
    }

    pub fn navigate_next(&mut self, id: QueryId) -> EngineResult<bool> {
        self.queries.navigate_next(id, &self.settings)
    }

    /// Splits the context into the parts a report run borrows separately.
    pub fn parts_mut(&mut self) -> (&mut QueryArena, &EvalSettings, &dyn Environment) {
        (&mut self.queries, &self.settings, self.environment.as_ref())
    }
}

fn check_match_references(expr: &CompiledExpr) -> EngineResult<()> {
    let mut rejected = None;
    expr.root().walk(&mut |node| {
        if rejected.is_none()
            && matches!(
                node.kind,
                NodeKind::Environment { .. } | NodeKind::RowVariable { .. } | NodeKind::ReportVariable { .. }
            )
        {
            rejected = Some(node.to_string());
        }
    });
    match rejected {
        Some(reference) => Err(EngineError::InvalidMatchReference(reference)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::MapEnvironment;
    use crate::slot::Slot;
    use crate::value::{ResultValue, ValueKind};

    fn context() -> EngineContext {
        let mut ctx = EngineContext::default();
        ctx.add_datasource("mem", "array").unwrap();
        ctx
    }

    #[test]
    fn test_datasource_conflicts() {
        let mut ctx = context();
        assert!(ctx.add_datasource("mem", "array").is_ok());
        crate::registry::DriverRegistry::global()
            .register("other", std::sync::Arc::new(|| Box::new(crate::array_source::ArrayDriver)));
        assert!(matches!(
            ctx.add_datasource("mem", "other"),
            Err(EngineError::DatasourceConflict(_))
        ));
        assert!(matches!(ctx.add_datasource("x", "nope"), Err(EngineError::UnknownDriver(_))));
    }

    #[test]
    fn test_add_query_checks() {
        let mut ctx = context();
        let table = ArrayTable::from_rows(&[&["a"], &["1"]]);
        ctx.add_query_array("q", "mem", table.clone()).unwrap();
        assert!(matches!(
            ctx.add_query_array("q", "mem", table.clone()),
            Err(EngineError::DuplicateQuery(_))
        ));
        assert!(matches!(
            ctx.add_query_array("r", "missing", table),
            Err(EngineError::UnknownDatasource(_))
        ));
    }

    #[test]
    fn test_match_expression_rejects_variables() {
        let mut ctx = context();
        let a = ctx.add_query_array("a", "mem", ArrayTable::from_rows(&[&["x"], &["1"]])).unwrap();
        let b = ctx.add_query_array("b", "mem", ArrayTable::from_rows(&[&["y"], &["1"]])).unwrap();
        for text in ["a.x = m.HOME", "v.total = b.y", "r.self"] {
            assert!(matches!(
                ctx.add_follower_n_to_1(a, b, text),
                Err(EngineError::InvalidMatchReference(_))
            ));
        }
        assert!(ctx.queries().get(b).unwrap().leader().is_none());
        ctx.add_follower_n_to_1(a, b, "a.x = b.y").unwrap();
        assert_eq!(ctx.queries().get(b).unwrap().leader(), Some(a));
    }

    #[test]
    fn test_navigation_through_context() {
        let mut ctx = context();
        let table = ArrayTable::from_rows(&[&["age"], &["31"], &["28"]]).with_types(&[ValueKind::Number]);
        let q = ctx.add_query_array("people", "mem", table).unwrap();
        ctx.navigate_start(q).unwrap();
        assert!(ctx.navigate_next(q).unwrap());
        let age = ctx.queries().get(q).unwrap().value("age", Slot::Current).cloned();
        assert_eq!(age, Some(ResultValue::from_i64(31)));
    }

    #[test]
    fn test_environment_in_query_scope() {
        let mut ctx = context();
        ctx.set_environment(Box::new(MapEnvironment::new().with("LANG", ResultValue::string("hu"))));
        let mut expr = ctx.compiler().compile_str("m.LANG + '!'").unwrap();
        let scope = ctx.query_scope(None);
        resolve(&mut expr, &scope);
        let env = ctx.settings().env(&scope);
        assert_eq!(expr.evaluate(&env), ResultValue::string("hu!"));
    }
}
