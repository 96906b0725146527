//! FILENAME: engine/src/query.rs
//! PURPOSE: Queries and the arena that owns them, with leader/follower edges.
//! CONTEXT: Queries live in a `QueryArena` and refer to each other by
//! `QueryId`. A query has at most one leader. Its followers are either 1:1
//! (advanced in lock-step) or N:1 (rows selected by a match expression).
//! The follower graph must stay acyclic; every attach checks reachability in
//! both directions before anything is changed.
//!
//! Each column keeps a three-slot ring. Navigation writes candidate rows
//! into the Current slot; the Previous slot only moves when a row is
//! emitted (`commit`), so break detection compares emitted rows.

use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;

use crate::datasource::{ColumnDef, ColumnSetter, QueryDriver};
use crate::encoding::Encoding;
use crate::error::{EngineError, EngineResult};
use crate::expr::CompiledExpr;
use crate::slot::{Slot, ValueRing};
use crate::value::{Coercion, ResultValue, ValueKind};

/// Index of a query in its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(pub usize);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ========================================
// COLUMNS
// ========================================

#[derive(Debug, Clone)]
pub struct QueryColumn {
    pub name: String,
    pub kind: ValueKind,
    pub ring: ValueRing,
    /// The value of the last emitted row.
    committed: ResultValue,
}

impl QueryColumn {
    pub fn new(def: &ColumnDef) -> Self {
        QueryColumn {
            name: def.name.clone(),
            kind: def.kind,
            ring: ValueRing::null(def.kind),
            committed: ResultValue::null(def.kind),
        }
    }

    fn reset(&mut self) {
        self.ring = ValueRing::null(self.kind);
        self.committed = ResultValue::null(self.kind);
    }

    /// Emits the Current value: Previous becomes the last emitted value.
    fn commit(&mut self) {
        commit_ring(&mut self.ring, &mut self.committed);
    }
}

fn commit_ring(ring: &mut ValueRing, committed: &mut ResultValue) {
    let current = ring.get(Slot::Current).clone();
    *ring.get_mut(Slot::Previous) = std::mem::replace(committed, current);
}

// ========================================
// QUERY
// ========================================

/// An N:1 follower and the predicate selecting its rows.
#[derive(Debug)]
pub struct NToOneFollower {
    pub query: QueryId,
    pub matcher: CompiledExpr,
}

/// Navigation state of a query.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct NavState {
    /// The current leader row still has N:1 combinations to try.
    pub combining: bool,
}

pub struct Query {
    name: String,
    datasource: String,
    driver: Box<dyn QueryDriver>,
    encoding: Option<Encoding>,
    columns: Vec<QueryColumn>,
    column_index: FxHashMap<String, usize>,
    rownum: ValueRing,
    rownum_committed: ResultValue,
    /// Rows read from the driver since the last rewind.
    row: i64,
    leader: Option<QueryId>,
    followers: Vec<QueryId>,
    pub(crate) n_to_1: Vec<NToOneFollower>,
    pub(crate) nav: NavState,
}

impl Query {
    pub fn new(name: &str, datasource: &str, driver: Box<dyn QueryDriver>) -> Self {
        let columns: Vec<QueryColumn> = driver.describe().iter().map(QueryColumn::new).collect();
        let mut column_index = FxHashMap::default();
        for (i, column) in columns.iter().enumerate() {
            // First column wins on duplicate names
            column_index.entry(column.name.clone()).or_insert(i);
        }
        Query {
            name: name.to_string(),
            datasource: datasource.to_string(),
            driver,
            encoding: None,
            columns,
            column_index,
            rownum: ValueRing::null(ValueKind::Number),
            rownum_committed: ResultValue::null(ValueKind::Number),
            row: 0,
            leader: None,
            followers: Vec::new(),
            n_to_1: Vec::new(),
            nav: NavState::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datasource(&self) -> &str {
        &self.datasource
    }

    pub fn columns(&self) -> &[QueryColumn] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_index.get(name).copied()
    }

    pub fn column(&self, index: usize) -> Option<&QueryColumn> {
        self.columns.get(index)
    }

    /// The value of a column by name in `slot`.
    pub fn value(&self, name: &str, slot: Slot) -> Option<&ResultValue> {
        self.column_index(name)
            .and_then(|i| self.columns.get(i))
            .map(|c| c.ring.get(slot))
    }

    pub fn rownum(&self) -> &ValueRing {
        &self.rownum
    }

    /// 1-based number of the current driver row; 0 before the first row.
    pub fn current_row(&self) -> i64 {
        self.row
    }

    pub fn is_done(&self) -> bool {
        self.driver.is_done()
    }

    pub fn leader(&self) -> Option<QueryId> {
        self.leader
    }

    pub fn followers(&self) -> &[QueryId] {
        &self.followers
    }

    pub fn n_to_1_followers(&self) -> impl Iterator<Item = QueryId> + '_ {
        self.n_to_1.iter().map(|f| f.query)
    }

    pub fn set_encoding(&mut self, encoding: Option<&str>) -> EngineResult<()> {
        self.encoding = encoding.map(Encoding::from_name).transpose()?;
        Ok(())
    }

    pub(crate) fn set_default_encoding(&mut self, encoding: Option<Encoding>) {
        if self.encoding.is_none() {
            self.encoding = encoding;
        }
    }

    /// Direct followers of both kinds.
    pub(crate) fn children(&self) -> Vec<QueryId> {
        self.followers
            .iter()
            .copied()
            .chain(self.n_to_1_followers())
            .collect()
    }

    // ========================================
    // CURSOR
    // ========================================

    pub(crate) fn rewind(&mut self) {
        self.driver.rewind();
        self.row = 0;
        self.nav = NavState::default();
        for column in self.columns.iter_mut() {
            column.reset();
        }
        self.rownum = ValueRing::null(ValueKind::Number);
        self.rownum_committed = ResultValue::null(ValueKind::Number);
    }

    /// Reads the next driver row into the Current slots.
    pub(crate) fn advance(&mut self, coercion: &Coercion<'_>) -> bool {
        let advanced = self.driver.next();
        if advanced {
            self.row += 1;
            *self.rownum.get_mut(Slot::Current) = ResultValue::from_i64(self.row);
        }
        let mut setter = ColumnSetter::new(&mut self.columns, *coercion, self.encoding);
        self.driver.populate_result(&mut setter);
        advanced
    }

    /// NULLs the Current row, used when no follower row matches.
    pub(crate) fn blank(&mut self) {
        for column in self.columns.iter_mut() {
            *column.ring.get_mut(Slot::Current) = ResultValue::null(column.kind);
        }
    }

    pub(crate) fn commit(&mut self) {
        for column in self.columns.iter_mut() {
            column.commit();
        }
        commit_ring(&mut self.rownum, &mut self.rownum_committed);
    }

    fn close(&mut self) {
        self.driver.free();
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("name", &self.name)
            .field("datasource", &self.datasource)
            .field("columns", &self.columns.len())
            .field("row", &self.row)
            .field("leader", &self.leader)
            .field("followers", &self.followers)
            .field("n_to_1", &self.n_to_1.len())
            .finish()
    }
}

// ========================================
// ARENA
// ========================================

/// Owns the queries of one report context.
#[derive(Debug, Default)]
pub struct QueryArena {
    queries: Vec<Option<Query>>,
    names: FxHashMap<String, QueryId>,
    /// Each query followed by all of its transitive followers.
    families: FxHashMap<QueryId, Vec<QueryId>>,
    dirty: bool,
}

impl QueryArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, query: Query) -> EngineResult<QueryId> {
        if self.names.contains_key(query.name()) {
            return Err(EngineError::DuplicateQuery(query.name().to_string()));
        }
        let id = QueryId(self.queries.len());
        log::debug!("query '{}' added as {}", query.name(), id);
        self.names.insert(query.name().to_string(), id);
        self.queries.push(Some(query));
        self.dirty = true;
        Ok(id)
    }

    pub fn get(&self, id: QueryId) -> Option<&Query> {
        self.queries.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: QueryId) -> Option<&mut Query> {
        self.queries.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn require(&self, id: QueryId) -> EngineResult<&Query> {
        self.get(id).ok_or(EngineError::UnknownQuery(id))
    }

    pub(crate) fn require_mut(&mut self, id: QueryId) -> EngineResult<&mut Query> {
        self.get_mut(id).ok_or(EngineError::UnknownQuery(id))
    }

    pub fn id_of(&self, name: &str) -> Option<QueryId> {
        self.names.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&Query> {
        self.id_of(name).and_then(|id| self.get(id))
    }

    /// Live queries in creation order.
    pub fn ids(&self) -> impl Iterator<Item = QueryId> + '_ {
        self.queries
            .iter()
            .enumerate()
            .filter(|(_, q)| q.is_some())
            .map(|(i, _)| QueryId(i))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    // ========================================
    // FOLLOWERS
    // ========================================

    /// Whether `to` is reachable from `from` along follower edges.
    pub fn reaches(&self, from: QueryId, to: QueryId) -> bool {
        let mut seen = FxHashSet::default();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(query) = self.get(id) {
                stack.extend(query.children());
            }
        }
        false
    }

    /// Validates a new leader -> follower edge without changing anything.
    fn check_follower(&self, leader: QueryId, follower: QueryId) -> EngineResult<()> {
        let leader_query = self.require(leader)?;
        let follower_query = self.require(follower)?;
        if leader == follower {
            return Err(EngineError::SelfFollower);
        }
        if follower_query.leader.is_some() {
            return Err(EngineError::AlreadyFollowing(follower_query.name.clone()));
        }
        if self.reaches(follower, leader) || self.reaches(leader, follower) {
            return Err(EngineError::FollowerCycle {
                leader: leader_query.name.clone(),
                follower: follower_query.name.clone(),
            });
        }
        Ok(())
    }

    /// Attaches a 1:1 follower.
    pub fn add_follower(&mut self, leader: QueryId, follower: QueryId) -> EngineResult<()> {
        if let Err(e) = self.check_follower(leader, follower) {
            log::warn!("rejected follower edge {} -> {}: {}", leader, follower, e);
            return Err(e);
        }
        self.require_mut(leader)?.followers.push(follower);
        self.require_mut(follower)?.leader = Some(leader);
        self.dirty = true;
        Ok(())
    }

    /// Attaches an N:1 follower with its resolved match expression.
    pub fn add_follower_n_to_1(
        &mut self,
        leader: QueryId,
        follower: QueryId,
        matcher: CompiledExpr,
    ) -> EngineResult<()> {
        if let Err(e) = self.check_follower(leader, follower) {
            log::warn!("rejected N:1 follower edge {} -> {}: {}", leader, follower, e);
            return Err(e);
        }
        self.require_mut(leader)?.n_to_1.push(NToOneFollower {
            query: follower,
            matcher,
        });
        self.require_mut(follower)?.leader = Some(leader);
        self.dirty = true;
        Ok(())
    }

    /// Removes a query, detaching it from its leader and its followers.
    pub fn remove(&mut self, id: QueryId) -> EngineResult<Query> {
        let mut query = self
            .queries
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(EngineError::UnknownQuery(id))?;
        self.names.remove(query.name());

        for other in self.queries.iter_mut().flatten() {
            other.followers.retain(|f| *f != id);
            other.n_to_1.retain(|f| f.query != id);
            if other.leader == Some(id) {
                other.leader = None;
            }
        }
        query.close();
        self.dirty = true;
        log::debug!("query '{}' removed", query.name());
        Ok(query)
    }

    // ========================================
    // FINALIZE
    // ========================================

    /// Recomputes the flattened follower families if any edge changed.
    pub fn finalize(&mut self) {
        if !self.dirty {
            return;
        }
        let ids: Vec<QueryId> = self.ids().collect();
        self.families = ids
            .into_iter()
            .map(|id| (id, self.collect_family(id)))
            .collect();
        self.dirty = false;
    }

    fn collect_family(&self, root: QueryId) -> Vec<QueryId> {
        let mut family = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if family.contains(&id) {
                continue;
            }
            family.push(id);
            if let Some(query) = self.get(id) {
                // Reverse so the first follower is visited first
                stack.extend(query.children().into_iter().rev());
            }
        }
        family
    }

    /// `id` followed by all of its transitive followers.
    pub fn family(&self, id: QueryId) -> Vec<QueryId> {
        match self.families.get(&id) {
            Some(family) if !self.dirty => family.clone(),
            _ => self.collect_family(id),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl Drop for QueryArena {
    fn drop(&mut self) {
        for query in self.queries.iter_mut().flatten() {
            query.close();
        }
    }
}
