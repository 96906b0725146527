//! FILENAME: engine/src/navigation.rs
//! PURPOSE: Row navigation over a query and its followers.
//! CONTEXT: `navigate_next` on a leading query produces one combined row:
//!
//! - 1:1 followers advance in lock-step with their leader. A follower that
//!   runs out of rows before its leader shows NULL columns.
//! - N:1 followers are searched like an odometer, the first follower turning
//!   fastest: every combination of follower rows for which all match
//!   expressions are true is produced, with the leader row repeated. A
//!   leader row with no matching combination is still produced once, with
//!   the N:1 follower columns NULL.
//!
//! Followers can have followers of their own; a follower's "next row" is
//! its own combined row, so nesting composes.
//!
//! Candidate rows are written into the Current slots. Once a combined row is
//! produced, every query of the family commits it, moving the last produced
//! values into the Previous slots.

use crate::error::EngineResult;
use crate::evaluator::EvalSettings;
use crate::query::{QueryArena, QueryId};
use crate::resolver::QueryScope;

impl QueryArena {
    /// Moves `id` and all of its followers before their first row.
    pub fn navigate_start(&mut self, id: QueryId) -> EngineResult<()> {
        self.finalize();
        self.require(id)?;
        log::debug!("navigation started on {}", id);
        self.rewind_family(id);
        Ok(())
    }

    /// Produces the next combined row. Returns false after the last row.
    pub fn navigate_next(&mut self, id: QueryId, settings: &EvalSettings) -> EngineResult<bool> {
        self.require(id)?;
        let produced = self.step(id, settings);
        if produced {
            for member in self.family(id) {
                if let Some(query) = self.get_mut(member) {
                    query.commit();
                }
            }
        }
        Ok(produced)
    }

    /// 1-based number of the leader's current driver row.
    pub fn current_row(&self, id: QueryId) -> Option<i64> {
        self.get(id).map(|q| q.current_row())
    }

    fn rewind_family(&mut self, id: QueryId) {
        let children = match self.get_mut(id) {
            Some(query) => {
                query.rewind();
                query.children()
            }
            None => return,
        };
        for child in children {
            self.rewind_family(child);
        }
    }

    fn blank_family(&mut self, id: QueryId) {
        for member in self.family(id) {
            if let Some(query) = self.get_mut(member) {
                query.blank();
            }
        }
    }

    /// Advances `id` to its next combined row.
    fn step(&mut self, id: QueryId, settings: &EvalSettings) -> bool {
        let combining = self.get(id).map(|q| q.nav.combining).unwrap_or(false);
        if combining {
            if self.next_combination(id, settings) {
                return true;
            }
            if let Some(query) = self.get_mut(id) {
                query.nav.combining = false;
            }
        }

        let coercion = settings.coercion();
        let (advanced, followers, n_to_1) = match self.get_mut(id) {
            Some(query) => {
                let advanced = query.advance(&coercion);
                let n_to_1: Vec<QueryId> = query.n_to_1_followers().collect();
                (advanced, query.followers().to_vec(), n_to_1)
            }
            None => return false,
        };
        if !advanced {
            for child in followers.iter().chain(n_to_1.iter()) {
                self.blank_family(*child);
            }
            return false;
        }

        for follower in followers {
            if !self.step(follower, settings) {
                log::debug!("1:1 follower {} of {} ran out of rows", follower, id);
            }
        }

        if n_to_1.is_empty() {
            return true;
        }

        let mut all_have_rows = true;
        for follower in &n_to_1 {
            self.rewind_family(*follower);
            all_have_rows &= self.step(*follower, settings);
        }

        let matched = all_have_rows && self.find_match(id, settings);
        if matched {
            if let Some(query) = self.get_mut(id) {
                query.nav.combining = true;
            }
        } else {
            for follower in &n_to_1 {
                self.blank_family(*follower);
            }
        }
        true
    }

    /// Moves on from the current combination to the next matching one.
    fn next_combination(&mut self, id: QueryId, settings: &EvalSettings) -> bool {
        self.advance_odometer(id, settings) && self.find_match(id, settings)
    }

    /// Searches forward from the current combination, inclusive.
    fn find_match(&mut self, id: QueryId, settings: &EvalSettings) -> bool {
        loop {
            if self.matches(id, settings) {
                return true;
            }
            if !self.advance_odometer(id, settings) {
                return false;
            }
        }
    }

    /// Steps the N:1 followers to the next combination. The first follower
    /// turns fastest; a follower that runs out starts over and carries into
    /// the next one. False once the last follower runs out.
    fn advance_odometer(&mut self, id: QueryId, settings: &EvalSettings) -> bool {
        let n_to_1: Vec<QueryId> = match self.get(id) {
            Some(query) => query.n_to_1_followers().collect(),
            None => return false,
        };
        for follower in n_to_1 {
            if self.step(follower, settings) {
                return true;
            }
            self.rewind_family(follower);
            self.step(follower, settings);
        }
        false
    }

    /// Whether every N:1 match expression of `id` holds for the current rows.
    fn matches(&mut self, id: QueryId, settings: &EvalSettings) -> bool {
        let mut followers = match self.get_mut(id) {
            Some(query) => std::mem::take(&mut query.n_to_1),
            None => return false,
        };

        let mut matched = true;
        {
            let scope = QueryScope::new(self).with_default_query(Some(id));
            let env = settings.env(&scope);
            for follower in followers.iter_mut() {
                let result = follower.matcher.evaluate(&env);
                if result.is_null() || !result.is_true() {
                    matched = false;
                    break;
                }
            }
        }

        if let Some(query) = self.get_mut(id) {
            query.n_to_1 = followers;
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array_source::{ArrayCursor, ArrayTable};
    use crate::compile::compile_str;
    use crate::functions::FunctionRegistry;
    use crate::query::Query;
    use crate::resolver::resolve;
    use crate::slot::Slot;
    use crate::value::ValueKind;

    fn add(arena: &mut QueryArena, name: &str, rows: &[&[&str]], types: &[ValueKind]) -> QueryId {
        let table = ArrayTable::from_rows(rows).with_types(types);
        arena
            .insert(Query::new(name, "array", Box::new(ArrayCursor::new(table))))
            .unwrap()
    }

    fn attach_n_to_1(arena: &mut QueryArena, settings: &EvalSettings, leader: QueryId, follower: QueryId, text: &str) {
        let mut matcher =
            compile_str(text, &FunctionRegistry::new(), &settings.numeric, settings.date_order).unwrap();
        assert!(resolve(&mut matcher, &QueryScope::new(arena)).is_empty());
        arena.add_follower_n_to_1(leader, follower, matcher).unwrap();
    }

    /// Every produced row as the text of the named columns.
    fn collect(arena: &mut QueryArena, settings: &EvalSettings, id: QueryId, columns: &[(&str, &str)]) -> Vec<String> {
        arena.navigate_start(id).unwrap();
        let mut rows = Vec::new();
        while arena.navigate_next(id, settings).unwrap() {
            let row: Vec<String> = columns
                .iter()
                .map(|(query, column)| {
                    arena
                        .by_name(query)
                        .and_then(|q| q.value(column, Slot::Current))
                        .map(|v| if v.is_null() { "-".to_string() } else { v.to_string() })
                        .unwrap_or_default()
                })
                .collect();
            rows.push(row.join(" "));
        }
        rows
    }

    #[test]
    fn test_single_query_rows_and_rownum() {
        let settings = EvalSettings::default();
        let mut arena = QueryArena::new();
        let q = add(&mut arena, "q", &[&["n"], &["a"], &["b"], &["c"]], &[]);

        arena.navigate_start(q).unwrap();
        let mut rownums = Vec::new();
        while arena.navigate_next(q, &settings).unwrap() {
            rownums.push(arena.get(q).unwrap().rownum().get(Slot::Current).to_string());
        }
        assert_eq!(rownums, vec!["1", "2", "3"]);
        assert!(!arena.navigate_next(q, &settings).unwrap());
        assert_eq!(arena.current_row(q), Some(3));
    }

    #[test]
    fn test_previous_slot_tracks_emitted_rows() {
        let settings = EvalSettings::default();
        let mut arena = QueryArena::new();
        let q = add(&mut arena, "q", &[&["n"], &["1"], &["2"]], &[ValueKind::Number]);

        arena.navigate_start(q).unwrap();
        arena.navigate_next(q, &settings).unwrap();
        assert!(arena.get(q).unwrap().value("n", Slot::Previous).unwrap().is_null());
        arena.navigate_next(q, &settings).unwrap();
        let query = arena.get(q).unwrap();
        assert_eq!(query.value("n", Slot::Current).unwrap().to_string(), "2");
        assert_eq!(query.value("n", Slot::Previous).unwrap().to_string(), "1");
    }

    #[test]
    fn test_one_to_one_lock_step() {
        let settings = EvalSettings::default();
        let mut arena = QueryArena::new();
        let a = add(&mut arena, "a", &[&["x"], &["1"], &["2"], &["3"]], &[]);
        let b = add(&mut arena, "b", &[&["y"], &["p"], &["q"]], &[]);
        arena.add_follower(a, b).unwrap();

        let rows = collect(&mut arena, &settings, a, &[("a", "x"), ("b", "y")]);
        assert_eq!(rows, vec!["1 p", "2 q", "3 -"]);
    }

    #[test]
    fn test_n_to_1_matches_and_unmatched_leader_rows() {
        let settings = EvalSettings::default();
        let mut arena = QueryArena::new();
        let people = add(
            &mut arena,
            "people",
            &[&["name", "city"], &["Ann", "1"], &["Bob", "2"], &["Cid", "9"]],
            &[ValueKind::String, ValueKind::Number],
        );
        let cities = add(
            &mut arena,
            "cities",
            &[&["id", "city_name"], &["1", "Oslo"], &["2", "Rome"], &["1", "Bergen"]],
            &[ValueKind::Number, ValueKind::String],
        );
        attach_n_to_1(&mut arena, &settings, people, cities, "people.city = cities.id");

        let rows = collect(&mut arena, &settings, people, &[("people", "name"), ("cities", "city_name")]);
        assert_eq!(rows, vec!["Ann Oslo", "Ann Bergen", "Bob Rome", "Cid -"]);
    }

    #[test]
    fn test_two_n_to_1_followers_odometer() {
        let settings = EvalSettings::default();
        let mut arena = QueryArena::new();
        let lead = add(&mut arena, "lead", &[&["k"], &["1"]], &[ValueKind::Number]);
        let f1 = add(&mut arena, "f1", &[&["a"], &["x"], &["y"]], &[]);
        let f2 = add(&mut arena, "f2", &[&["b"], &["u"], &["v"]], &[]);
        attach_n_to_1(&mut arena, &settings, lead, f1, "1");
        attach_n_to_1(&mut arena, &settings, lead, f2, "lead.k = 1");

        let rows = collect(&mut arena, &settings, lead, &[("f1", "a"), ("f2", "b")]);
        assert_eq!(rows, vec!["x u", "y u", "x v", "y v"]);
    }

    #[test]
    fn test_empty_n_to_1_follower() {
        let settings = EvalSettings::default();
        let mut arena = QueryArena::new();
        let lead = add(&mut arena, "lead", &[&["k"], &["1"], &["2"]], &[]);
        let empty = add(&mut arena, "empty", &[&["e"]], &[]);
        attach_n_to_1(&mut arena, &settings, lead, empty, "1");

        let rows = collect(&mut arena, &settings, lead, &[("lead", "k"), ("empty", "e")]);
        assert_eq!(rows, vec!["1 -", "2 -"]);
    }
}
