//! FILENAME: tests/common/mod.rs
//! Test harness and fixtures for report-engine integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use engine::{ArrayTable, ValueKind};
use report_engine::{Report, ReportDocument, ReportId, RunSummary};

/// Values recorded by a row callback, one entry per rendered row.
pub type Rows = Rc<RefCell<Vec<Vec<String>>>>;

/// A document with an array datasource and one report.
pub struct TestHarness {
    pub doc: ReportDocument,
    pub report: ReportId,
}

impl TestHarness {
    /// Creates the document with `tables` as queries, in order. The first
    /// one is the main query of the report.
    pub fn new(tables: Vec<(&str, ArrayTable)>) -> Self {
        let mut doc = ReportDocument::default();
        doc.engine_mut().add_datasource("array", "array").unwrap();
        for (name, table) in tables {
            doc.engine_mut().add_query_array(name, "array", table).unwrap();
        }
        let report = doc.append_report(None, Report::named("test")).unwrap();
        TestHarness { doc, report }
    }

    pub fn report_mut(&mut self) -> &mut Report {
        self.doc.report_mut(self.report).unwrap()
    }

    /// Adds named expressions; their values are what `record` collects.
    pub fn expressions(&mut self, texts: &[&str]) {
        for text in texts {
            self.doc.add_expression(self.report, Some(text), text).unwrap();
        }
    }

    /// Records the value of every named expression on every row.
    pub fn record(&mut self) -> Rows {
        let rows: Rows = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&rows);
        self.report_mut().on_row(move |view| {
            let values = view
                .report()
                .expressions()
                .iter()
                .map(|e| {
                    e.name
                        .as_deref()
                        .and_then(|name| view.expression(name))
                        .map(|v| v.to_string())
                        .unwrap_or_default()
                })
                .collect();
            sink.borrow_mut().push(values);
        });
        rows
    }

    pub fn run(&mut self) -> RunSummary {
        self.doc.execute_report(self.report).unwrap()
    }
}

/// One recorded expression across all rows.
pub fn column(rows: &Rows, index: usize) -> Vec<String> {
    rows.borrow().iter().map(|row| row[index].clone()).collect()
}

/// Builds a table from string rows; the first row is the header.
pub fn table(rows: &[&[&str]], types: &[ValueKind]) -> ArrayTable {
    ArrayTable::from_rows(rows).with_types(types)
}

/// People grouped by age bracket: adult, adult, child, child, child.
pub struct PeopleFixture;

impl PeopleFixture {
    pub fn table() -> ArrayTable {
        table(
            &[
                &["name", "age", "age_bracket"],
                &["Fred", "31", "adult"],
                &["Mary", "28", "adult"],
                &["Tot", "5", "child"],
                &["Bob", "27", "child"],
                &["Sue", "29", "child"],
            ],
            &[ValueKind::String, ValueKind::Number, ValueKind::String],
        )
    }

    pub fn harness() -> TestHarness {
        TestHarness::new(vec![("people", Self::table())])
    }
}

/// Two groups of numbers: a = [1, 2], b = [3, 4].
pub struct GroupsFixture;

impl GroupsFixture {
    pub fn table() -> ArrayTable {
        table(
            &[&["g", "n"], &["a", "1"], &["a", "2"], &["b", "3"], &["b", "4"]],
            &[ValueKind::String, ValueKind::Number],
        )
    }

    pub fn harness() -> TestHarness {
        TestHarness::new(vec![("groups", Self::table())])
    }
}

/// People and their trips, for N:1 joins.
pub struct TripsFixture;

impl TripsFixture {
    pub fn harness() -> TestHarness {
        let people = table(&[&["name"], &["Ann"], &["Bob"], &["Cid"]], &[ValueKind::String]);
        let trips = table(
            &[
                &["person", "city"],
                &["Ann", "Oslo"],
                &["Bob", "Rome"],
                &["Ann", "Bergen"],
            ],
            &[ValueKind::String, ValueKind::String],
        );
        let mut harness = TestHarness::new(vec![("people", people), ("trips", trips)]);
        harness
            .doc
            .add_follower_n_to_1("people", "trips", "people.name = trips.person")
            .unwrap();
        harness.doc.set_main_query(harness.report, "people").unwrap();
        harness
    }
}
