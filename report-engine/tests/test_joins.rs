//! FILENAME: tests/test_joins.rs
//! Integration tests for reports over followed queries.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{column, table, TestHarness, TripsFixture};
use engine::ValueKind;
use report_engine::{BreakDef, VariableDef, VariableKind};

#[test]
fn test_n_to_1_rows_repeat_the_leader() {
    let mut harness = TripsFixture::harness();
    harness.expressions(&["name + ' ' + city", "rownum()"]);
    let rows = harness.record();

    let summary = harness.run();
    assert_eq!(summary.rows, 4);
    // Cid has no trips and shows once with a null city
    assert_eq!(column(&rows, 0), vec!["Ann Oslo", "Ann Bergen", "Bob Rome", ""]);
    assert_eq!(column(&rows, 1), vec!["1", "1", "2", "3"]);
}

#[test]
fn test_break_on_repeated_leader() {
    let mut harness = TripsFixture::harness();
    let id = harness.report;
    harness.doc.new_break(id, &BreakDef::new("person", &["people.name"])).unwrap();
    let trips = VariableDef::new("trips", VariableKind::Count, Some("city")).reset_on("person");
    harness.doc.new_variable(id, &trips).unwrap();
    harness.expressions(&["v.trips"]);
    let rows = harness.record();

    let fired = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&fired);
    harness.report_mut().on_break(move |view, _| sink.borrow_mut().push(view.row()));

    harness.run();
    assert_eq!(*fired.borrow(), vec![3, 4]);
    assert_eq!(column(&rows, 0), vec!["1", "2", "1", "0"]);
}

#[test]
fn test_one_to_one_follower_runs_out() {
    let people = table(&[&["name"], &["Ann"], &["Bob"], &["Cid"]], &[ValueKind::String]);
    let scores = table(&[&["score"], &["10"], &["20"]], &[ValueKind::Number]);
    let mut harness = TestHarness::new(vec![("people", people), ("scores", scores)]);
    harness.doc.add_follower("people", "scores").unwrap();
    harness.expressions(&["name", "scores.score", "isnull(score)"]);
    let rows = harness.record();

    harness.run();
    assert_eq!(column(&rows, 0), vec!["Ann", "Bob", "Cid"]);
    assert_eq!(column(&rows, 1), vec!["10", "20", ""]);
    assert_eq!(column(&rows, 2), vec!["0", "0", "1"]);
}

#[test]
fn test_view_reads_columns_of_followers() {
    let mut harness = TripsFixture::harness();
    let cities = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&cities);
    harness.report_mut().on_row(move |view| {
        let city = view.column(Some("trips"), "city").map(|v| v.to_string());
        sink.borrow_mut().push(city.unwrap_or_default());
    });

    harness.run();
    assert_eq!(*cities.borrow(), vec!["Oslo", "Bergen", "Rome", ""]);
}
