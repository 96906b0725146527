//! FILENAME: tests/test_breaks_and_variables.rs
//! Integration tests for break detection, variable accumulation and the
//! precalculation pass.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{column, GroupsFixture, PeopleFixture};
use report_engine::{BreakDef, ReportError, VariableDef, VariableKind};

// ============================================================================
// BREAKS
// ============================================================================

#[test]
fn test_break_fires_before_third_row_only() {
    let mut harness = PeopleFixture::harness();
    let id = harness.report;
    harness.doc.new_break(id, &BreakDef::new("bracket", &["age_bracket"])).unwrap();

    let fired = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&fired);
    harness.report_mut().on_break(move |view, name| {
        sink.borrow_mut().push((view.row(), name.to_string()));
    });

    let summary = harness.run();
    assert_eq!(summary.rows, 5);
    assert_eq!(summary.triggers, 1);
    // The row counter already points at the row that triggered
    assert_eq!(*fired.borrow(), vec![(3, "bracket".to_string())]);
}

#[test]
fn test_break_row_numbers() {
    let mut harness = PeopleFixture::harness();
    let id = harness.report;
    harness.doc.new_break(id, &BreakDef::new("bracket", &["age_bracket"])).unwrap();
    harness.expressions(&["brrownum('bracket')", "brrownum('nope')"]);
    let rows = harness.record();

    harness.run();
    assert_eq!(column(&rows, 0), vec!["1", "2", "1", "2", "3"]);
    assert!(column(&rows, 1).iter().all(|v| v == "brrownum(): no such break"));
}

#[test]
fn test_nested_breaks_fire_together() {
    let mut harness = PeopleFixture::harness();
    let id = harness.report;
    harness.doc.new_break(id, &BreakDef::new("bracket", &["age_bracket"])).unwrap();
    harness.doc.new_break(id, &BreakDef::new("decade", &["floor(age / 10)"])).unwrap();

    let fired = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&fired);
    harness.report_mut().on_break(move |view, name| {
        sink.borrow_mut().push(format!("{}:{}", view.row(), name));
    });

    let summary = harness.run();
    // Ages 31, 28, 5, 27, 29: the decade changes on rows 2 and 4, the
    // bracket on row 3 and takes the decade with it.
    assert_eq!(
        *fired.borrow(),
        vec!["2:decade", "3:bracket", "3:decade", "4:decade"]
    );
    assert_eq!(summary.triggers, 4);
}

#[test]
fn test_fieldless_break_fails_the_run() {
    let mut harness = PeopleFixture::harness();
    let id = harness.report;
    harness.doc.new_break(id, &BreakDef::new("empty", &[])).unwrap();
    harness.expressions(&["name"]);

    match harness.doc.execute_report(id) {
        Err(ReportError::UselessBreak(name)) => assert_eq!(name, "empty"),
        other => panic!("expected a useless break error, got {:?}", other),
    }

    harness.doc.add_breakfield(id, "empty", "age_bracket").unwrap();
    assert_eq!(harness.run().triggers, 1);
}

#[test]
fn test_unresolvable_breaks_are_dropped() {
    let mut harness = PeopleFixture::harness();
    let id = harness.report;
    harness.doc.new_break(id, &BreakDef::new("unknown", &["no_such_column"])).unwrap();
    harness.expressions(&["brrownum('unknown')"]);
    let rows = harness.record();

    let summary = harness.run();
    assert_eq!(summary.triggers, 0);
    assert!(harness.doc.report(id).unwrap().breaks().is_empty());
    assert!(column(&rows, 0).iter().all(|v| v == "brrownum(): no such break"));
}

#[test]
fn test_break_attributes_are_visible_to_callbacks() {
    let mut harness = PeopleFixture::harness();
    let id = harness.report;
    let def = BreakDef {
        newpage: Some("1".to_string()),
        ..BreakDef::new("bracket", &["age_bracket"])
    };
    harness.doc.new_break(id, &def).unwrap();

    let pages = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&pages);
    harness.report_mut().on_break(move |view, name| {
        let attributes = view.break_attributes(name).unwrap_or_default();
        sink.borrow_mut().push(attributes.newpage);
    });
    harness.run();
    assert_eq!(*pages.borrow(), vec![true]);
}

// ============================================================================
// VARIABLES
// ============================================================================

#[test]
fn test_sum_resets_on_break() {
    let mut harness = GroupsFixture::harness();
    let id = harness.report;
    harness.doc.new_break(id, &BreakDef::new("group", &["g"])).unwrap();
    let total = VariableDef::new("total", VariableKind::Sum, Some("n")).reset_on("group");
    harness.doc.new_variable(id, &total).unwrap();
    harness.expressions(&["v.total"]);
    let rows = harness.record();

    harness.run();
    assert_eq!(column(&rows, 0), vec!["1", "3", "3", "7"]);
}

#[test]
fn test_running_aggregates() {
    let mut harness = PeopleFixture::harness();
    let id = harness.report;
    let defs = [
        VariableDef::new("lowest", VariableKind::Lowest, Some("age")),
        VariableDef::new("count", VariableKind::Count, None),
        VariableDef::new("average", VariableKind::Average, Some("age")),
        VariableDef::new("first_name", VariableKind::Lowest, Some("name")),
    ];
    for def in &defs {
        harness.doc.new_variable(id, def).unwrap();
    }
    harness.expressions(&["v.lowest", "v.count", "v.average", "v.first_name"]);
    let rows = harness.record();

    harness.run();
    assert_eq!(column(&rows, 0), vec!["31", "28", "5", "5", "5"]);
    assert_eq!(column(&rows, 1), vec!["1", "2", "3", "4", "5"]);
    assert_eq!(column(&rows, 2)[1], "29.5");
    assert_eq!(column(&rows, 2)[4], "24");
    assert_eq!(column(&rows, 3), vec!["Fred", "Fred", "Fred", "Bob", "Bob"]);
}

#[test]
fn test_aggregate_over_expression_variable() {
    let mut harness = GroupsFixture::harness();
    let id = harness.report;
    let doubled = VariableDef::new("doubled", VariableKind::Expression, Some("n * 2"));
    let total = VariableDef::new("total", VariableKind::Sum, Some("v.doubled"));
    harness.doc.new_variable(id, &doubled).unwrap();
    harness.doc.new_variable(id, &total).unwrap();
    harness.expressions(&["v.doubled", "v.total"]);
    let rows = harness.record();

    harness.run();
    assert_eq!(column(&rows, 0), vec!["2", "4", "6", "8"]);
    assert_eq!(column(&rows, 1), vec!["2", "6", "12", "20"]);
}

#[test]
fn test_custom_running_average() {
    let mut harness = GroupsFixture::harness();
    let id = harness.report;
    let average = VariableDef::custom(
        "average",
        Some("n * 2"),
        Some("rownum()"),
        None,
        "iif(r.intermedexpr = 1, r.baseexpr, (r.self * (r.intermedexpr - 1) + r.baseexpr) / r.intermedexpr)",
    );
    harness.doc.new_variable(id, &average).unwrap();
    harness.expressions(&["v.average"]);
    let rows = harness.record();

    harness.run();
    // Running average of 2, 4, 6, 8
    assert_eq!(column(&rows, 0), vec!["2", "3", "4", "5"]);
}

#[test]
fn test_custom_variable_restarts_on_break() {
    let mut harness = GroupsFixture::harness();
    let id = harness.report;
    harness.doc.new_break(id, &BreakDef::new("group", &["g"])).unwrap();
    let product = VariableDef::custom("product", Some("n"), None, None, "iif(isnull(r.self), 1, r.self) * r.baseexpr")
        .reset_on("group");
    harness.doc.new_variable(id, &product).unwrap();
    harness.expressions(&["v.product"]);
    let rows = harness.record();

    harness.run();
    assert_eq!(column(&rows, 0), vec!["1", "2", "3", "12"]);
}

#[test]
fn test_variable_with_unknown_reset_break_is_dropped() {
    let mut harness = GroupsFixture::harness();
    let id = harness.report;
    let total = VariableDef::new("total", VariableKind::Sum, Some("n")).reset_on("nope");
    harness.doc.new_variable(id, &total).unwrap();
    harness.expressions(&["v.total"]);
    let rows = harness.record();

    harness.run();
    assert!(harness.doc.report(id).unwrap().variables().is_empty());
    assert!(column(&rows, 0).iter().all(|v| v == "invalid identifier 'v.total'"));
}

// ============================================================================
// PRECALCULATION
// ============================================================================

#[test]
fn test_precalculated_highest_is_final_on_every_row() {
    let mut harness = PeopleFixture::harness();
    let id = harness.report;
    let oldest = VariableDef::new("oldest", VariableKind::Highest, Some("age")).precalculated();
    harness.doc.new_variable(id, &oldest).unwrap();
    harness.expressions(&["v.oldest"]);
    let rows = harness.record();

    harness.run();
    assert_eq!(column(&rows, 0), vec!["31"; 5]);
}

#[test]
fn test_precalculated_and_running_side_by_side() {
    let mut harness = PeopleFixture::harness();
    let id = harness.report;
    let running = VariableDef::new("running", VariableKind::Lowest, Some("age"));
    let youngest = VariableDef::new("youngest", VariableKind::Lowest, Some("age")).precalculated();
    harness.doc.new_variable(id, &running).unwrap();
    harness.doc.new_variable(id, &youngest).unwrap();
    harness.expressions(&["v.running", "v.youngest", "age - v.youngest"]);
    let rows = harness.record();

    let precalculated = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&precalculated);
    harness.report_mut().on_precalculated(move |view| {
        let value = view.variable("youngest").map(|v| v.to_string()).unwrap_or_default();
        sink.borrow_mut().push(value);
    });

    harness.run();
    assert_eq!(column(&rows, 0), vec!["31", "28", "5", "5", "5"]);
    assert_eq!(column(&rows, 1), vec!["5"; 5]);
    assert_eq!(column(&rows, 2), vec!["26", "23", "0", "22", "24"]);
    assert_eq!(*precalculated.borrow(), vec!["5"]);
    assert!(harness.doc.report(id).unwrap().expressions()[2].is_delayed());
}

#[test]
fn test_precalculated_sum_per_group() {
    let mut harness = GroupsFixture::harness();
    let id = harness.report;
    harness.doc.new_break(id, &BreakDef::new("group", &["g"])).unwrap();
    let total = VariableDef::new("total", VariableKind::Sum, Some("n"))
        .reset_on("group")
        .precalculated();
    harness.doc.new_variable(id, &total).unwrap();
    harness.expressions(&["v.total", "n / v.total"]);
    let rows = harness.record();

    harness.run();
    assert_eq!(column(&rows, 0), vec!["3", "3", "7", "7"]);
    let shares = column(&rows, 1);
    assert!(shares[0].starts_with("0.3333"));
    assert!(shares[3].starts_with("0.571428"));
}

#[test]
fn test_callbacks_order() {
    let mut harness = GroupsFixture::harness();
    let id = harness.report;
    harness.doc.new_break(id, &BreakDef::new("group", &["g"])).unwrap();

    let events = Rc::new(RefCell::new(Vec::new()));
    let report = harness.report_mut();
    let sink = Rc::clone(&events);
    report.on_start(move |view| sink.borrow_mut().push(format!("start {}", view.row())));
    let sink = Rc::clone(&events);
    report.on_row(move |view| sink.borrow_mut().push(format!("row {}", view.row())));
    let sink = Rc::clone(&events);
    report.on_break(move |view, name| sink.borrow_mut().push(format!("break {} {}", name, view.row())));
    let sink = Rc::clone(&events);
    report.on_done(move |view| sink.borrow_mut().push(format!("done {}", view.row())));

    harness.run();
    assert_eq!(
        *events.borrow(),
        vec!["start 0", "row 1", "row 2", "break group 3", "row 3", "row 4", "done 4"]
    );

    // A second run starts from scratch
    events.borrow_mut().clear();
    harness.run();
    assert_eq!(events.borrow().len(), 7);
}
