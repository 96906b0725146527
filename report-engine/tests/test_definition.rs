//! FILENAME: tests/test_definition.rs
//! Integration tests for documents loaded from JSON definitions.

use std::cell::RefCell;
use std::rc::Rc;

use report_engine::{ReportDocument, ReportError};

const PEOPLE: &str = r#"{
    "config": {"precision_bits": 128, "locale": "en_US"},
    "datasources": [{"name": "mem", "driver": "array"}],
    "queries": [
        {
            "name": "people",
            "datasource": "mem",
            "source": {"array": {
                "rows": [["name", "age", "age_bracket"],
                         ["Fred", "31", "adult"],
                         ["Mary", "28", "adult"],
                         ["Tot", "5", "child"]],
                "types": ["string", "number", "string"]
            }}
        },
        {
            "name": "pets",
            "datasource": "mem",
            "source": {"array": {
                "rows": [["owner", "pet"], ["Fred", "cat"], ["Tot", "dog"], ["Tot", "fish"]]
            }}
        }
    ],
    "followers": [{"leader": "people", "follower": "pets", "match": "people.name = pets.owner"}],
    "parts": [{"rows": [{"columns": [
        {"reports": [{
            "name": "summary",
            "query": "people",
            "breaks": [{"name": "bracket", "fields": ["age_bracket"]}],
            "variables": [
                {"name": "oldest", "kind": "highest", "base": "age", "precalculate": true},
                {"name": "pets", "kind": "count", "base": "pet", "reset_on_break": "bracket"}
            ],
            "expressions": [
                {"name": "line", "text": "name + ': ' + pet"},
                {"name": "oldest", "text": "v.oldest"},
                {"name": "pets", "text": "v.pets"}
            ]
        }]},
        {"reports": [{"name": "empty"}]}
    ]}]}]
}"#;

#[test]
fn test_load_and_execute() {
    let mut doc = ReportDocument::from_json(PEOPLE).unwrap();
    assert_eq!(doc.engine().config().precision_bits, 128);
    assert_eq!(doc.layout().report_ids().len(), 2);

    let id = doc.layout().find_report("summary").unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    doc.report_mut(id).unwrap().on_row(move |view| {
        let get = |name: &str| view.expression(name).map(|v| v.to_string()).unwrap_or_default();
        sink.borrow_mut().push(format!("{} {} {}", get("line"), get("oldest"), get("pets")));
    });

    let summaries = doc.execute().unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].1.rows, 4);
    assert_eq!(summaries[0].1.triggers, 1);
    // The second report runs over the first query too
    assert_eq!(summaries[1].1.rows, 4);
    assert_eq!(
        *seen.borrow(),
        vec!["Fred: cat 31 1", " 31 1", "Tot: dog 31 1", "Tot: fish 31 2"]
    );
}

#[test]
fn test_definition_errors() {
    let unknown_query = r#"{"parts": [{"rows": [{"columns": [{"reports": [{"query": "nope"}]}]}]}]}"#;
    assert!(matches!(
        ReportDocument::from_json(unknown_query),
        Err(ReportError::UnknownQuery(_))
    ));

    let bad_variable = r#"{
        "parts": [{"rows": [{"columns": [{"reports": [{
            "variables": [{"name": "x", "kind": "sum"}]
        }]}]}]}]
    }"#;
    assert!(matches!(
        ReportDocument::from_json(bad_variable),
        Err(ReportError::InvalidVariable { .. })
    ));

    assert!(matches!(
        ReportDocument::from_json(r#"{"parts": 3}"#),
        Err(ReportError::Definition(_))
    ));
}
