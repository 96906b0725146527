//! FILENAME: report-engine/src/definition.rs
//! PURPOSE: Serializable report document definitions.
//! CONTEXT: Describes WHAT a document is: datasources, queries, follower
//! edges and the part/row/column/report tree. `ReportDocument::from_definition`
//! builds the live document from it in that order.

use serde::{Deserialize, Serialize};

use engine::{EngineConfig, QuerySource};

use crate::breaks::BreakDef;
use crate::document::ReportDocument;
use crate::error::ReportResult;
use crate::layout::ReportId;
use crate::report::Report;
use crate::variables::VariableDef;

// ============================================================================
// DOCUMENT
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentDefinition {
    #[serde(default)]
    pub config: Option<EngineConfig>,
    #[serde(default)]
    pub datasources: Vec<DatasourceDefinition>,
    #[serde(default)]
    pub queries: Vec<QueryDefinition>,
    #[serde(default)]
    pub followers: Vec<FollowerDefinition>,
    #[serde(default)]
    pub parts: Vec<PartDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasourceDefinition {
    pub name: String,
    pub driver: String,
    /// Encoding of the text the driver returns, such as "ISO-8859-1".
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDefinition {
    pub name: String,
    pub datasource: String,
    pub source: QuerySource,
}

/// A follower edge. With `match` the follower is N:1, otherwise 1:1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerDefinition {
    pub leader: String,
    pub follower: String,
    #[serde(default, rename = "match")]
    pub match_expr: Option<String>,
}

// ============================================================================
// LAYOUT
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartDefinition {
    #[serde(default)]
    pub rows: Vec<RowDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowDefinition {
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnDefinition {
    #[serde(default)]
    pub reports: Vec<ReportDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportDefinition {
    #[serde(default)]
    pub name: Option<String>,
    /// The main query; the document's first query when absent.
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub breaks: Vec<BreakDef>,
    #[serde(default)]
    pub variables: Vec<VariableDef>,
    #[serde(default)]
    pub expressions: Vec<ExpressionDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpressionDefinition {
    #[serde(default)]
    pub name: Option<String>,
    pub text: String,
}

// ============================================================================
// LOADING
// ============================================================================

impl ReportDocument {
    pub fn from_json(json: &str) -> ReportResult<ReportDocument> {
        let definition: DocumentDefinition = serde_json::from_str(json)?;
        ReportDocument::from_definition(&definition)
    }

    pub fn from_definition(definition: &DocumentDefinition) -> ReportResult<ReportDocument> {
        let mut doc = ReportDocument::new(definition.config.clone().unwrap_or_default());

        for ds in &definition.datasources {
            let engine = doc.engine_mut();
            engine.add_datasource(&ds.name, &ds.driver)?;
            if let Some(source) = engine.datasource_mut(&ds.name) {
                source.set_encoding(ds.encoding.as_deref())?;
            }
        }
        for query in &definition.queries {
            doc.engine_mut()
                .add_query(&query.name, &query.datasource, query.source.clone())?;
        }
        for edge in &definition.followers {
            match &edge.match_expr {
                Some(text) => doc.add_follower_n_to_1(&edge.leader, &edge.follower, text)?,
                None => doc.add_follower(&edge.leader, &edge.follower)?,
            }
        }

        for part_def in &definition.parts {
            let part = doc.new_part();
            for row_def in &part_def.rows {
                let row = doc.new_row(part)?;
                for column_def in &row_def.columns {
                    let column = doc.new_column(row)?;
                    for report_def in &column_def.reports {
                        let report = match &report_def.name {
                            Some(name) => Report::named(name),
                            None => Report::new(),
                        };
                        let id = doc.new_report(column, report)?;
                        build_report(&mut doc, id, report_def)?;
                    }
                }
            }
        }
        Ok(doc)
    }
}

fn build_report(doc: &mut ReportDocument, id: ReportId, def: &ReportDefinition) -> ReportResult<()> {
    if let Some(query) = &def.query {
        doc.set_main_query(id, query)?;
    }
    for brk in &def.breaks {
        doc.new_break(id, brk)?;
    }
    for variable in &def.variables {
        doc.new_variable(id, variable)?;
    }
    for expression in &def.expressions {
        doc.add_expression(id, expression.name.as_deref(), &expression.text)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::VariableKind;

    #[test]
    fn test_parse_report_definition() {
        let json = r#"{
            "name": "people",
            "query": "people",
            "breaks": [{"name": "bracket", "fields": ["age_bracket"], "newpage": "1"}],
            "variables": [
                {"name": "total", "kind": "sum", "base": "age", "reset_on_break": "bracket"},
                {"name": "n", "kind": "countall"}
            ],
            "expressions": [{"text": "age * 2"}, {"name": "label", "text": "upper(name)"}]
        }"#;
        let def: ReportDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.breaks[0].newpage.as_deref(), Some("1"));
        assert_eq!(def.variables[1].kind, VariableKind::CountAll);
        assert_eq!(def.variables[0].reset_on_break.as_deref(), Some("bracket"));
        assert!(!def.variables[0].precalculate);
        assert_eq!(def.expressions[1].name.as_deref(), Some("label"));
    }

    #[test]
    fn test_follower_match_key() {
        let edge: FollowerDefinition =
            serde_json::from_str(r#"{"leader": "a", "follower": "b", "match": "a.x = b.y"}"#).unwrap();
        assert_eq!(edge.match_expr.as_deref(), Some("a.x = b.y"));
    }

    #[test]
    fn test_bad_definition_is_an_error() {
        assert!(ReportDocument::from_json("{").is_err());
        let unknown_driver = r#"{"datasources": [{"name": "d", "driver": "nope"}]}"#;
        assert!(ReportDocument::from_json(unknown_driver).is_err());
    }
}
