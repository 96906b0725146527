//! FILENAME: report-engine/src/error.rs
//! PURPOSE: Structural errors raised while building and running reports.
//! CONTEXT: Like the engine's errors, these cover objects that cannot be
//! created or attached. A break or variable that fails to resolve when a
//! report runs is dropped with a warning instead.

use thiserror::Error;

use engine::EngineError;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("invalid report definition: {0}")]
    Definition(#[from] serde_json::Error),

    #[error("no such {0} in the layout")]
    InvalidLayout(&'static str),

    #[error("report has no main query and the document has no queries")]
    NoMainQuery,

    #[error("unknown query '{0}'")]
    UnknownQuery(String),

    #[error("break '{0}' already exists")]
    DuplicateBreak(String),

    #[error("unknown break '{0}'")]
    UnknownBreak(String),

    #[error("useless break '{0}': it has no fields")]
    UselessBreak(String),

    #[error("break '{name}': {attribute} must be a constant number")]
    InvalidBreakAttribute {
        name: String,
        attribute: &'static str,
    },

    #[error("variable '{0}' already exists")]
    DuplicateVariable(String),

    #[error("variable '{name}': {reason}")]
    InvalidVariable { name: String, reason: String },
}

impl ReportError {
    pub(crate) fn invalid_variable(name: &str, reason: impl Into<String>) -> Self {
        ReportError::InvalidVariable {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ReportResult<T> = Result<T, ReportError>;
