//! FILENAME: engine/src/error.rs
//! PURPOSE: Structural errors raised while building queries and expressions.
//! CONTEXT: Evaluation failures never come through here; they are Error
//! Results flowing through the expression tree. EngineError covers the
//! cases where an object cannot be created or attached at all.

use thiserror::Error;

use crate::query::QueryId;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] parser::ParseError),

    #[error("invalid function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' expects {expected} operand(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid datetime literal '{0}'")]
    InvalidDatetime(String),

    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("unknown datasource driver '{0}'")]
    UnknownDriver(String),

    #[error("datasource '{0}' already exists with a different driver")]
    DatasourceConflict(String),

    #[error("unknown datasource '{0}'")]
    UnknownDatasource(String),

    #[error("datasource '{source_name}' cannot serve query '{query}': {reason}")]
    UnsupportedQuery {
        source_name: String,
        query: String,
        reason: String,
    },

    #[error("query '{0}' already exists")]
    DuplicateQuery(String),

    #[error("unknown query {0:?}")]
    UnknownQuery(QueryId),

    #[error("a query cannot follow itself")]
    SelfFollower,

    #[error("query '{0}' already has a leader")]
    AlreadyFollowing(String),

    #[error("following '{follower}' from '{leader}' would create a cycle")]
    FollowerCycle { leader: String, follower: String },

    #[error("match expression references {0}, only query columns are allowed")]
    InvalidMatchReference(String),

    #[error("unsupported encoding '{0}'")]
    UnsupportedEncoding(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
