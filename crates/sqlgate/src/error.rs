use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::request::Operator;
use crate::types::NormalizedType;
use crate::value::ValueKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Request clause a field reference came from, for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Select,
    Where,
    OrderBy,
    Set,
    SelectFields,
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Clause::Select => "select",
            Clause::Where => "where clause",
            Clause::OrderBy => "order by clause",
            Clause::Set => "update set",
            Clause::SelectFields => "select fields",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    // registration
    #[error("failed to register model {model}: {reason}")]
    Registration { model: String, reason: String },

    #[error("model {model} is not registered")]
    NotRegistered { model: &'static str },

    // field references
    #[error("invalid field in {clause}: {field}")]
    UnknownField { clause: Clause, field: String },

    #[error("select fields cannot be empty")]
    EmptySelect,

    // operators
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("operator {operator} cannot be used on field {field} of type {field_type}")]
    OperatorMismatch {
        field: String,
        operator: Operator,
        field_type: NormalizedType,
    },

    // values
    #[error("type mismatch for field {field}: expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: NormalizedType,
        actual: ValueKind,
    },

    #[error("operator {operator} on field {field} takes no value, got {actual}")]
    UnexpectedValue {
        field: String,
        operator: Operator,
        actual: ValueKind,
    },

    #[error("operator {operator} on field {field} requires a value, use IS NULL to match null")]
    NullValue { field: String, operator: Operator },

    #[error("operator {operator} on field {field} requires a list value, got {actual}")]
    ExpectedSequence {
        field: String,
        operator: Operator,
        actual: ValueKind,
    },

    #[error(
        "type mismatch for element {index} of field {field}: expected {expected}, got {actual}"
    )]
    ElementTypeMismatch {
        field: String,
        index: usize,
        expected: NormalizedType,
        actual: ValueKind,
    },

    #[error("{name} must be non-negative, got {value}")]
    NegativeBound { name: &'static str, value: i64 },

    // update shape
    #[error("update request must include at least one field to update")]
    EmptySet,

    #[error("update request must include where conditions")]
    MissingWhere,

    // raw parameters
    #[error("{}", param_mismatch_message(.missing, .extra))]
    ParamMismatch {
        missing: Vec<String>,
        extra: Vec<String>,
    },

    #[error("no type information for parameter {param}")]
    UntypedParam { param: String },

    #[error("parameter {param} type mismatch: expected {expected}, got {actual}")]
    ParamType {
        param: String,
        expected: NormalizedType,
        actual: ValueKind,
    },

    // statement shape
    #[error("SQL syntax error: {0}")]
    SqlSyntax(String),

    #[error("empty SQL query")]
    EmptySql,

    #[error("expected exactly one statement, found {0}")]
    MultipleStatements(usize),

    #[error("only SELECT statements are allowed, got {0}")]
    NotSelect(String),

    // binding and execution
    #[error("failed to convert value for field {field}: {message}")]
    Bind { field: String, message: String },

    #[error("failed to read column {column} as {expected}: {message}")]
    ColumnRead {
        column: String,
        expected: String,
        message: String,
    },

    #[error("unsupported database type: {type_name}")]
    UnsupportedDriver { type_name: &'static str },

    #[error("statement timed out after {0:?}")]
    Timeout(Duration),

    #[error("update affected no rows")]
    NoRowsAffected,

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// True for errors caused by the request itself rather than the database.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            Error::Registration { .. }
                | Error::NotRegistered { .. }
                | Error::ColumnRead { .. }
                | Error::UnsupportedDriver { .. }
                | Error::Timeout(_)
                | Error::NoRowsAffected
                | Error::Postgres(_)
                | Error::Pool(_)
                | Error::Config(_)
        )
    }
}

fn param_mismatch_message(missing: &[String], extra: &[String]) -> String {
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing required parameters: {}", missing.join(", ")));
    }
    if !extra.is_empty() {
        parts.push(format!("unexpected parameters provided: {}", extra.join(", ")));
    }
    parts.join("; ")
}
