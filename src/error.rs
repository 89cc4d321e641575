use std::fmt;

use thiserror::Error;

/// The validation step that rejected a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStep {
    SchemaExists,
    RelationExists,
    ColumnExists,
    RelationHasRows,
    ColumnHasRows,
}

impl fmt::Display for ValidationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            ValidationStep::SchemaExists => "schema exists",
            ValidationStep::RelationExists => "table or view exists",
            ValidationStep::ColumnExists => "column exists",
            ValidationStep::RelationHasRows => "table or view has rows",
            ValidationStep::ColumnHasRows => "column has rows",
        };
        f.write_str(step)
    }
}

/// pgsummary errors
#[derive(Error, Debug)]
pub enum PgSummaryError {
    #[error("Failed to connect to database: {0}")]
    Connection(String),

    #[error("Query failed{}: {message}", sqlstate_suffix(.code))]
    Query {
        /// SQLSTATE reported by the backend, if any
        code: Option<String>,
        message: String,
    },

    #[error("Precondition '{step}' failed: {message}")]
    Precondition { step: ValidationStep, message: String },

    #[error("Cannot summarize {target}: {reason}")]
    DegenerateTarget { target: String, reason: String },

    #[error("Failed to render report: {0}")]
    Render(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn sqlstate_suffix(code: &Option<String>) -> String {
    code.as_ref().map(|c| format!(" [{c}]")).unwrap_or_default()
}

impl PgSummaryError {
    /// Build a `Query` error from a driver error, keeping the backend diagnostic verbatim
    pub fn query(err: &postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db) => PgSummaryError::Query {
                code: Some(db.code().code().to_string()),
                message: db.message().to_string(),
            },
            None => PgSummaryError::Query {
                code: None,
                message: err.to_string(),
            },
        }
    }

    pub fn precondition(step: ValidationStep, message: impl Into<String>) -> Self {
        PgSummaryError::Precondition {
            step,
            message: message.into(),
        }
    }

    /// The failed validation step, for precondition errors
    pub fn validation_step(&self) -> Option<ValidationStep> {
        match self {
            PgSummaryError::Precondition { step, .. } => Some(*step),
            _ => None,
        }
    }
}
