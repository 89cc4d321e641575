//! # pgsummary
//!
//! Profile a PostgreSQL table or view
//!
//! This crate provides a CLI tool and library for validating a table or view
//! and summarizing it: column names, declared types, null counts, distinct
//! values and row counts.

pub mod config;
pub mod db;
pub mod error;
pub mod render;
pub mod report;
pub mod sql;
pub mod summary;

pub mod prelude {
    pub use crate::config::DbConfig;
    pub use crate::db::{Cursor, PgConnection, RowDicts, RowMap};
    pub use crate::error::{PgSummaryError, ValidationStep};
    pub use crate::render::{OutputFormat, ReportRenderer};
    pub use crate::report::{ColumnDescriptor, ColumnSummary, RelationKind, Report, ReportSource};
    pub use crate::summary::{PgSummary, Target};
}

pub use summary::PgSummary;
