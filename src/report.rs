//! Report data structures
//!
//! These types are the contract between the summary engine (produces) and
//! rendering (consumes).

use std::fmt;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::prelude::PgSummaryError;

/// `pg_class.relkind` values accepted as a table or view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Table,
    PartitionedTable,
    View,
    MaterializedView,
    ForeignTable,
}

impl RelationKind {
    /// Relkind codes, in the form used by catalog queries
    pub const RELKINDS: [&'static str; 5] = ["r", "p", "v", "m", "f"];

    pub fn from_relkind(code: char) -> Option<Self> {
        match code {
            'r' => Some(RelationKind::Table),
            'p' => Some(RelationKind::PartitionedTable),
            'v' => Some(RelationKind::View),
            'm' => Some(RelationKind::MaterializedView),
            'f' => Some(RelationKind::ForeignTable),
            _ => None,
        }
    }

    /// Views carry a definition worth reporting
    pub fn is_view(&self) -> bool {
        matches!(self, RelationKind::View | RelationKind::MaterializedView)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelationKind::Table => "table",
            RelationKind::PartitionedTable => "partitioned table",
            RelationKind::View => "view",
            RelationKind::MaterializedView => "materialized view",
            RelationKind::ForeignTable => "foreign table",
        };
        f.write_str(name)
    }
}

/// What the summarized relation is and where its data comes from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSource {
    pub kind: RelationKind,
    /// View definition, for views and materialized views
    pub definition: Option<String>,
}

/// A column name and its declared type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared type including modifiers, e.g. `character varying(100)`
    pub data_type: String,
}

/// Statistics for one column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub data_type: String,
    pub null_count: u64,
    pub distinct_count: u64,
    /// Distinct non-null values, only for low-cardinality columns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distinct_values: Option<Vec<JsonValue>>,
}

/// Full summary of a table or view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub schema: String,
    pub table_or_view: String,
    pub row_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ReportSource>,
    pub columns: Vec<ColumnSummary>,
}

impl Report {
    /// `schema.table` as shown to users
    pub fn target_name(&self) -> String {
        format!("{}.{}", self.schema, self.table_or_view)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSummary> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Reject relations a summary would say nothing about
pub fn ensure_summarizable(
    target: &str,
    columns: &[ColumnDescriptor],
) -> Result<(), PgSummaryError> {
    if columns.is_empty() {
        return Err(PgSummaryError::DegenerateTarget {
            target: target.to_string(),
            reason: "relation has no columns".to_string(),
        });
    }
    Ok(())
}
