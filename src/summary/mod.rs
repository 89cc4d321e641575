//! Table and view summaries
//!
//! [`PgSummary`] validates a target relation and computes per-column
//! statistics over it. Every reporting operation re-checks that the target
//! (and, for column operations, the column) exists before touching the
//! relation, and fails with a precondition error naming the failed step.
//! Non-emptiness is only enforced by [`PgSummary::validate`]; reporting on an
//! empty relation yields zero counts.

use std::fmt;

use tracing::{debug, error, info, trace};

use crate::config::DbConfig;
use crate::db::{PgConnection, RowDicts};
use crate::error::ValidationStep;
use crate::prelude::PgSummaryError;
use crate::report::{ensure_summarizable, ColumnDescriptor, ColumnSummary, Report, ReportSource};
use crate::sql::Ident;

mod catalog;

/// Columns with at most this many distinct values have them listed in a report
pub const DEFAULT_MAX_LISTED_VALUES: usize = 20;

/// The relation a summary runs against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub schema: String,
    pub table_or_view: String,
    /// Include relation kind and view definition in reports
    pub include_source: bool,
}

impl Target {
    pub fn new(schema: impl Into<String>, table_or_view: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table_or_view: table_or_view.into(),
            include_source: false,
        }
    }

    pub fn with_source(mut self, include_source: bool) -> Self {
        self.include_source = include_source;
        self
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table_or_view)
    }
}

/// Summary engine bound to one session and one relation
pub struct PgSummary {
    db: PgConnection,
    target: Target,
    relation: Ident,
    max_listed_values: usize,
}

impl PgSummary {
    /// Bind an engine to an existing session
    ///
    /// A session outside autocommit mode runs every statement in one open
    /// transaction, so after any failed statement the backend rejects further
    /// queries (SQLSTATE 25P02) until `db_mut().rollback()` is called.
    /// [`PgSummary::connect`] uses autocommit and has no such state.
    pub fn new(db: PgConnection, target: Target) -> Self {
        let relation = Ident::qualified(&target.schema, &target.table_or_view);
        Self {
            db,
            target,
            relation,
            max_listed_values: DEFAULT_MAX_LISTED_VALUES,
        }
    }

    /// Build an engine on a fresh read-only session in autocommit mode
    pub fn connect(config: DbConfig, target: Target) -> Self {
        let mut db = PgConnection::new(config);
        db.set_autocommit(true);
        Self::new(db, target)
    }

    pub fn with_max_listed_values(mut self, max_listed_values: usize) -> Self {
        self.max_listed_values = max_listed_values;
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn db(&self) -> &PgConnection {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut PgConnection {
        &mut self.db
    }

    /// Give back the session
    pub fn into_inner(self) -> PgConnection {
        self.db
    }

    // Validation

    pub fn schema_exists(&mut self) -> Result<bool, PgSummaryError> {
        catalog::schema_exists(&mut self.db, &self.target.schema)
    }

    /// True only for tables, views and their partitioned, materialized and foreign variants
    pub fn table_or_view_exists(&mut self) -> Result<bool, PgSummaryError> {
        catalog::relation_exists(&mut self.db, &self.target.schema, &self.target.table_or_view)
    }

    pub fn column_exists(&mut self, column: &str) -> Result<bool, PgSummaryError> {
        catalog::column_exists(
            &mut self.db,
            &self.target.schema,
            &self.target.table_or_view,
            column,
        )
    }

    /// Look for a single row without counting
    pub fn table_or_view_has_rows(&mut self) -> Result<bool, PgSummaryError> {
        self.require_target()?;
        self.has_rows()
    }

    /// Look for a single non-null value without counting
    pub fn column_has_rows(&mut self, column: &str) -> Result<bool, PgSummaryError> {
        self.require_column(column)?;

        let col = Ident::new(column);
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {col} IS NOT NULL LIMIT 1)",
            self.relation
        );
        self.db.query_scalar(&sql, &[])
    }

    /// Check schema, relation and non-emptiness in that order
    pub fn validate(&mut self) -> Result<(), PgSummaryError> {
        info!(relation = %self.target, "Validating target");

        self.require_target()?;
        if !self.has_rows()? {
            return Err(self.precondition_failed(
                ValidationStep::RelationHasRows,
                format!("{} has no rows", self.target),
            ));
        }

        debug!(relation = %self.target, "Target is valid");
        Ok(())
    }

    /// Check the column exists and holds at least one non-null value
    pub fn validate_column(&mut self, column: &str) -> Result<(), PgSummaryError> {
        if !self.column_has_rows(column)? {
            return Err(self.precondition_failed(
                ValidationStep::ColumnHasRows,
                format!("column '{}' in {} has no non-null values", column, self.target),
            ));
        }
        Ok(())
    }

    // Reporting

    /// Column names in physical order
    pub fn get_column_names(&mut self) -> Result<Vec<String>, PgSummaryError> {
        Ok(self.get_columns()?.into_iter().map(|c| c.name).collect())
    }

    /// Column names and declared types in physical order
    pub fn get_columns(&mut self) -> Result<Vec<ColumnDescriptor>, PgSummaryError> {
        self.require_target()?;
        catalog::query_columns(&mut self.db, &self.target.schema, &self.target.table_or_view)
    }

    /// Declared type including modifiers, e.g. `character varying(100)`
    pub fn get_column_dtype(&mut self, column: &str) -> Result<String, PgSummaryError> {
        self.require_column(column)?;

        catalog::query_column_type(
            &mut self.db,
            &self.target.schema,
            &self.target.table_or_view,
            column,
        )?
        .ok_or_else(|| self.missing_column(column))
    }

    /// Distinct non-null values of a column, sorted ascending
    ///
    /// Each value is wrapped in a one-key row keyed by the column name. Returns
    /// the rows, the header list and the number of distinct values. Types
    /// without a btree ordering (`json`, `point`, ...) are compared, sorted and
    /// returned in their text form.
    pub fn get_unique_column_values(
        &mut self,
        column: &str,
    ) -> Result<(RowDicts, Vec<String>, u64), PgSummaryError> {
        self.require_column(column)?;
        self.unique_values(column)
    }

    /// Number of distinct non-null values, compared as text for unordered types
    pub fn get_distinct_column_value_count(
        &mut self,
        column: &str,
    ) -> Result<u64, PgSummaryError> {
        self.require_column(column)?;
        self.distinct_count(column)
    }

    pub fn get_null_column_value_count(&mut self, column: &str) -> Result<u64, PgSummaryError> {
        self.require_column(column)?;
        self.null_count(column)
    }

    /// Full row count of the relation
    pub fn get_table_row_count(&mut self) -> Result<u64, PgSummaryError> {
        self.require_target()?;
        self.row_count()
    }

    /// Relation kind and view definition
    pub fn relation_source(&mut self) -> Result<ReportSource, PgSummaryError> {
        self.require_target()?;
        self.source()
    }

    /// Build a report covering every column
    pub fn summary(&mut self) -> Result<Report, PgSummaryError> {
        info!(relation = %self.target, "Starting summary");

        self.require_target()?;
        let columns =
            catalog::query_columns(&mut self.db, &self.target.schema, &self.target.table_or_view)?;
        ensure_summarizable(&self.target.to_string(), &columns).inspect_err(|e| {
            error!(relation = %self.target, error = ?e, "Nothing to summarize");
        })?;

        let row_count = self.row_count()?;
        debug!(relation = %self.target, row_count = ?row_count, "Counted rows");

        let source = if self.target.include_source {
            Some(self.source()?)
        } else {
            None
        };

        let mut summaries = Vec::with_capacity(columns.len());
        for column in columns {
            summaries.push(self.summarize_column(column)?);
        }

        info!(
            relation = %self.target,
            rows = ?row_count,
            columns = ?summaries.len(),
            "Summary complete"
        );

        Ok(Report {
            schema: self.target.schema.clone(),
            table_or_view: self.target.table_or_view.clone(),
            row_count,
            source,
            columns: summaries,
        })
    }

    fn summarize_column(
        &mut self,
        column: ColumnDescriptor,
    ) -> Result<ColumnSummary, PgSummaryError> {
        let null_count = self.null_count(&column.name)?;
        let distinct_count = self.distinct_count(&column.name)?;

        let listed = distinct_count > 0 && distinct_count <= self.max_listed_values as u64;
        let distinct_values = if listed {
            let (rows, _, _) = self.unique_values(&column.name)?;
            let mut values = Vec::with_capacity(rows.len());
            for row in rows {
                let mut row = row?;
                values.push(row.remove(&column.name).unwrap_or_default());
            }
            Some(values)
        } else {
            None
        };

        trace!(
            column = ?column.name,
            data_type = ?column.data_type,
            null_count = ?null_count,
            distinct_count = ?distinct_count,
            listed = ?distinct_values.is_some(),
            "Summarized column"
        );

        Ok(ColumnSummary {
            name: column.name,
            data_type: column.data_type,
            null_count,
            distinct_count,
            distinct_values,
        })
    }

    fn has_rows(&mut self) -> Result<bool, PgSummaryError> {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {} LIMIT 1)", self.relation);
        self.db.query_scalar(&sql, &[])
    }

    fn row_count(&mut self) -> Result<u64, PgSummaryError> {
        let sql = format!("SELECT count(*) FROM {}", self.relation);
        self.count(&sql)
    }

    fn null_count(&mut self, column: &str) -> Result<u64, PgSummaryError> {
        let col = Ident::new(column);
        let sql = format!("SELECT count(*) FROM {} WHERE {col} IS NULL", self.relation);
        self.count(&sql)
    }

    fn distinct_count(&mut self, column: &str) -> Result<u64, PgSummaryError> {
        let value = self.distinct_expr(column)?;
        let sql = format!("SELECT count(DISTINCT {value}) FROM {}", self.relation);
        self.count(&sql)
    }

    fn unique_values(
        &mut self,
        column: &str,
    ) -> Result<(RowDicts, Vec<String>, u64), PgSummaryError> {
        let col = Ident::new(column);
        let value = self.distinct_expr(column)?;
        let sql = format!(
            "SELECT DISTINCT {value} AS {col} FROM {} WHERE {col} IS NOT NULL ORDER BY 1",
            self.relation
        );
        let (rows, headers, _) = self.db.row_dict(&sql, &[])?;
        let count = rows.len() as u64;
        trace!(column = ?column, distinct = ?count, "Unique values");
        Ok((rows, headers, count))
    }

    /// The column itself, or its text form when its type has no ordering
    fn distinct_expr(&mut self, column: &str) -> Result<String, PgSummaryError> {
        let col = Ident::new(column);
        let ordered = catalog::column_is_ordered(
            &mut self.db,
            &self.target.schema,
            &self.target.table_or_view,
            column,
        )?;
        if ordered {
            Ok(col.to_string())
        } else {
            debug!(column = ?column, "Column type has no ordering, comparing as text");
            Ok(format!("{col}::text"))
        }
    }

    fn source(&mut self) -> Result<ReportSource, PgSummaryError> {
        let source = catalog::query_relation_source(
            &mut self.db,
            &self.target.schema,
            &self.target.table_or_view,
        )?;
        source.ok_or_else(|| {
            self.precondition_failed(
                ValidationStep::RelationExists,
                format!("{} is not a table or view", self.target),
            )
        })
    }

    fn count(&mut self, sql: &str) -> Result<u64, PgSummaryError> {
        let count: i64 = self.db.query_scalar(sql, &[])?;
        // count(*) is never negative
        Ok(count.max(0) as u64)
    }

    fn require_target(&mut self) -> Result<(), PgSummaryError> {
        if !self.schema_exists()? {
            return Err(self.precondition_failed(
                ValidationStep::SchemaExists,
                format!("schema '{}' does not exist", self.target.schema),
            ));
        }
        if !self.table_or_view_exists()? {
            return Err(self.precondition_failed(
                ValidationStep::RelationExists,
                format!("table or view {} does not exist", self.target),
            ));
        }
        Ok(())
    }

    fn require_column(&mut self, column: &str) -> Result<(), PgSummaryError> {
        self.require_target()?;
        if !self.column_exists(column)? {
            return Err(self.missing_column(column));
        }
        Ok(())
    }

    fn missing_column(&self, column: &str) -> PgSummaryError {
        self.precondition_failed(
            ValidationStep::ColumnExists,
            format!("column '{}' does not exist in {}", column, self.target),
        )
    }

    fn precondition_failed(&self, step: ValidationStep, message: String) -> PgSummaryError {
        error!(relation = %self.target, step = %step, message = ?message, "Precondition failed");
        PgSummaryError::precondition(step, message)
    }
}
