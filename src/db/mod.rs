//! Database session management
//!
//! [`PgConnection`] owns at most one PostgreSQL session. Statements go through
//! [`PgConnection::execute`], which opens the session on demand and hands back a
//! materialized [`Cursor`].

use std::fmt;

use postgres::types::{FromSqlOwned, ToSql};
use postgres::{Client, NoTls, Row};
use tracing::{debug, error, info, trace};

use crate::config::DbConfig;
use crate::prelude::PgSummaryError;

mod rows;

pub use rows::{row_to_map, RowDicts, RowMap};

/// Statement parameters, bound as `$1`, `$2`, ...
pub type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

/// Result of a single statement
pub struct Cursor {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Row>,
    row_count: Option<u64>,
}

impl Cursor {
    /// Column names in result order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows returned, or rows affected for statements without a result set.
    /// `None` when the backend does not report a count.
    pub fn row_count(&self) -> Option<u64> {
        self.row_count
    }

    pub fn fetch_one(&mut self) -> Option<Row> {
        self.rows.next()
    }

    /// Remaining rows
    pub fn fetch_all(self) -> Vec<Row> {
        self.rows.collect()
    }

    fn into_parts(self) -> (RowDicts, Vec<String>, Option<u64>) {
        (RowDicts::new(self.rows), self.columns, self.row_count)
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("columns", &self.columns)
            .field("row_count", &self.row_count)
            .field("remaining", &self.rows.len())
            .finish()
    }
}

/// A single PostgreSQL session
pub struct PgConnection {
    config: DbConfig,
    client: Option<Client>,
    autocommit: bool,
    in_transaction: bool,
}

impl PgConnection {
    /// Create a closed connection; nothing is sent until first use
    pub fn new(config: DbConfig) -> Self {
        Self {
            config,
            client: None,
            autocommit: false,
            in_transaction: false,
        }
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.client.is_some()
    }

    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    /// When off (the default), the first statement after open, commit or
    /// rollback starts a transaction that stays open until `commit`.
    pub fn set_autocommit(&mut self, autocommit: bool) {
        self.autocommit = autocommit;
    }

    /// Open the session if it is not open yet
    pub fn open(&mut self) -> Result<(), PgSummaryError> {
        if self.client.is_some() {
            return Ok(());
        }

        info!(connection = ?self.config.redacted_connection_string(), "Connecting to PostgreSQL");

        let client = self.config.postgres_config().connect(NoTls).map_err(|e| {
            error!(
                connection = ?self.config.redacted_connection_string(),
                error = ?e,
                "Failed to connect"
            );
            PgSummaryError::Connection(format!(
                "{}: {}",
                self.config.redacted_connection_string(),
                e
            ))
        })?;

        info!("Connected to database");
        self.client = Some(client);
        self.in_transaction = false;
        Ok(())
    }

    /// Close the session; uncommitted work is discarded
    pub fn close(&mut self) {
        if let Some(client) = self.client.take() {
            if self.in_transaction {
                debug!("Closing with an open transaction, changes are discarded");
            }
            drop(client);
            info!("Disconnected from database");
        }
        self.in_transaction = false;
    }

    /// Run a statement and materialize its result
    pub fn execute(&mut self, sql: &str, params: Params<'_>) -> Result<Cursor, PgSummaryError> {
        debug!(sql = ?sql, params = ?params.len(), "Executing statement");

        self.begin_if_needed()?;
        let client = self.client_mut()?;

        let statement = client.prepare(sql).map_err(|e| statement_error(sql, &e))?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let (rows, row_count) = if columns.is_empty() {
            let affected = client
                .execute(&statement, params)
                .map_err(|e| statement_error(sql, &e))?;
            (Vec::new(), affected)
        } else {
            let rows = client
                .query(&statement, params)
                .map_err(|e| statement_error(sql, &e))?;
            let count = rows.len() as u64;
            (rows, count)
        };

        trace!(columns = ?columns, row_count = ?row_count, "Statement complete");

        Ok(Cursor {
            columns,
            rows: rows.into_iter(),
            row_count: Some(row_count),
        })
    }

    /// Run a multi-statement script without parameters
    pub fn execute_batch(&mut self, script: &str) -> Result<(), PgSummaryError> {
        debug!(bytes = ?script.len(), "Executing batch");

        self.begin_if_needed()?;
        self.client_mut()?
            .batch_execute(script)
            .map_err(|e| statement_error(script, &e))
    }

    /// Run a statement and return its rows as ordered maps, the header list,
    /// and the reported row count
    pub fn row_dict(
        &mut self,
        sql: &str,
        params: Params<'_>,
    ) -> Result<(RowDicts, Vec<String>, Option<u64>), PgSummaryError> {
        Ok(self.execute(sql, params)?.into_parts())
    }

    /// Run a statement expected to return one row and read its first column
    pub fn query_scalar<T: FromSqlOwned>(
        &mut self,
        sql: &str,
        params: Params<'_>,
    ) -> Result<T, PgSummaryError> {
        let row = self.execute(sql, params)?.fetch_one().ok_or_else(|| {
            error!(sql = ?sql, "Statement returned no rows");
            PgSummaryError::Query {
                code: None,
                message: "statement returned no rows".to_string(),
            }
        })?;
        row.try_get(0).map_err(|e| statement_error(sql, &e))
    }

    /// Commit the open transaction, if any
    pub fn commit(&mut self) -> Result<(), PgSummaryError> {
        self.end_transaction("COMMIT")
    }

    /// Roll back the open transaction, if any
    pub fn rollback(&mut self) -> Result<(), PgSummaryError> {
        self.end_transaction("ROLLBACK")
    }

    fn end_transaction(&mut self, command: &str) -> Result<(), PgSummaryError> {
        let in_transaction = self.in_transaction;
        let client = self.client_mut()?;
        if !in_transaction {
            trace!(command = ?command, "No open transaction");
            return Ok(());
        }

        debug!(command = ?command, "Ending transaction");
        client
            .batch_execute(command)
            .map_err(|e| statement_error(command, &e))?;
        self.in_transaction = false;
        Ok(())
    }

    fn begin_if_needed(&mut self) -> Result<(), PgSummaryError> {
        self.open()?;
        if self.autocommit || self.in_transaction {
            return Ok(());
        }

        self.client_mut()?
            .batch_execute("BEGIN")
            .map_err(|e| statement_error("BEGIN", &e))?;
        self.in_transaction = true;
        trace!("Transaction started");
        Ok(())
    }

    fn client_mut(&mut self) -> Result<&mut Client, PgSummaryError> {
        self.client.as_mut().ok_or_else(|| {
            error!("No open database session");
            PgSummaryError::Connection("no open database session".to_string())
        })
    }
}

impl Drop for PgConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn statement_error(sql: &str, err: &postgres::Error) -> PgSummaryError {
    error!(sql = ?sql, error = ?err, "Statement failed");
    PgSummaryError::query(err)
}
