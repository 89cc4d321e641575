//! Catalog lookups
//!
//! Everything here reads `pg_catalog`; names are bound as parameters, never
//! spliced into the statement text.

use tracing::{debug, trace};

use crate::db::PgConnection;
use crate::prelude::PgSummaryError;
use crate::report::{ColumnDescriptor, RelationKind, ReportSource};

/// Check a schema exists
pub fn schema_exists(db: &mut PgConnection, schema_name: &str) -> Result<bool, PgSummaryError> {
    trace!(schema = ?schema_name, "Checking schema");

    let sql = r#"
        SELECT EXISTS (
            SELECT 1 FROM pg_namespace WHERE nspname = $1
        )
    "#;

    db.query_scalar(sql, &[&schema_name])
}

/// Check a table or view exists in a schema
pub fn relation_exists(
    db: &mut PgConnection,
    schema_name: &str,
    relation: &str,
) -> Result<bool, PgSummaryError> {
    trace!(schema = ?schema_name, relation = ?relation, "Checking relation");

    let sql = r#"
        SELECT EXISTS (
            SELECT 1
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1
                AND c.relname = $2
                AND c.relkind::text = ANY($3)
        )
    "#;

    let kinds: &[&str] = &RelationKind::RELKINDS;
    db.query_scalar(sql, &[&schema_name, &relation, &kinds])
}

/// Check a relation has a live column with this exact name
pub fn column_exists(
    db: &mut PgConnection,
    schema_name: &str,
    relation: &str,
    column: &str,
) -> Result<bool, PgSummaryError> {
    trace!(schema = ?schema_name, relation = ?relation, column = ?column, "Checking column");

    let sql = r#"
        SELECT EXISTS (
            SELECT 1
            FROM pg_attribute a
            JOIN pg_class c ON c.oid = a.attrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1
                AND c.relname = $2
                AND a.attname = $3
                AND a.attnum > 0
                AND NOT a.attisdropped
        )
    "#;

    db.query_scalar(sql, &[&schema_name, &relation, &column])
}

/// Query all columns of a relation in physical order
pub fn query_columns(
    db: &mut PgConnection,
    schema_name: &str,
    relation: &str,
) -> Result<Vec<ColumnDescriptor>, PgSummaryError> {
    trace!(schema = ?schema_name, relation = ?relation, "Querying columns");

    let sql = r#"
        SELECT
            a.attname::text AS column_name,
            format_type(a.atttypid, a.atttypmod) AS data_type
        FROM pg_attribute a
        JOIN pg_class c ON c.oid = a.attrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1
            AND c.relname = $2
            AND a.attnum > 0
            AND NOT a.attisdropped
        ORDER BY a.attnum
    "#;

    let rows = db.execute(sql, &[&schema_name, &relation])?.fetch_all();

    let columns: Vec<ColumnDescriptor> = rows
        .iter()
        .map(|row| ColumnDescriptor {
            name: row.get("column_name"),
            data_type: row.get("data_type"),
        })
        .collect();

    debug!(relation = ?relation, columns = ?columns.len(), "Found columns");
    Ok(columns)
}

/// Declared type of one column, `None` if the column does not exist
pub fn query_column_type(
    db: &mut PgConnection,
    schema_name: &str,
    relation: &str,
    column: &str,
) -> Result<Option<String>, PgSummaryError> {
    trace!(schema = ?schema_name, relation = ?relation, column = ?column, "Querying column type");

    let sql = r#"
        SELECT format_type(a.atttypid, a.atttypmod) AS data_type
        FROM pg_attribute a
        JOIN pg_class c ON c.oid = a.attrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1
            AND c.relname = $2
            AND a.attname = $3
            AND a.attnum > 0
            AND NOT a.attisdropped
    "#;

    let data_type = db
        .execute(sql, &[&schema_name, &relation, &column])?
        .fetch_one()
        .map(|row| row.get("data_type"));

    trace!(column = ?column, data_type = ?data_type, "Column type");
    Ok(data_type)
}

/// Check a column's type has a default btree ordering
///
/// `DISTINCT` and `ORDER BY` need one. Arrays are judged by their element type;
/// types reached through a binary-coercible cast (`varchar` to `text`), domains,
/// enums and ranges count as ordered. Anything else (`json`, `point`, `xml`,
/// composites) is not.
pub fn column_is_ordered(
    db: &mut PgConnection,
    schema_name: &str,
    relation: &str,
    column: &str,
) -> Result<bool, PgSummaryError> {
    trace!(
        schema = ?schema_name,
        relation = ?relation,
        column = ?column,
        "Checking column ordering"
    );

    let sql = r#"
        WITH col AS (
            SELECT CASE WHEN t.typcategory = 'A' THEN t.typelem ELSE t.oid END AS typid
            FROM pg_attribute a
            JOIN pg_class c ON c.oid = a.attrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            JOIN pg_type t ON t.oid = a.atttypid
            WHERE n.nspname = $1
                AND c.relname = $2
                AND a.attname = $3
                AND a.attnum > 0
                AND NOT a.attisdropped
        )
        SELECT EXISTS (
            SELECT 1
            FROM col
            JOIN pg_type t ON t.oid = col.typid
            JOIN pg_opclass oc ON oc.opcdefault
            JOIN pg_am am ON am.oid = oc.opcmethod
            WHERE am.amname = 'btree'
                AND (
                    oc.opcintype IN (t.oid, t.typbasetype)
                    OR (t.typtype = 'e' AND oc.opcintype = 'anyenum'::regtype)
                    OR (t.typtype = 'r' AND oc.opcintype = 'anyrange'::regtype)
                    OR EXISTS (
                        SELECT 1
                        FROM pg_cast k
                        WHERE k.castsource IN (t.oid, t.typbasetype)
                            AND k.casttarget = oc.opcintype
                            AND k.castmethod = 'b'
                    )
                )
        )
    "#;

    let ordered = db.query_scalar(sql, &[&schema_name, &relation, &column])?;
    trace!(column = ?column, ordered = ?ordered, "Column ordering");
    Ok(ordered)
}

/// Relation kind and, for views, the view definition
pub fn query_relation_source(
    db: &mut PgConnection,
    schema_name: &str,
    relation: &str,
) -> Result<Option<ReportSource>, PgSummaryError> {
    trace!(schema = ?schema_name, relation = ?relation, "Querying relation source");

    let sql = r#"
        SELECT
            c.relkind,
            CASE WHEN c.relkind IN ('v', 'm') THEN pg_get_viewdef(c.oid) END AS definition
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1
            AND c.relname = $2
    "#;

    let Some(row) = db.execute(sql, &[&schema_name, &relation])?.fetch_one() else {
        return Ok(None);
    };

    let relkind: i8 = row.get("relkind");
    let Some(kind) = RelationKind::from_relkind(relkind as u8 as char) else {
        debug!(relation = ?relation, relkind = ?relkind, "Relation is not a table or view");
        return Ok(None);
    };

    Ok(Some(ReportSource {
        kind,
        definition: row.get("definition"),
    }))
}
