//! Tests against a live PostgreSQL server
//!
//! Connection settings come from POSTGRES_HOST, POSTGRES_PORT, POSTGRES_DB,
//! POSTGRES_USER and POSTGRES_PASSWORD (all defaulting to a local `postgres`
//! setup). Run with `cargo test -- --ignored`.

use std::env;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value as JsonValue};

use pgsummary::prelude::*;
use pgsummary::sql::Ident;

fn config() -> DbConfig {
    DbConfig::from_lookup(|key| {
        env::var(key).ok().or_else(|| match key {
            "POSTGRES_PASSWORD" => Some("postgres".to_string()),
            _ => None,
        })
    })
    .unwrap()
}

fn db() -> PgConnection {
    load_fixture();
    PgConnection::new(config())
}

fn load_fixture() {
    static LOADED: OnceLock<()> = OnceLock::new();
    LOADED.get_or_init(|| {
        let mut db = PgConnection::new(config());
        db.execute_batch(include_str!("data.sql")).unwrap();
        db.commit().unwrap();
        db.close();
    });
}

fn summary_for(table: &str) -> PgSummary {
    load_fixture();
    PgSummary::connect(config(), Target::new("public", table))
}

fn unique_name(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}_{}_{}", prefix, std::process::id(), nanos)
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_db_connection_open_close_reopen() {
    let mut db = db();
    assert!(!db.is_open());

    db.open().unwrap();
    assert!(db.is_open());
    let first: i32 = db.query_scalar("SELECT 1", &[]).unwrap();

    db.close();
    assert!(!db.is_open());

    db.open().unwrap();
    db.open().unwrap();
    let second: i32 = db.query_scalar("SELECT 1", &[]).unwrap();
    assert_eq!(first, second);
    db.close();
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_db_execute() {
    let mut db = db();
    let mut cursor = db.execute("SELECT 1", &[]).unwrap();
    assert_eq!(cursor.row_count(), Some(1));
    let row = cursor.fetch_one().unwrap();
    assert_eq!(row.get::<_, i32>(0), 1);
    assert!(cursor.fetch_one().is_none());
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_db_row_dict() {
    let mut db = db();
    let (rows, headers, row_count) = db.row_dict("SELECT 1 as one, 2 as two", &[]).unwrap();

    assert_eq!(headers, vec!["one", "two"]);
    assert_eq!(row_count, Some(1));

    let rows: Vec<RowMap> = rows.collect::<Result<_, _>>().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["one"], json!(1));
    assert_eq!(rows[0]["two"], json!(2));
    let keys: Vec<&String> = rows[0].keys().collect();
    assert_eq!(keys, vec!["one", "two"]);
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_db_row_dict_params_match_literals() {
    let mut db = db();

    let (literal_rows, literal_headers, literal_count) =
        db.row_dict("SELECT 1 as one, 2 as two", &[]).unwrap();
    let literal_rows: Vec<RowMap> = literal_rows.collect::<Result<_, _>>().unwrap();

    let (rows, headers, row_count) = db
        .row_dict("SELECT $1::int4 as one, $2::int4 as two", &[&1i32, &2i32])
        .unwrap();
    let rows: Vec<RowMap> = rows.collect::<Result<_, _>>().unwrap();

    assert_eq!(headers, literal_headers);
    assert_eq!(row_count, literal_count);
    assert_eq!(rows, literal_rows);
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_db_malformed_sql_is_query_error() {
    let mut db = db();
    db.set_autocommit(true);
    match db.execute("SELEC 1", &[]) {
        Err(PgSummaryError::Query { code, message }) => {
            assert_eq!(code.as_deref(), Some("42601"));
            assert!(message.contains("syntax error"));
        }
        other => panic!("expected query error, got {other:?}"),
    }
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_db_row_dict_decodes_column_types() {
    let mut db = db();
    let (rows, headers, row_count) = db
        .row_dict("SELECT * FROM public.typed_values ORDER BY id", &[])
        .unwrap();
    assert_eq!(headers.len(), 11);
    assert_eq!(row_count, Some(2));

    let rows: Vec<RowMap> = rows.collect::<Result<_, _>>().unwrap();
    let first = &rows[0];
    assert_eq!(first["id"], json!(1));
    assert_eq!(first["amount"], json!("12.50"));
    assert_eq!(first["ref"], json!("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11"));
    assert_eq!(first["created_at"], json!("2024-01-02T03:04:05+00:00"));
    assert_eq!(first["born"], json!("2024-01-02"));
    assert_eq!(first["wake"], json!("03:04:05"));
    assert_eq!(first["logged"], json!("2024-01-02 03:04:05"));
    assert_eq!(first["payload"], json!({"a": 1}));
    assert_eq!(first["doc"], json!({"b": [1, 2]}));
    // No decoder for geometric types
    assert_eq!(first["location"], JsonValue::Null);
    assert_eq!(first["missing"], JsonValue::Null);

    let second = &rows[1];
    assert_eq!(second["amount"], json!("7.00"));
    assert_eq!(second["ref"], JsonValue::Null);
    assert_eq!(second["created_at"], JsonValue::Null);
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_init() {
    let summary = summary_for("books");
    assert!(!summary.db().is_open());
    assert_eq!(summary.db().config().database, config().database);
    assert!(!summary.db().config().password.is_empty());
    assert_eq!(summary.target().schema, "public");
    assert_eq!(summary.target().table_or_view, "books");
    assert!(!summary.target().include_source);
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_schema_exists() {
    assert!(summary_for("books").schema_exists().unwrap());

    let mut missing = PgSummary::connect(config(), Target::new(unique_name("no_schema"), "books"));
    assert!(!missing.schema_exists().unwrap());
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_table_or_view_exists() {
    assert!(summary_for("books").table_or_view_exists().unwrap());
    assert!(summary_for("book_genres").table_or_view_exists().unwrap());
    assert!(!summary_for("books_title_idx").table_or_view_exists().unwrap());
    assert!(!summary_for(&unique_name("no_table")).table_or_view_exists().unwrap());
    assert!(!summary_for("books\"; DROP TABLE public.books; --")
        .table_or_view_exists()
        .unwrap());
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_column_exists_matches_column_names() {
    let mut summary = summary_for("books");
    let names = summary.get_column_names().unwrap();
    for name in &names {
        assert!(summary.column_exists(name).unwrap());
    }
    assert!(!summary.column_exists("BOOK_ID").unwrap());
    assert!(!summary.column_exists("missing").unwrap());
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_has_rows() {
    let mut summary = summary_for("books");
    assert!(summary.table_or_view_has_rows().unwrap());
    assert!(summary.column_has_rows("book_id").unwrap());

    let mut empty = summary_for("no_rows");
    assert!(!empty.table_or_view_has_rows().unwrap());
    assert!(!empty.column_has_rows("label").unwrap());
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_all_null_column_has_no_rows() {
    let mut summary = summary_for("typed_values");
    assert!(summary.table_or_view_has_rows().unwrap());
    assert!(!summary.column_has_rows("missing").unwrap());
    assert!(summary.column_has_rows("ref").unwrap());

    summary.validate().unwrap();
    let err = summary.validate_column("missing").unwrap_err();
    assert_eq!(err.validation_step(), Some(ValidationStep::ColumnHasRows));
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_validate() {
    summary_for("books").validate().unwrap();

    let err = summary_for("no_rows").validate().unwrap_err();
    assert_eq!(err.validation_step(), Some(ValidationStep::RelationHasRows));

    summary_for("books").validate_column("notes").unwrap();
    let err = summary_for("no_rows").validate_column("label").unwrap_err();
    assert_eq!(err.validation_step(), Some(ValidationStep::ColumnHasRows));
    let err = summary_for("books").validate_column("missing").unwrap_err();
    assert_eq!(err.validation_step(), Some(ValidationStep::ColumnExists));

    let err = summary_for("books_title_idx").validate().unwrap_err();
    assert_eq!(err.validation_step(), Some(ValidationStep::RelationExists));

    let err = PgSummary::connect(config(), Target::new(unique_name("no_schema"), "books"))
        .validate()
        .unwrap_err();
    assert_eq!(err.validation_step(), Some(ValidationStep::SchemaExists));
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_get_column_names() {
    assert_eq!(
        summary_for("books").get_column_names().unwrap(),
        vec!["book_id", "book_title", "genre", "notes"]
    );
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_get_column_dtype() {
    let mut summary = summary_for("books");
    assert_eq!(
        summary.get_column_dtype("book_id").unwrap(),
        "character varying(100)"
    );
    assert_eq!(summary.get_column_dtype("notes").unwrap(), "text");

    let err = summary.get_column_dtype("missing").unwrap_err();
    assert_eq!(err.validation_step(), Some(ValidationStep::ColumnExists));
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_get_unique_column_values() {
    let mut summary = summary_for("books");
    let (unique_values, headers, count) = summary.get_unique_column_values("book_id").unwrap();

    let values: Vec<String> = unique_values
        .map(|row| row.unwrap()["book_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(values, vec!["B001", "B002"]);
    assert_eq!(headers, vec!["book_id"]);
    assert_eq!(count, 2);
    assert_eq!(
        summary.get_distinct_column_value_count("book_id").unwrap(),
        count
    );
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_unique_values_skip_nulls() {
    let (rows, _, count) = summary_for("books")
        .get_unique_column_values("notes")
        .unwrap();
    let rows: Vec<RowMap> = rows.collect::<Result<_, _>>().unwrap();
    assert_eq!(count, 1);
    assert_eq!(rows[0]["notes"], json!("An epic tale"));
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_unique_values_of_unordered_types() {
    let mut summary = summary_for("typed_values");

    let (rows, headers, count) = summary.get_unique_column_values("location").unwrap();
    let rows: Vec<RowMap> = rows.collect::<Result<_, _>>().unwrap();
    assert_eq!(headers, vec!["location"]);
    assert_eq!(count, 2);
    assert_eq!(rows[0]["location"], json!("(1,2)"));
    assert_eq!(rows[1]["location"], json!("(3,4)"));

    assert_eq!(summary.get_distinct_column_value_count("doc").unwrap(), 1);
    let (rows, _, _) = summary.get_unique_column_values("doc").unwrap();
    let rows: Vec<RowMap> = rows.collect::<Result<_, _>>().unwrap();
    assert_eq!(rows[0]["doc"], json!(r#"{"b": [1, 2]}"#));

    // jsonb has an ordering, values keep their decoded form
    let (rows, _, count) = summary.get_unique_column_values("payload").unwrap();
    let rows: Vec<RowMap> = rows.collect::<Result<_, _>>().unwrap();
    assert_eq!(count, 1);
    assert_eq!(rows[0]["payload"], json!({"a": 1}));
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_get_null_column_value_count() {
    let mut summary = summary_for("books");
    assert_eq!(summary.get_null_column_value_count("genre").unwrap(), 0);
    assert_eq!(summary.get_null_column_value_count("notes").unwrap(), 1);
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_get_table_row_count() {
    assert_eq!(summary_for("books").get_table_row_count().unwrap(), 2);
    assert_eq!(summary_for("no_rows").get_table_row_count().unwrap(), 0);
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_row_count_reflects_committed_delete() {
    let table = unique_name("row_count");
    let relation = Ident::qualified("public", &table);

    let mut writer = db();
    writer
        .execute(&format!("CREATE TABLE {relation} (id integer)"), &[])
        .unwrap();
    let inserted = writer
        .execute(&format!("INSERT INTO {relation} VALUES ($1), ($2)"), &[&1i32, &2i32])
        .unwrap();
    assert_eq!(inserted.row_count(), Some(2));
    writer.commit().unwrap();

    let mut summary = summary_for(&table);
    assert_eq!(summary.get_table_row_count().unwrap(), 2);

    writer
        .execute(&format!("DELETE FROM {relation} WHERE id = $1"), &[&1i32])
        .unwrap();
    assert_eq!(summary.get_table_row_count().unwrap(), 2);
    writer.commit().unwrap();
    assert_eq!(summary.get_table_row_count().unwrap(), 1);

    let drop_sql = format!("DROP TABLE {relation}");
    writer.execute(&drop_sql, &[]).unwrap();
    writer.commit().unwrap();
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_uncommitted_work_is_discarded_on_close() {
    let table = unique_name("discarded");
    let relation = Ident::qualified("public", &table);

    let mut writer = db();
    writer
        .execute(&format!("CREATE TABLE {relation} (id integer)"), &[])
        .unwrap();
    writer.close();

    assert!(!summary_for(&table).table_or_view_exists().unwrap());
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_summary() {
    let report = summary_for("books").summary().unwrap();

    assert_eq!(report.target_name(), "public.books");
    assert_eq!(report.row_count, 2);
    assert!(report.source.is_none());
    let names: Vec<&str> = report.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["book_id", "book_title", "genre", "notes"]);

    let book_id = report.column("book_id").unwrap();
    assert_eq!(book_id.data_type, "character varying(100)");
    assert_eq!(book_id.null_count, 0);
    assert_eq!(book_id.distinct_count, 2);
    assert_eq!(
        book_id.distinct_values,
        Some(vec![json!("B001"), json!("B002")])
    );

    let notes = report.column("notes").unwrap();
    assert_eq!(notes.null_count, 1);
    assert_eq!(notes.distinct_count, 1);
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_summary_of_mixed_types() {
    let report = summary_for("typed_values").summary().unwrap();
    assert_eq!(report.row_count, 2);
    assert_eq!(report.columns.len(), 11);

    let amount = report.column("amount").unwrap();
    assert_eq!(amount.data_type, "numeric(10,2)");
    assert_eq!(
        amount.distinct_values,
        Some(vec![json!("7.00"), json!("12.50")])
    );

    let doc = report.column("doc").unwrap();
    assert_eq!(doc.data_type, "json");
    assert_eq!(doc.null_count, 0);
    assert_eq!(doc.distinct_count, 1);

    let location = report.column("location").unwrap();
    assert_eq!(location.data_type, "point");
    assert_eq!(location.distinct_count, 2);

    let missing = report.column("missing").unwrap();
    assert_eq!(missing.null_count, 2);
    assert_eq!(missing.distinct_count, 0);
    assert!(missing.distinct_values.is_none());
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_failed_statement_needs_rollback() {
    let db = db();
    assert!(!db.autocommit());
    let mut summary = PgSummary::new(db, Target::new("public", "books"));

    assert!(summary.db_mut().execute("SELEC 1", &[]).is_err());
    match summary.get_table_row_count() {
        Err(PgSummaryError::Query { code, .. }) => assert_eq!(code.as_deref(), Some("25P02")),
        other => panic!("expected aborted transaction, got {other:?}"),
    }

    summary.db_mut().rollback().unwrap();
    assert_eq!(summary.get_table_row_count().unwrap(), 2);
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_summary_limits_listed_values() {
    let report = summary_for("books")
        .with_max_listed_values(1)
        .summary()
        .unwrap();

    assert!(report.column("book_id").unwrap().distinct_values.is_none());
    assert_eq!(report.column("genre").unwrap().distinct_count, 2);
    assert_eq!(
        report.column("notes").unwrap().distinct_values,
        Some(vec![json!("An epic tale")])
    );
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_summary_with_source() {
    load_fixture();
    let target = Target::new("public", "book_genres").with_source(true);
    let report = PgSummary::connect(config(), target).summary().unwrap();

    let source = report.source.unwrap();
    assert_eq!(source.kind, RelationKind::View);
    assert!(source.definition.unwrap().contains("book_id"));
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_summary_zero_columns_is_degenerate() {
    let err = summary_for("no_columns").summary().unwrap_err();
    assert!(matches!(err, PgSummaryError::DegenerateTarget { .. }));
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn test_pgsummary_summary_missing_target() {
    let err = summary_for(&unique_name("no_table")).summary().unwrap_err();
    assert_eq!(err.validation_step(), Some(ValidationStep::RelationExists));
}
