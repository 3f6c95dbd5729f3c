//! SQL text for reading, updating and truncating anonymized tables
//!
//! Values travel as text in both directions: the reader selects every column
//! with `::text` and the writer ships one `text[]` per column through
//! `unnest`, casting back to the column's catalog type on the server.
//! [`decode_value`] and [`encode_value`] are the two halves of that codec.

use crate::domain::errors::PgMaskError;
use crate::domain::ids::{quote_ident, TableName};
use crate::domain::row::{value_as_text, ColumnInfo, ReadPlan, TransformedBatch, WritePlan};
use crate::domain::Result;
use serde_json::Value;

/// Columns of a table in attribute order with their rendered types
pub const COLUMNS_QUERY: &str = "\
SELECT a.attname::text, format_type(a.atttypid, a.atttypmod)
FROM pg_catalog.pg_attribute a
JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = $1 AND c.relname = $2
  AND c.relkind IN ('r', 'p')
  AND a.attnum > 0 AND NOT a.attisdropped
ORDER BY a.attnum";

/// Primary key columns of a table in key order
pub const PRIMARY_KEY_QUERY: &str = "\
SELECT a.attname::text
FROM pg_catalog.pg_index i
JOIN pg_catalog.pg_class c ON c.oid = i.indrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY(i.indkey)
WHERE n.nspname = $1 AND c.relname = $2 AND i.indisprimary
ORDER BY array_position(i.indkey::int2[], a.attnum)";

/// `SELECT` for a streaming read; key columns come first
pub fn select_rows(plan: &ReadPlan) -> String {
    let projection: Vec<String> = plan
        .key_columns
        .iter()
        .chain(plan.columns.iter())
        .map(|c| format!("{}::text", quote_ident(&c.name)))
        .collect();

    let mut sql = format!(
        "SELECT {} FROM {}",
        projection.join(", "),
        plan.table.quoted()
    );
    if let Some(filter) = plan.filter.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
        sql.push_str(&format!(" WHERE ({filter})"));
    }
    sql
}

/// Set-based `UPDATE ... FROM unnest(...)` for one batch
///
/// Parameters are `$1..$k` for the key columns followed by one per target
/// column, each a `text[]` as produced by [`update_parameters`].
pub fn update_rows(plan: &WritePlan) -> String {
    let keys = plan.key_columns.len();
    let targets = plan.target_columns.len();

    let assignments: Vec<String> = plan
        .target_columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = s.v{i}::{}", quote_ident(&c.name), c.data_type))
        .collect();

    let arrays: Vec<String> = (1..=keys + targets).map(|p| format!("${p}::text[]")).collect();

    let aliases: Vec<String> = (0..keys)
        .map(|i| format!("k{i}"))
        .chain((0..targets).map(|i| format!("v{i}")))
        .collect();

    let join: Vec<String> = plan
        .key_columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("t.{} = s.k{i}::{}", quote_ident(&c.name), c.data_type))
        .collect();

    format!(
        "UPDATE {} AS t SET {} FROM unnest({}) AS s({}) WHERE {}",
        plan.table.quoted(),
        assignments.join(", "),
        arrays.join(", "),
        aliases.join(", "),
        join.join(" AND ")
    )
}

/// Column-major text arrays matching the placeholders of [`update_rows`]
pub fn update_parameters(plan: &WritePlan, batch: &TransformedBatch) -> Vec<Vec<Option<String>>> {
    let keys = plan.key_columns.len();
    let mut columns: Vec<Vec<Option<String>>> =
        vec![Vec::with_capacity(batch.rows.len()); keys + plan.target_columns.len()];

    for row in &batch.rows {
        for (i, key) in row.key.iter().take(keys).enumerate() {
            columns[i].push(Some(key.clone()));
        }
        for (i, (column, value)) in plan.target_columns.iter().zip(&row.values).enumerate() {
            columns[keys + i].push(encode_value(column, value));
        }
    }
    columns
}

/// json/jsonb text is parsed; every other type stays a string
pub fn decode_value(column: &ColumnInfo, text: Option<String>) -> Result<Value> {
    match text {
        None => Ok(Value::Null),
        Some(text) if column.is_json() => serde_json::from_str(&text).map_err(|e| {
            PgMaskError::Serialization(format!("Column '{}' holds invalid JSON: {e}", column.name))
        }),
        Some(text) => Ok(Value::String(text)),
    }
}

/// Text handed to the `::type` cast of [`update_rows`], `None` for NULL
///
/// json/jsonb columns get a JSON document, so a string value is quoted.
pub fn encode_value(column: &ColumnInfo, value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        value if column.is_json() => Some(value.to_string()),
        value => value_as_text(value).map(|v| v.into_owned()),
    }
}

/// One `TRUNCATE` covering every table
pub fn truncate_tables(tables: &[TableName], cascade: bool) -> String {
    let names: Vec<String> = tables.iter().map(TableName::quoted).collect();
    let mut sql = format!("TRUNCATE TABLE {}", names.join(", "));
    if cascade {
        sql.push_str(" CASCADE");
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::row::{ColumnInfo, UpdatedRow};
    use serde_json::json;

    fn users() -> TableName {
        "users".parse().unwrap()
    }

    #[test]
    fn test_select_rows() {
        let plan = ReadPlan {
            table: users(),
            key_columns: vec![ColumnInfo::new("id", "integer")],
            columns: vec![
                ColumnInfo::new("email", "character varying(255)"),
                ColumnInfo::new("profile", "jsonb"),
            ],
            filter: None,
            batch_size: 100,
        };
        assert_eq!(
            select_rows(&plan),
            r#"SELECT "id"::text, "email"::text, "profile"::text FROM "public"."users""#
        );
    }

    #[test]
    fn test_select_rows_with_filter() {
        let plan = ReadPlan {
            table: "crm.accounts".parse().unwrap(),
            key_columns: vec![ColumnInfo::new("id", "bigint")],
            columns: vec![ColumnInfo::new("name", "text")],
            filter: Some("  created_at < '2020-01-01' ".to_string()),
            batch_size: 10,
        };
        assert_eq!(
            select_rows(&plan),
            r#"SELECT "id"::text, "name"::text FROM "crm"."accounts" WHERE (created_at < '2020-01-01')"#
        );
    }

    #[test]
    fn test_update_rows_composite_key() {
        let plan = WritePlan {
            table: "orders".parse().unwrap(),
            key_columns: vec![
                ColumnInfo::new("tenant", "text"),
                ColumnInfo::new("id", "integer"),
            ],
            target_columns: vec![ColumnInfo::new("email", "character varying(255)")],
        };
        assert_eq!(
            update_rows(&plan),
            "UPDATE \"public\".\"orders\" AS t SET \"email\" = s.v0::character varying(255) \
             FROM unnest($1::text[], $2::text[], $3::text[]) AS s(k0, k1, v0) \
             WHERE t.\"tenant\" = s.k0::text AND t.\"id\" = s.k1::integer"
        );
    }

    #[test]
    fn test_update_parameters_column_major() {
        let plan = WritePlan {
            table: users(),
            key_columns: vec![ColumnInfo::new("id", "integer")],
            target_columns: vec![
                ColumnInfo::new("email", "text"),
                ColumnInfo::new("profile", "jsonb"),
            ],
        };
        let batch = TransformedBatch {
            rows: vec![
                UpdatedRow {
                    key: vec!["1".into()],
                    values: vec![json!("a@example.com"), json!({"city": "Rome"})],
                },
                UpdatedRow {
                    key: vec!["2".into()],
                    values: vec![json!(null), json!({"city": null})],
                },
            ],
            ..Default::default()
        };

        let params = update_parameters(&plan, &batch);
        assert_eq!(params.len(), 3);
        assert_eq!(params[0], vec![Some("1".into()), Some("2".into())]);
        assert_eq!(params[1], vec![Some("a@example.com".into()), None]);
        assert_eq!(
            params[2],
            vec![
                Some(r#"{"city":"Rome"}"#.into()),
                Some(r#"{"city":null}"#.into())
            ]
        );
    }

    #[test]
    fn test_decode_value() {
        let text = ColumnInfo::new("email", "text");
        let jsonb = ColumnInfo::new("profile", "jsonb");

        assert_eq!(decode_value(&text, None).unwrap(), Value::Null);
        assert_eq!(
            decode_value(&text, Some("{\"a\":1}".into())).unwrap(),
            json!("{\"a\":1}")
        );
        assert_eq!(
            decode_value(&jsonb, Some("{\"a\": 1}".into())).unwrap(),
            json!({"a": 1})
        );
        assert!(decode_value(&jsonb, Some("{oops".into())).is_err());
    }

    #[test]
    fn test_untouched_values_round_trip() {
        let cases = [
            (ColumnInfo::new("email", "text"), "a@example.com"),
            (ColumnInfo::new("age", "integer"), "42"),
            (ColumnInfo::new("born", "date"), "1990-05-17"),
            (ColumnInfo::new("active", "boolean"), "t"),
            (ColumnInfo::new("profile", "jsonb"), r#""hello""#),
            (ColumnInfo::new("profile", "jsonb"), "42"),
            (ColumnInfo::new("profile", "json"), "[1,\"two\",null]"),
            (
                ColumnInfo::new("profile", "jsonb"),
                r#"{"big":12345678901234567890123,"price":1.10}"#,
            ),
        ];

        for (column, text) in cases {
            let value = decode_value(&column, Some(text.to_string())).unwrap();
            assert_eq!(
                encode_value(&column, &value).as_deref(),
                Some(text),
                "{} ({})",
                column.name,
                column.data_type
            );
        }

        let jsonb = ColumnInfo::new("profile", "jsonb");
        let value = decode_value(&jsonb, None).unwrap();
        assert_eq!(encode_value(&jsonb, &value), None);
    }

    #[test]
    fn test_encode_json_column_quotes_strings() {
        let jsonb = ColumnInfo::new("profile", "jsonb");
        let text = ColumnInfo::new("name", "text");

        assert_eq!(encode_value(&jsonb, &json!("x")).as_deref(), Some(r#""x""#));
        assert_eq!(encode_value(&text, &json!("x")).as_deref(), Some("x"));
        assert_eq!(encode_value(&jsonb, &json!(null)), None);
    }

    #[test]
    fn test_update_parameters_after_sub_field_rewrite() {
        let jsonb = ColumnInfo::new("profile", "jsonb");
        let mut profile = decode_value(
            &jsonb,
            Some(r#"{"big":12345678901234567890123,"phone":"555","price":1.10}"#.into()),
        )
        .unwrap();
        profile["phone"] = json!("XXX");

        let plan = WritePlan {
            table: users(),
            key_columns: vec![
                ColumnInfo::new("tenant", "text"),
                ColumnInfo::new("id", "integer"),
            ],
            target_columns: vec![jsonb, ColumnInfo::new("nickname", "text")],
        };
        let batch = TransformedBatch {
            rows: vec![UpdatedRow {
                key: vec!["acme".into(), "7".into()],
                values: vec![profile, json!(null)],
            }],
            ..Default::default()
        };

        let params = update_parameters(&plan, &batch);
        assert_eq!(params[0], vec![Some("acme".into())]);
        assert_eq!(params[1], vec![Some("7".into())]);
        assert_eq!(
            params[2],
            vec![Some(
                r#"{"big":12345678901234567890123,"phone":"XXX","price":1.10}"#.into()
            )]
        );
        assert_eq!(params[3], vec![None]);
    }

    #[test]
    fn test_truncate_tables() {
        let tables = vec![users(), "audit.events".parse().unwrap()];
        assert_eq!(
            truncate_tables(&tables, true),
            r#"TRUNCATE TABLE "public"."users", "audit"."events" CASCADE"#
        );
        assert_eq!(
            truncate_tables(&tables[..1], false),
            r#"TRUNCATE TABLE "public"."users""#
        );
    }
}
