//! Integration tests for the anonymization pipeline
//!
//! Every test runs the full orchestrator (compile, stream, transform, write)
//! against the in-memory database from `common`.

mod common;

use common::{options, run, users, MockDatabase};
use pgmask::config::FailurePolicy;
use pgmask::core::summary::{exit_code, TableState};
use pgmask::domain::PgMaskError;
use serde_json::{json, Value};
use std::sync::Arc;

const SEEDED_USERS: &str = r#"
tables:
  - table: public.users
    primary_key: id
    columns:
      - column: email
        provider: { name: fake.email, seed: 42 }
      - column: name
        provider: { name: md5 }
      - column: phone
        provider: { name: partial_mask, unmasked_right: 2 }
"#;

#[tokio::test]
async fn test_seeded_email_differs_and_is_reproducible() {
    let yaml = r#"
tables:
  - table: users
    columns:
      - column: email
        provider: { name: fake.email, seed: 42 }
"#;
    let first = Arc::new(users(10));
    let originals = first.column("users", "email");

    let summary = run(&first, yaml, options(1)).await.unwrap();
    assert!(summary.is_successful());
    assert_eq!(summary.exit_code(), exit_code::SUCCESS);
    assert_eq!(summary.results[0].rows_updated, 10);
    assert_eq!(summary.results[0].batches_committed, 10);

    let anonymized = first.column("users", "email");
    for (before, after) in originals.iter().zip(&anonymized) {
        assert_ne!(before, after);
        assert!(after.as_str().unwrap().contains('@'));
    }

    let second = Arc::new(users(10));
    run(&second, yaml, options(1)).await.unwrap();
    assert_eq!(second.column("users", "email"), anonymized);
}

#[tokio::test]
async fn test_batch_size_does_not_change_the_result() {
    let mut results = Vec::new();
    for batch_size in [1, 3, 7, 1000] {
        let db = Arc::new(users(20));
        let summary = run(&db, SEEDED_USERS, options(batch_size)).await.unwrap();

        let result = &summary.results[0];
        assert_eq!(result.state, TableState::Done);
        assert_eq!(result.rows_read, 20);
        assert_eq!(result.rows_updated, 20);
        assert_eq!(result.batches_committed as usize, 20usize.div_ceil(batch_size));
        results.push(db.rows("public.users"));
    }

    assert!(results.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn test_null_values_pass_through_unless_provider_handles_null() {
    let yaml = r#"
tables:
  - table: users
    columns:
      - column: phone
        provider: { name: mask }
      - column: name
        provider: { name: set_null }
"#;
    let db = Arc::new(users(6));
    run(&db, yaml, options(4)).await.unwrap();

    let phones = db.column("users", "phone");
    assert_eq!(phones[2], Value::Null);
    assert_eq!(phones[5], Value::Null);
    assert_eq!(phones[0], json!("XXXXXXXXXXXX"));

    assert!(db.column("users", "name").iter().all(Value::is_null));
}

#[tokio::test]
async fn test_excluded_rows_are_left_untouched() {
    let yaml = r#"
tables:
  - table: users
    excludes:
      - column: email
        patterns: ["^user1@", "^user4@"]
    columns:
      - column: name
        provider: { name: set, value: redacted }
"#;
    let db = Arc::new(users(5));
    let summary = run(&db, yaml, options(2)).await.unwrap();

    assert_eq!(summary.results[0].rows_skipped, 2);
    assert_eq!(summary.results[0].rows_updated, 3);
    assert_eq!(
        db.column("users", "name"),
        vec![
            json!("User 1"),
            json!("redacted"),
            json!("redacted"),
            json!("User 4"),
            json!("redacted"),
        ]
    );
}

#[tokio::test]
async fn test_skip_when_condition_uses_original_row() {
    let db = Arc::new(MockDatabase::new().with_table(
        "accounts",
        &[("id", "bigint"), ("role", "text"), ("owner", "text")],
        &["id"],
        vec![
            json!({"id": 1, "role": "admin", "owner": "root"}),
            json!({"id": 2, "role": "member", "owner": "alice"}),
        ],
    ));
    let yaml = r#"
tables:
  - table: accounts
    columns:
      - column: owner
        provider: { name: set, value: anonymous }
        skip_when: { column: role, equals: admin }
      - column: role
        provider: { name: set, value: member }
"#;
    run(&db, yaml, options(10)).await.unwrap();

    assert_eq!(db.column("accounts", "owner"), vec![json!("root"), json!("anonymous")]);
    assert_eq!(db.column("accounts", "role"), vec![json!("member"), json!("member")]);
}

#[tokio::test]
async fn test_json_sub_field_is_rewritten_in_place() {
    let db = Arc::new(MockDatabase::new().with_table(
        "profiles",
        &[("id", "integer"), ("data", "jsonb")],
        &["id"],
        vec![
            json!({"id": 1, "data": {"contact": {"email": "a@b.c"}, "theme": "dark"}}),
            json!({"id": 2, "data": {"theme": "light"}}),
        ],
    ));
    let yaml = r#"
tables:
  - table: profiles
    columns:
      - column: data.contact.email
        provider: { name: set, value: hidden@example.com }
"#;
    run(&db, yaml, options(10)).await.unwrap();

    let data = db.column("profiles", "data");
    assert_eq!(
        data[0],
        json!({"contact": {"email": "hidden@example.com"}, "theme": "dark"})
    );
    assert_eq!(
        data[1],
        json!({"contact": {"email": "hidden@example.com"}, "theme": "light"})
    );
}

#[tokio::test]
async fn test_jsonb_documents_survive_the_write_back() {
    let priced: Value =
        serde_json::from_str(r#"{"big":12345678901234567890123,"phone":"555","price":1.10}"#)
            .unwrap();
    let db = Arc::new(MockDatabase::new().with_table(
        "profiles",
        &[("id", "integer"), ("data", "jsonb")],
        &["id"],
        vec![
            json!({"id": 1, "data": "hello"}),
            json!({"id": 2, "data": priced}),
        ],
    ));
    let yaml = r#"
tables:
  - table: profiles
    columns:
      - column: data.phone
        provider: { name: mask }
"#;
    let summary = run(&db, yaml, options(10)).await.unwrap();
    assert!(summary.is_successful());

    let data = db.column("profiles", "data");
    assert_eq!(data[0], json!("hello"));
    assert_eq!(
        data[1].to_string(),
        r#"{"big":12345678901234567890123,"phone":"XXX","price":1.10}"#
    );
}

#[tokio::test]
async fn test_whole_jsonb_column_set_to_string() {
    let db = Arc::new(MockDatabase::new().with_table(
        "profiles",
        &[("id", "integer"), ("data", "jsonb")],
        &["id"],
        vec![json!({"id": 1, "data": {"theme": "dark"}})],
    ));
    let yaml = r#"
tables:
  - table: profiles
    columns:
      - column: data
        provider: { name: set, value: x }
"#;
    let summary = run(&db, yaml, options(10)).await.unwrap();

    assert_eq!(summary.results[0].state, TableState::Done);
    assert_eq!(db.column("profiles", "data"), vec![json!("x")]);
}

#[tokio::test]
async fn test_sequences_count_per_column() {
    let db = Arc::new(
        MockDatabase::new()
            .with_table(
                "orders",
                &[("id", "integer"), ("ref", "integer")],
                &["id"],
                vec![json!({"id": 1, "ref": 90}), json!({"id": 2, "ref": 91})],
            )
            .with_table(
                "invoices",
                &[("id", "integer"), ("ref", "integer")],
                &["id"],
                vec![json!({"id": 1, "ref": 70}), json!({"id": 2, "ref": 71})],
            ),
    );
    let yaml = r#"
tables:
  - table: orders
    columns:
      - column: ref
        provider: { name: sequence }
  - table: invoices
    columns:
      - column: ref
        provider: { name: sequence }
"#;
    let summary = run(&db, yaml, options(10)).await.unwrap();
    assert!(summary.is_successful());

    assert_eq!(db.column("orders", "ref"), vec![json!("1"), json!("2")]);
    assert_eq!(db.column("invoices", "ref"), vec![json!("1"), json!("2")]);
}

#[tokio::test]
async fn test_fail_fast_aborts_run_on_provider_error() {
    let db = Arc::new(
        MockDatabase::new()
            .with_table(
                "people",
                &[("id", "integer"), ("born", "text")],
                &["id"],
                vec![
                    json!({"id": 1, "born": "1980-05-17"}),
                    json!({"id": 2, "born": "garbage"}),
                    json!({"id": 3, "born": "1991-01-02"}),
                ],
            )
            .with_table(
                "notes",
                &[("id", "integer"), ("body", "text")],
                &["id"],
                vec![json!({"id": 1, "body": "secret"})],
            ),
    );
    let yaml = r#"
tables:
  - table: people
    columns:
      - column: born
        provider: { name: sameyear, seed: 7 }
  - table: notes
    columns:
      - column: body
        provider: { name: clear }
"#;
    let opts = options(1);
    assert_eq!(opts.failure_policy, FailurePolicy::FailFast);
    assert!(!opts.stop_on_first_error);
    let summary = run(&db, yaml, opts).await.unwrap();

    let result = &summary.results[0];
    assert_eq!(result.state, TableState::Failed);
    assert!(matches!(result.error, Some(PgMaskError::ProviderExecution(_))));
    assert_eq!(result.batches_committed, 1);
    assert_eq!(summary.exit_code(), exit_code::PARTIAL_FAILURE);

    let born = db.column("people", "born");
    assert!(born[0].as_str().unwrap().starts_with("1980-"));
    assert_eq!(born[1], json!("garbage"));
    assert_eq!(born[2], json!("1991-01-02"));

    assert_eq!(summary.results[1].state, TableState::Failed);
    assert!(matches!(summary.results[1].error, Some(PgMaskError::Aborted(_))));
    assert_eq!(db.column("notes", "body"), vec![json!("secret")]);
}

#[tokio::test]
async fn test_skip_row_policy_records_failure_and_continues() {
    let db = Arc::new(MockDatabase::new().with_table(
        "people",
        &[("id", "integer"), ("born", "text")],
        &["id"],
        vec![
            json!({"id": 1, "born": "1980-05-17"}),
            json!({"id": 2, "born": "garbage"}),
            json!({"id": 3, "born": "1991-01-02"}),
        ],
    ));
    let yaml = r#"
tables:
  - table: people
    columns:
      - column: born
        provider: { name: sameyear, seed: 7 }
"#;
    let mut opts = options(10);
    opts.failure_policy = FailurePolicy::SkipRow;
    let summary = run(&db, yaml, opts).await.unwrap();

    let result = &summary.results[0];
    assert_eq!(result.state, TableState::Done);
    assert_eq!(result.rows_updated, 2);
    assert_eq!(result.rows_skipped, 1);
    assert_eq!(result.row_failures.len(), 1);
    assert_eq!(result.row_failures[0].primary_key, vec!["2".to_string()]);
    assert_eq!(result.row_failures[0].column, "born");

    let born = db.column("people", "born");
    assert_eq!(born[1], json!("garbage"));
    assert!(born[2].as_str().unwrap().starts_with("1991-"));
}

#[tokio::test]
async fn test_unknown_column_fails_table_before_any_write() {
    let yaml = r#"
tables:
  - table: users
    columns:
      - column: social_security_number
        provider: { name: mask }
  - table: users_archive
    columns:
      - column: email
        provider: { name: mask }
"#;
    let db = Arc::new(users(4));
    let summary = run(&db, yaml, options(2)).await.unwrap();

    assert_eq!(summary.results.len(), 2);
    for result in &summary.results {
        assert_eq!(result.state, TableState::Failed);
        assert!(matches!(
            result.error,
            Some(PgMaskError::SchemaMismatch { .. })
        ));
        assert_eq!(result.rows_read, 0);
    }
    assert_eq!(db.write_attempts(), 0);
    assert_eq!(db.column("users", "email")[0], json!("user1@example.com"));
}

#[tokio::test]
async fn test_unknown_strategy_aborts_run_before_anything_runs() {
    let yaml = r#"
truncate: [users]
tables:
  - table: users
    columns:
      - column: email
        provider: { name: does_not_exist }
"#;
    let db = Arc::new(users(3));
    let error = run(&db, yaml, options(10)).await.unwrap_err();

    assert!(matches!(error, PgMaskError::UnknownStrategy(_)));
    assert!(db.truncations().is_empty());
    assert_eq!(db.rows("users").len(), 3);
}

#[tokio::test]
async fn test_truncation_runs_once_before_tables() {
    let db = Arc::new(
        users(3)
            .with_table("sessions", &[("id", "integer")], &["id"], vec![json!({"id": 1})])
            .with_table("audit.events", &[("id", "integer")], &["id"], vec![json!({"id": 9})]),
    );
    let yaml = r#"
truncate: [sessions]
tables:
  - table: audit.events
    truncate: true
  - table: users
    columns:
      - column: email
        provider: { name: md5 }
"#;
    let summary = run(&db, yaml, options(10)).await.unwrap();

    let truncations = db.truncations();
    assert_eq!(truncations.len(), 1);
    let (tables, cascade) = &truncations[0];
    assert_eq!(
        tables.iter().map(ToString::to_string).collect::<Vec<_>>(),
        vec!["public.sessions", "audit.events"]
    );
    assert!(!cascade);

    assert_eq!(summary.truncated.len(), 2);
    assert!(summary.results[0].truncated);
    assert_eq!(summary.results[0].state, TableState::Done);
    assert!(summary.is_successful());
    assert!(db.rows("sessions").is_empty());
}

#[tokio::test]
async fn test_init_sql_runs_before_anonymization() {
    let db = Arc::new(users(2));
    let mut opts = options(10);
    opts.init_sql = Some("SET search_path = public".into());
    let yaml = r##"
tables:
  - table: users
    columns:
      - column: name
        provider: { name: mask, sign: "#" }
"##;
    run(&db, yaml, opts).await.unwrap();

    assert_eq!(db.executed(), vec!["SET search_path = public".to_string()]);
    assert_eq!(db.column("users", "name")[0], json!("######"));
}

#[tokio::test]
async fn test_parallel_tables_keep_declared_order() {
    let db = Arc::new(
        users(5)
            .with_table(
                "orders",
                &[("id", "integer"), ("note", "text")],
                &["id"],
                (1..=8).map(|i| json!({"id": i, "note": "call me"})).collect(),
            ),
    );
    let yaml = r#"
tables:
  - table: orders
    columns:
      - column: note
        provider: { name: clear }
  - table: users
    columns:
      - column: email
        provider: { name: hash, salt: pepper }
"#;
    let mut opts = options(3);
    opts.parallel_tables = 2;
    let summary = run(&db, yaml, opts).await.unwrap();

    let order: Vec<String> = summary.results.iter().map(|r| r.table.to_string()).collect();
    assert_eq!(order, vec!["public.orders", "public.users"]);
    assert_eq!(summary.total_rows_updated(), 13);
    assert!(db.column("orders", "note").iter().all(Value::is_null));
}
