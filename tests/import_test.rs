// ABOUTME: Integration tests for the importer against an in-memory SQLite table
// ABOUTME: Covers add, ignore-existing, update and addUpdate per-record outcomes

use rowsync::config::{ExistingRecCondition, ImportConfiguration, ImportStrategy};
use rowsync::config::{ExistingRecConditionRequest, Flag, ImportConfigurationRequest};
use rowsync::import::{validate_import, Importer};
use rowsync::reconcile::{RecordOutcome, RecordReconciler, STATUS_MISSING_IGNORED};
use rowsync::sqlite::SqliteSession;
use rowsync::{Record, Session, SyncError};
use serde_json::{json, Value};

/// SQLITE_CONSTRAINT_PRIMARYKEY
const PRIMARY_KEY_VIOLATION: i64 = 1555;
/// SQLITE_CONSTRAINT_UNIQUE
const UNIQUE_VIOLATION: i64 = 2067;

fn users_session() -> SqliteSession {
    let session = SqliteSession::open_in_memory().unwrap();
    session
        .execute_batch(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                name TEXT
            )",
        )
        .unwrap();
    session
}

fn records(value: Value) -> Vec<Record> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect()
}

fn request(import_type: &str) -> ImportConfigurationRequest {
    ImportConfigurationRequest {
        import_type: Some(import_type.to_string()),
        table: Some("users".to_string()),
        ignore_existing_records: None,
        ignore_missing_records: None,
        existing_rec_condition: Some(ExistingRecConditionRequest {
            condition: Some("email = ?".to_string()),
            col_field: Some(vec!["email".to_string()]),
        }),
    }
}

async fn import(
    session: &SqliteSession,
    request: &ImportConfigurationRequest,
    post: Value,
    pre: Option<Value>,
    max_concurrency: usize,
) -> Result<Vec<RecordOutcome>, SyncError> {
    let (config, batch) = validate_import(request, records(post), pre.map(records))?;
    Importer::new(session, max_concurrency)
        .import(&config, &batch)
        .await
}

async fn names(session: &SqliteSession) -> Vec<Value> {
    session
        .query("SELECT name FROM users ORDER BY id", vec![])
        .await
        .unwrap()
        .into_iter()
        .map(|r| r["name"].clone())
        .collect()
}

#[tokio::test]
async fn test_add_duplicate_key_fails_only_that_record() {
    let session = users_session();

    let outcomes = import(
        &session,
        &request("add"),
        json!([
            {"id": 1, "email": "a@example.com", "name": "a"},
            {"id": 1, "email": "b@example.com", "name": "b"}
        ]),
        None,
        1,
    )
    .await
    .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0], RecordOutcome::success(json!(1)));
    assert_eq!(outcomes[1].status_code, PRIMARY_KEY_VIOLATION);
    assert_eq!(outcomes[1].id, json!(-1));
}

#[tokio::test]
async fn test_add_siblings_succeed_around_failure() {
    let session = users_session();

    let outcomes = import(
        &session,
        &request("add"),
        json!([
            {"id": 10, "email": "a@example.com", "name": "a"},
            {"id": 11, "email": "a@example.com", "name": "dup"},
            {"id": 12, "email": "c@example.com", "name": "c"}
        ]),
        None,
        8,
    )
    .await
    .unwrap();

    assert_eq!(outcomes.len(), 3);
    let failed: Vec<_> = outcomes.iter().filter(|o| !o.is_success()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status_code, UNIQUE_VIOLATION);

    let rows = session.query("SELECT id FROM users", vec![]).await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_outcomes_keep_input_order_under_concurrency() {
    let session = users_session();
    let post: Vec<Value> = (1..=40)
        .map(|i| json!({"id": i, "email": format!("u{i}@example.com"), "name": format!("u{i}")}))
        .collect();

    let outcomes = import(&session, &request("add"), Value::Array(post), None, 4)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 40);
    for (idx, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome, &RecordOutcome::success(json!(idx as i64 + 1)));
    }
}

#[tokio::test]
async fn test_add_ignore_existing_returns_existing_key() {
    let session = users_session();
    session
        .execute_batch("INSERT INTO users (id, email, name) VALUES (7, 'known@example.com', 'old')")
        .unwrap();

    let mut request = request("add");
    request.ignore_existing_records = Some(Flag::Text("true".to_string()));

    let outcomes = import(
        &session,
        &request,
        json!([
            {"id": 100, "email": "known@example.com", "name": "ignored"},
            {"id": 101, "email": "new@example.com", "name": "fresh"}
        ]),
        None,
        2,
    )
    .await
    .unwrap();

    assert_eq!(outcomes[0], RecordOutcome::success(json!(7)));
    assert_eq!(outcomes[1], RecordOutcome::success(json!(101)));
    assert_eq!(names(&session).await, vec![json!("old"), json!("fresh")]);
}

#[tokio::test]
async fn test_update_ignore_missing_reports_missing() {
    let session = users_session();
    session
        .execute_batch("INSERT INTO users (id, email, name) VALUES (1, 'a@example.com', 'a')")
        .unwrap();

    let mut request = request("update");
    request.ignore_missing_records = Some(Flag::Bool(true));

    let outcomes = import(
        &session,
        &request,
        json!([
            {"id": 1, "email": "a@example.com", "name": "renamed"},
            {"id": 2, "email": "ghost@example.com", "name": "ghost"}
        ]),
        None,
        2,
    )
    .await
    .unwrap();

    assert_eq!(outcomes[0], RecordOutcome::success(json!(1)));
    assert_eq!(outcomes[1].status_code, STATUS_MISSING_IGNORED);
    assert_eq!(outcomes[1].id, json!(-1));
    assert_eq!(names(&session).await, vec![json!("renamed")]);
}

#[tokio::test]
async fn test_update_missing_not_ignored_fails_batch_after_all_records() {
    let session = users_session();
    session
        .execute_batch("INSERT INTO users (id, email, name) VALUES (1, 'a@example.com', 'a')")
        .unwrap();

    let mut request = request("update");
    request.ignore_missing_records = Some(Flag::Text("false".to_string()));

    let err = import(
        &session,
        &request,
        json!([
            {"id": 9, "email": "ghost@example.com", "name": "ghost"},
            {"id": 1, "email": "a@example.com", "name": "renamed"}
        ]),
        None,
        2,
    )
    .await
    .unwrap_err();

    match err {
        SyncError::MissingRecords { indices } => assert_eq!(indices, vec![0]),
        other => panic!("unexpected error: {other:?}"),
    }
    // The matching record was still applied
    assert_eq!(names(&session).await, vec![json!("renamed")]);
}

#[tokio::test]
async fn test_update_reports_pre_map_key() {
    let session = users_session();
    session
        .execute_batch("INSERT INTO users (id, email, name) VALUES (5, 'a@example.com', 'a')")
        .unwrap();

    let mut request = request("update");
    request.ignore_missing_records = Some(Flag::Bool(true));

    let outcomes = import(
        &session,
        &request,
        json!([{"id": 5, "email": "a@example.com", "name": "b"}]),
        Some(json!([{"id": "crm-5", "email": "a@example.com"}])),
        1,
    )
    .await
    .unwrap();

    assert_eq!(outcomes, vec![RecordOutcome::success(json!("crm-5"))]);
}

#[tokio::test]
async fn test_add_update_inserts_or_updates() {
    let session = users_session();
    session
        .execute_batch("INSERT INTO users (id, email, name) VALUES (3, 'a@example.com', 'a')")
        .unwrap();

    let outcomes = import(
        &session,
        &request("addUpdate"),
        json!([
            {"id": 3, "email": "a@example.com", "name": "updated"},
            {"id": 4, "email": "b@example.com", "name": "inserted"}
        ]),
        None,
        2,
    )
    .await
    .unwrap();

    assert_eq!(outcomes[0], RecordOutcome::success(json!(3)));
    assert_eq!(outcomes[1], RecordOutcome::success(json!(4)));
    assert_eq!(
        names(&session).await,
        vec![json!("updated"), json!("inserted")]
    );
}

#[tokio::test]
async fn test_key_column_missing_from_mapping_is_rejected() {
    let session = users_session();

    let err = import(
        &session,
        &request("add"),
        json!([{"email": "a@example.com", "name": "a"}]),
        None,
        1,
    )
    .await
    .unwrap_err();

    assert!(err.is_validation());
    assert!(err.to_string().contains("key field missing in mapping"));
}

#[tokio::test]
async fn test_reconciler_accepts_typed_configuration() {
    let session = users_session();
    let config = ImportConfiguration {
        table: "users".to_string(),
        strategy: ImportStrategy::AddIgnoreExisting {
            condition: ExistingRecCondition {
                condition: "email = ?".to_string(),
                col_field: vec!["email".to_string()],
            },
        },
    };
    let (_, batch) = validate_import(
        &request("add"),
        records(json!([{"id": 1, "email": "x@example.com", "name": "x"}])),
        None,
    )
    .unwrap();

    let outcomes = Importer::new(&session, 1)
        .import(&config, &batch)
        .await
        .unwrap();
    assert_eq!(outcomes, vec![RecordOutcome::success(json!(1))]);
}

#[tokio::test]
async fn test_insert_primitive_isolates_rows() {
    let session = users_session();
    let columns = vec!["email".to_string(), "name".to_string()];
    let rows = records(json!([
        {"email": "a@example.com", "name": "a"},
        {"email": "a@example.com", "name": "dup"},
        {"email": "b@example.com", "name": "b"}
    ]));

    let outcomes = RecordReconciler::new(&session, 1)
        .insert("users", "id", &columns, &rows)
        .await
        .unwrap();

    assert_eq!(outcomes[0], RecordOutcome::success(json!(1)));
    assert_eq!(outcomes[1].status_code, UNIQUE_VIOLATION);
    assert_eq!(outcomes[2], RecordOutcome::success(json!(2)));
}

fn id_condition() -> Option<ExistingRecConditionRequest> {
    Some(ExistingRecConditionRequest {
        condition: Some("id = ?".to_string()),
        col_field: Some(vec!["id".to_string()]),
    })
}

fn seed_two(session: &SqliteSession) {
    session
        .execute_batch(
            "INSERT INTO users (id, email, name) VALUES
                (1, 'a@example.com', 'a'),
                (2, 'b@example.com', 'b')",
        )
        .unwrap();
}

#[tokio::test]
async fn test_add_ignore_existing_lookup_error_skips_insert() {
    let session = users_session();

    let mut request = request("add");
    request.ignore_existing_records = Some(Flag::Bool(true));
    request.existing_rec_condition = Some(ExistingRecConditionRequest {
        condition: Some("no_such_col = ?".to_string()),
        col_field: Some(vec!["email".to_string()]),
    });

    let outcomes = import(
        &session,
        &request,
        json!([
            {"id": 1, "email": "a@example.com", "name": "a"},
            {"id": 2, "email": "b@example.com", "name": "b"}
        ]),
        None,
        2,
    )
    .await
    .unwrap();

    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert!(!outcome.is_success());
        assert_ne!(outcome.status_code, 200);
        assert_eq!(outcome.id, json!(-1));
    }
    // A failed lookup never falls through to the insert
    assert!(names(&session).await.is_empty());
}

#[tokio::test]
async fn test_update_error_isolated_to_its_record() {
    let session = users_session();
    seed_two(&session);

    let mut request = request("update");
    request.ignore_missing_records = Some(Flag::Bool(true));
    request.existing_rec_condition = id_condition();

    let outcomes = import(
        &session,
        &request,
        json!([
            {"id": 1, "email": "b@example.com", "name": "x"},
            {"id": 2, "email": "b@example.com", "name": "y"}
        ]),
        None,
        2,
    )
    .await
    .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].status_code, UNIQUE_VIOLATION);
    assert_eq!(outcomes[0].id, json!(-1));
    assert_eq!(outcomes[1], RecordOutcome::success(json!(2)));
    assert_eq!(names(&session).await, vec![json!("a"), json!("y")]);
}

#[tokio::test]
async fn test_add_update_error_does_not_fall_back_to_insert() {
    let session = users_session();
    seed_two(&session);

    let mut request = request("addUpdate");
    request.existing_rec_condition = id_condition();

    let outcomes = import(
        &session,
        &request,
        json!([
            {"id": 1, "email": "b@example.com", "name": "x"},
            {"id": 3, "email": "c@example.com", "name": "z"}
        ]),
        None,
        2,
    )
    .await
    .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].status_code, UNIQUE_VIOLATION);
    assert_eq!(outcomes[0].id, json!(-1));
    assert_eq!(outcomes[1], RecordOutcome::success(json!(3)));
    assert_eq!(
        names(&session).await,
        vec![json!("a"), json!("b"), json!("z")]
    );
}
