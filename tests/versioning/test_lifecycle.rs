//! Load, execute and reload scenarios.

use dbversioning_lib::models::FailureKind;
use dbversioning_lib::services::MemoryScriptSource;
use dbversioning_lib::services::versioning::{
    DATABASE_MISSING_MESSAGE, DATABASE_NEEDS_UPDATE_MESSAGE, DATABASE_UP_TO_DATE_MESSAGE,
};
use sea_orm::{DbErr, MockExecResult};

use super::test_helpers::*;

fn exec_ok() -> MockExecResult {
    MockExecResult {
        last_insert_id: 0,
        rows_affected: 1,
    }
}

/// Unapplied script is required, executes once, then reloads as applied.
#[tokio::test]
async fn test_required_script_applied_then_up_to_date() {
    let source = MemoryScriptSource::new()
        .with(
            resource(1234, "Schema", "Create"),
            script_body("Create Table Foo", 2, "CREATE TABLE foo (id INT);"),
        )
        .with(
            integrity_resource("OrphanOrders"),
            "SELECT '@MESSAGE::No orphan orders';",
        );
    let db = postgres()
        // first load: nothing applied yet
        .append_query_results([no_rows()])
        // audit row for the executed script
        .append_exec_results([exec_ok()])
        .append_query_results([id_row(1)])
        // reload after execution, then the integrity check
        .append_query_results([versioning_rows(&[1234])])
        .append_query_results([output_rows(&["@MESSAGE::No orphan orders"])]);
    let service = create_service(db, true, source);

    let before = service.check_versioning_status().await.unwrap();
    assert!(before.success);
    assert_eq!(before.info, DATABASE_NEEDS_UPDATE_MESSAGE);
    let status = before.data.unwrap();
    assert!(status.database_needs_update);
    assert!(status.scripts[0].execution_required);
    assert_eq!(status.scripts[0].id, 1234);

    let result = service.execute_schema_updates().await.unwrap();
    assert!(result.success, "unexpected failure: {:?}", result);
    assert_eq!(result.info, "1 schema script(s) executed");

    let after = service.controller().versioning_status().await;
    assert!(!after.database_needs_update);
    let applied = &after.scripts[0];
    assert!(!applied.execution_required);
    assert_eq!(applied.impacted_date, Some(applied_at()));

    let integrity = &after.scripts[1];
    assert_eq!(integrity.messages, vec!["No orphan orders".to_string()]);

    let snapshot = service.snapshot().await;
    assert_eq!(snapshot.application_server, "test-server");
    assert_eq!(snapshot.database_info.unwrap().name, "orders");
    assert!(!snapshot.versioning_status.unwrap().database_needs_update);
}

/// Running the schema batch again executes nothing.
#[tokio::test]
async fn test_schema_updates_are_idempotent() {
    let source = MemoryScriptSource::new().with(
        resource(1, "Schema", "Users"),
        script_body("Create users", 1, "CREATE TABLE users (id INT);"),
    );
    let db = postgres()
        .append_query_results([no_rows()])
        .append_exec_results([exec_ok()])
        .append_query_results([id_row(1)])
        .append_query_results([versioning_rows(&[1])])
        .append_query_results([versioning_rows(&[1])]);
    let conn = db.into_connection();
    let service = create_service_on(conn.clone(), true, source);

    let first = service.execute_schema_updates().await.unwrap();
    assert_eq!(first.info, "1 schema script(s) executed");
    let first_run = drain_statements(&conn);
    assert!(first_run.iter().any(|sql| sql.contains("CREATE TABLE users")));

    let second = service.execute_schema_updates().await.unwrap();
    assert!(second.success);
    assert_eq!(second.info, "0 schema script(s) executed");
    let second_run = drain_statements(&conn);
    assert!(!second_run.is_empty());
    assert!(
        second_run.iter().all(|sql| sql.trim_start().starts_with("SELECT")),
        "second run wrote to the database: {:?}",
        second_run
    );

    let status = service.controller().versioning_status().await;
    assert!(!status.database_needs_update);
}

/// A failing script stops the batch; later scripts stay pending.
#[tokio::test]
async fn test_pending_batch_stops_at_first_failure() {
    let source = MemoryScriptSource::new()
        .with(
            resource(1, "Schema", "Users"),
            script_body("Create users", 1, "CREATE TABLE users (id INT);"),
        )
        .with(
            resource(2, "Data", "Roles"),
            script_body("Seed roles", 1, "INSERT INTO roles VALUES (1);"),
        )
        .with(
            resource(3, "Schema", "Index"),
            script_body("Index users", 1, "CREATE INDEX ix ON users (id);"),
        );
    let db = postgres()
        .append_query_results([no_rows()])
        .append_exec_results([exec_ok()])
        .append_exec_errors([DbErr::Custom("relation \"roles\" does not exist".to_string())])
        // audit rows: one executed message, one error
        .append_query_results([id_row(1), id_row(2)])
        // re-check: script 1 applied, 2 and 3 still pending
        .append_query_results([versioning_rows(&[1])]);
    let service = create_service(db, true, source);

    let result = service.execute_all_pending_scripts().await.unwrap();
    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::Execution));
    assert_eq!(
        result.info,
        format!("Error executing script {}", resource(2, "Data", "Roles"))
    );
    assert!(result.detailed_info.unwrap().contains("roles"));

    let status = service.controller().versioning_status().await;
    assert!(status.database_needs_update);
    let pending: Vec<i32> = status
        .scripts
        .iter()
        .filter(|s| s.execution_required)
        .map(|s| s.id)
        .collect();
    assert_eq!(pending, vec![2, 3]);
}

/// Without a target database nothing runs and nothing is written.
#[tokio::test]
async fn test_missing_database_blocks_execution() {
    let source = MemoryScriptSource::new().with(
        resource(1, "Schema", "Users"),
        script_body("Create users", 1, "CREATE TABLE users (id INT);"),
    );
    let service = create_service(postgres(), false, source);

    let status = service.check_versioning_status().await.unwrap();
    assert!(!status.success);
    assert_eq!(status.failure, Some(FailureKind::DatabaseMissing));
    assert_eq!(status.info, DATABASE_MISSING_MESSAGE);
    assert!(status.data.unwrap().database_does_not_exist);

    let result = service.execute_schema_updates().await.unwrap();
    assert_eq!(result.failure, Some(FailureKind::DatabaseMissing));

    let single = service
        .execute_script(&resource(1, "Schema", "Users"))
        .await
        .unwrap();
    assert_eq!(single.failure, Some(FailureKind::DatabaseMissing));
}

/// Executing one script by name returns its output lines.
#[tokio::test]
async fn test_execute_single_integrity_script() {
    let source = MemoryScriptSource::new().with(
        integrity_resource("Totals"),
        "SELECT '@WARNING::3 orders without total';",
    );
    let db = postgres()
        // load: nothing versioned, so the database is up to date and checks run
        .append_query_results([no_rows()])
        .append_query_results([output_rows(&["@WARNING::3 orders without total"])])
        // explicit run
        .append_query_results([output_rows(&["@WARNING::3 orders without total"])])
        // re-check after success
        .append_query_results([no_rows()])
        .append_query_results([output_rows(&[])]);
    let service = create_service(db, true, source);

    let result = service
        .execute_script(&integrity_resource("Totals"))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(
        result.data.unwrap(),
        vec!["@WARNING::3 orders without total".to_string()]
    );

    let versioning = service.snapshot().await.versioning_status.unwrap();
    assert!(versioning.status_loaded);
    assert!(!versioning.database_needs_update);
}

/// A database holding every script reports itself up to date.
#[tokio::test]
async fn test_all_applied_is_up_to_date() {
    let source = MemoryScriptSource::new()
        .with(
            resource(1, "Schema", "Users"),
            script_body("Create users", 1, "CREATE TABLE users (id INT);"),
        )
        .with(
            resource(2, "Data", "Roles"),
            script_body("Seed roles", 1, "INSERT INTO roles VALUES (1);"),
        );
    let db = postgres().append_query_results([versioning_rows(&[1, 2])]);
    let service = create_service(db, true, source);

    let result = service.check_versioning_status().await.unwrap();
    assert!(result.success);
    assert_eq!(result.info, DATABASE_UP_TO_DATE_MESSAGE);
    let status = result.data.unwrap();
    assert!(status.scripts.iter().all(|s| !s.execution_required));
    assert!(status.scripts.iter().all(|s| s.impacted_date == Some(applied_at())));
}

/// Versioned scripts reach the database without T-SQL header syntax and
/// register themselves with literal values.
#[tokio::test]
async fn test_executed_body_registers_script_with_literals() {
    let source = MemoryScriptSource::new().with(
        resource(1234, "Schema", "Create"),
        script_body("Create Table Foo", 2, "CREATE TABLE foo (id INT);"),
    );
    let db = postgres()
        .append_query_results([no_rows()])
        .append_exec_results([exec_ok()])
        .append_query_results([id_row(1)])
        .append_query_results([versioning_rows(&[1234])]);
    let conn = db.into_connection();
    let service = create_service_on(conn.clone(), true, source);

    let result = service.execute_schema_updates().await.unwrap();
    assert!(result.success, "unexpected failure: {:?}", result);

    let statements = drain_statements(&conn);
    let body = statements
        .iter()
        .find(|sql| sql.contains("CREATE TABLE foo"))
        .expect("script body should have been executed");
    assert!(body.contains(
        "INSERT INTO system_versioning (scriptid, name, version, creationday, impactedday) VALUES (1234, 'Create Table Foo', 2, '2024-01-15', CURRENT_TIMESTAMP);"
    ));
    for line in body.lines().filter(|l| !l.starts_with("--")) {
        assert!(!line.contains('@'), "T-SQL variable left in {:?}", line);
        assert!(!line.contains("GETDATE"), "T-SQL function left in {:?}", line);
    }
}
