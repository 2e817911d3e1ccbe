//! Script discovery, header validation and catalog ordering.

use dbversioning_lib::models::ScriptKind;
use dbversioning_lib::services::MemoryScriptSource;
use dbversioning_lib::services::script_parser::ValidationIssue;

use super::test_helpers::*;

/// Schema and Data interleave by id; Integrity comes last.
#[tokio::test]
async fn test_scripts_ordered_by_id_then_integrity() {
    let source = MemoryScriptSource::new()
        .with(integrity_resource("Totals"), "SELECT 'ok';")
        .with(
            resource(3, "Schema", "Index"),
            script_body("Index orders", 1, "CREATE INDEX ix ON orders (id);"),
        )
        .with(
            resource(1, "Schema", "Create"),
            script_body("Create orders", 1, "CREATE TABLE orders (id INT);"),
        )
        .with(
            resource(2, "Data", "Seed"),
            script_body("Seed orders", 1, "INSERT INTO orders VALUES (1);"),
        );
    let service = create_service(postgres(), false, source);

    let scripts = service.scripts().await.unwrap();
    let order: Vec<(i32, ScriptKind)> = scripts.iter().map(|s| (s.id, s.kind)).collect();
    assert_eq!(
        order,
        vec![
            (1, ScriptKind::Schema),
            (2, ScriptKind::Data),
            (3, ScriptKind::Schema),
            (0, ScriptKind::Integrity),
        ]
    );
    assert_eq!(scripts[3].name, "DB.Checks.Integrity.Totals.sql");
}

/// A well-formed header is parsed and the registration is injected.
#[tokio::test]
async fn test_valid_header_is_cataloged() {
    let name = "Shop.Resources.DB.1234.AddTable.Schema.Create.sql";
    let source = MemoryScriptSource::new().with(
        name,
        script_body("Create Table Foo", 2, "CREATE TABLE foo (id INT);"),
    );
    let service = create_service(postgres(), false, source);

    let scripts = service.scripts().await.unwrap();
    assert_eq!(scripts.len(), 1);
    let script = &scripts[0];
    assert_eq!(script.id, 1234);
    assert_eq!(script.name, "Create Table Foo");
    assert_eq!(script.version, 2);
    assert_eq!(
        script.creation_date,
        chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
    );
    assert!(script.sql_code.starts_with("DECLARE @ScriptId INT = 1234;"));
    assert!(script.sql_code.contains("INSERT INTO SYSTEM_VERSIONING"));
    assert!(script.execution_required);
}

/// A short name rejects the script with a log entry.
#[tokio::test]
async fn test_short_name_is_rejected() {
    let name = "Shop.Resources.DB.1234.AddTable.Schema.Create.sql";
    let source = MemoryScriptSource::new().with(name, script_body("Foo", 2, "SELECT 1;"));
    let service = create_service(postgres(), false, source);

    let status = service.check_versioning_status().await.unwrap().data.unwrap();
    assert!(status.scripts.is_empty());
    assert_eq!(status.scripts_logs.len(), 1);
    assert_eq!(status.scripts_logs[0].script.file_name, name);
    assert_eq!(
        status.scripts_logs[0].message,
        ValidationIssue::NameInvalid.message()
    );
}

/// Scripts must not switch databases.
#[tokio::test]
async fn test_use_statement_is_rejected() {
    let source = MemoryScriptSource::new()
        .with(
            resource(1, "Schema", "Users"),
            script_body("Create users", 1, "USE orders\nCREATE TABLE users (id INT);"),
        )
        .with(
            resource(2, "Schema", "Usage"),
            script_body("Usage table", 1, "USER_TABLES_REFRESH;"),
        );
    let service = create_service(postgres(), false, source);

    let status = service.check_versioning_status().await.unwrap().data.unwrap();
    let cataloged: Vec<i32> = status.scripts.iter().map(|s| s.id).collect();
    assert_eq!(cataloged, vec![2]);
    assert_eq!(
        status.scripts_logs[0].message,
        ValidationIssue::DatabaseDeclaration.message()
    );
}

/// Resources outside the naming patterns and other environments are skipped.
#[tokio::test]
async fn test_unrelated_and_foreign_environment_resources_ignored() {
    let source = MemoryScriptSource::new()
        .with(
            resource(1, "Schema", "Users"),
            script_body("Create users", 1, "CREATE TABLE users (id INT);"),
        )
        .with(
            "Shop.Resources.DB.0002.Staging.Schema.Audit.sql",
            script_body("Staging audit", 1, "CREATE TABLE audit (id INT);"),
        )
        .with("Shop.Resources.Templates.Invoice.html", "<html></html>")
        .with(
            "Other.Resources.DB.0003.Orders.Schema.Foreign.sql",
            script_body("Foreign script", 1, "SELECT 1;"),
        );
    let service = create_service(postgres(), false, source);

    let scripts = service.scripts().await.unwrap();
    let names: Vec<&str> = scripts.iter().map(|s| s.file_name.as_str()).collect();
    assert_eq!(names, vec![resource(1, "Schema", "Users").as_str()]);
}
