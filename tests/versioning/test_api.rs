//! HTTP API: status, admin key enforcement and failure status codes.

use actix_web::test;
use serde_json::Value;

use dbversioning_lib::services::MemoryScriptSource;

use super::test_helpers::*;

fn users_source() -> MemoryScriptSource {
    MemoryScriptSource::new().with(
        resource(1, "Schema", "Users"),
        script_body("Create users", 1, "CREATE TABLE users (id INT);"),
    )
}

#[actix_rt::test]
async fn test_status_is_public() {
    let service = create_service(postgres(), false, users_source());
    let app = create_test_app(service, Some(TEST_ADMIN_KEY)).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/versioning/status")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Database does not exist");
    assert_eq!(body["status"]["database_does_not_exist"], true);
    assert_eq!(body["status"]["scripts"][0]["execution_required"], true);
}

#[actix_rt::test]
async fn test_execute_requires_admin_key() {
    let service = create_service(postgres(), false, users_source());
    let app = create_test_app(service, Some(TEST_ADMIN_KEY)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/versioning/execute/schema")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "UNAUTHORIZED");

    let req = test::TestRequest::post()
        .uri("/api/v1/versioning/execute/schema")
        .insert_header(("X-Admin-Key", "wrong-key"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);
}

#[actix_rt::test]
async fn test_execute_disabled_without_configured_key() {
    let service = create_service(postgres(), false, users_source());
    let app = create_test_app(service, None).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/versioning/execute/pending")
        .insert_header(("X-Admin-Key", TEST_ADMIN_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 403);
}

#[actix_rt::test]
async fn test_execute_against_missing_database_conflicts() {
    let service = create_service(postgres(), false, users_source());
    let app = create_test_app(service, Some(TEST_ADMIN_KEY)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/versioning/execute/schema")
        .insert_header(("X-Admin-Key", TEST_ADMIN_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 409);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["failure"], "database_missing");
}

#[actix_rt::test]
async fn test_execute_unknown_script_not_found() {
    let db = postgres().append_query_results([no_rows()]);
    let service = create_service(db, true, users_source());
    let app = create_test_app(service, Some(TEST_ADMIN_KEY)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/versioning/execute/script")
        .insert_header(("X-Admin-Key", TEST_ADMIN_KEY))
        .set_json(serde_json::json!({ "file_name": "Shop.Resources.DB.9999.Nope.Schema.X.sql" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body["message"],
        "Cannot find script with file name: Shop.Resources.DB.9999.Nope.Schema.X.sql"
    );
}

#[actix_rt::test]
async fn test_list_scripts() {
    let service = create_service(postgres(), false, users_source());
    let app = create_test_app(service, None).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/versioning/scripts")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["scripts"][0]["name"], "Create users");
    assert_eq!(body["scripts"][0]["kind"], "schema");
}
