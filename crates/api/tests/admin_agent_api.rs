//! Integration tests for the `/api/v1/admin/agent` routes.

mod common;

use axum::http::StatusCode;
use common::{
    body_json, build_test_app, dark_mode_patch, get, get_auth, member_token, owner_token,
    post_auth, post_json_auth, seed_project, OWNER_ID,
};
use serde_json::json;
use sqlx::PgPool;

const PATCHES: &str = "/api/v1/admin/agent/patches";

fn empty_patch() -> String {
    json!({ "summary": "nothing", "files": [] }).to_string()
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn missing_token_returns_401(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let app = build_test_app(pool, dir.path(), vec![]);

    let response = get(app, PATCHES).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn non_owner_returns_403(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let app = build_test_app(pool, dir.path(), vec![]);

    let response = get_auth(app, PATCHES, &member_token()).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(json["code"], "FORBIDDEN");
}

// ---------------------------------------------------------------------------
// Generate, show, list
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn generate_patch_returns_201_and_persists(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    seed_project(dir.path());
    let app = build_test_app(pool, dir.path(), vec![dark_mode_patch()]);
    let token = owner_token();

    let response = post_json_auth(
        app.clone(),
        PATCHES,
        json!({ "request": "Add a dark mode toggle" }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    let record = &json["data"]["record"];
    assert_eq!(record["status"], "pending");
    assert_eq!(record["user_id"], OWNER_ID);
    assert_eq!(record["patch"]["summary"], "Add dark mode");
    assert!(json["data"]["quality"].is_object());
    let id = record["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("patch_"));

    // Nothing is written until the patch is applied.
    assert!(!dir.path().join("src/components/theme-toggle.tsx").exists());

    let response = get_auth(app.clone(), &format!("{PATCHES}/{id}"), &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["id"], id.as_str());
    assert_eq!(json["data"]["request"], "Add a dark mode toggle");

    let response = get_auth(app, PATCHES, &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let list = json["data"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], id.as_str());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn list_patches_honours_limit_and_offset(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    seed_project(dir.path());
    let app = build_test_app(
        pool,
        dir.path(),
        vec![dark_mode_patch(), dark_mode_patch(), dark_mode_patch()],
    );
    let token = owner_token();

    let mut ids = Vec::new();
    for n in 0..3 {
        let response = post_json_auth(
            app.clone(),
            PATCHES,
            json!({ "request": format!("change number {n}") }),
            &token,
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        ids.push(json["data"]["record"]["id"].as_str().unwrap().to_string());
    }

    let response = get_auth(app, &format!("{PATCHES}?limit=2&offset=1"), &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let list = json["data"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    // Newest first: skip the third, then the second and first.
    assert_eq!(list[0]["id"], ids[1].as_str());
    assert_eq!(list[1]["id"], ids[0].as_str());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn empty_request_returns_400(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    seed_project(dir.path());
    let app = build_test_app(pool, dir.path(), vec![]);

    let response =
        post_json_auth(app, PATCHES, json!({ "request": "   " }), &owner_token()).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn malformed_body_returns_400_envelope(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let app = build_test_app(pool, dir.path(), vec![]);

    let response =
        post_json_auth(app, PATCHES, json!({ "prompt": "wrong field" }), &owner_token()).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
    assert!(json["error"].as_str().unwrap().contains("request"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn exhausted_generation_returns_422(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    seed_project(dir.path());
    let app = build_test_app(
        pool,
        dir.path(),
        vec![empty_patch(), empty_patch(), empty_patch()],
    );

    let response = post_json_auth(
        app.clone(),
        PATCHES,
        json!({ "request": "Do something vague" }),
        &owner_token(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["code"], "GENERATION_FAILED");

    // No record is stored for a failed generation.
    let response = get_auth(app, PATCHES, &owner_token()).await;
    let json = body_json(response).await;
    assert!(json["data"].as_array().unwrap().is_empty());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn unknown_patch_returns_404(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let app = build_test_app(pool, dir.path(), vec![]);

    let response = get_auth(app, &format!("{PATCHES}/patch_1"), &owner_token()).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn malformed_patch_id_returns_400(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let app = build_test_app(pool, dir.path(), vec![]);

    let response = post_auth(app, &format!("{PATCHES}/not-a-patch/apply"), &owner_token()).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

// ---------------------------------------------------------------------------
// Apply and rollback
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn apply_then_rollback_restores_project(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    seed_project(dir.path());
    let original_css = std::fs::read_to_string(dir.path().join("src/app/globals.css")).unwrap();
    let app = build_test_app(pool, dir.path(), vec![dark_mode_patch()]);
    let token = owner_token();

    let response = post_json_auth(
        app.clone(),
        PATCHES,
        json!({ "request": "Add a dark mode toggle" }),
        &token,
    )
    .await;
    let json = body_json(response).await;
    let id = json["data"]["record"]["id"].as_str().unwrap().to_string();

    let response = post_auth(app.clone(), &format!("{PATCHES}/{id}/apply"), &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "applied");
    assert!(dir.path().join("src/components/theme-toggle.tsx").exists());
    let css = std::fs::read_to_string(dir.path().join("src/app/globals.css")).unwrap();
    assert!(css.contains(".dark"));

    // A second apply is a conflict.
    let response = post_auth(app.clone(), &format!("{PATCHES}/{id}/apply"), &token).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = post_auth(app.clone(), &format!("{PATCHES}/{id}/rollback"), &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "rolled_back");
    assert!(!dir.path().join("src/components/theme-toggle.tsx").exists());
    let css = std::fs::read_to_string(dir.path().join("src/app/globals.css")).unwrap();
    assert_eq!(css, original_css);

    let response = get_auth(app, &format!("{PATCHES}/{id}"), &token).await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "rolled_back");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn rollback_of_pending_patch_returns_409(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    seed_project(dir.path());
    let app = build_test_app(pool, dir.path(), vec![dark_mode_patch()]);
    let token = owner_token();

    let response = post_json_auth(
        app.clone(),
        PATCHES,
        json!({ "request": "Add a dark mode toggle" }),
        &token,
    )
    .await;
    let json = body_json(response).await;
    let id = json["data"]["record"]["id"].as_str().unwrap().to_string();

    let response = post_auth(app, &format!("{PATCHES}/{id}/rollback"), &token).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["code"], "CONFLICT");
}

// ---------------------------------------------------------------------------
// Commands and analysis
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn command_with_auto_apply_writes_files(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    seed_project(dir.path());
    let app = build_test_app(pool, dir.path(), vec![dark_mode_patch()]);
    let token = owner_token();

    let response = post_json_auth(
        app.clone(),
        "/api/v1/admin/agent/commands",
        json!({ "request": "Add a dark mode toggle", "auto_apply": true }),
        &token,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["applied"], true);
    assert_eq!(json["data"]["record"]["status"], "applied");
    assert!(dir.path().join("src/components/theme-toggle.tsx").exists());

    let id = json["data"]["record"]["id"].as_str().unwrap().to_string();
    let response = get_auth(app, &format!("{PATCHES}/{id}"), &token).await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "applied");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn command_without_auto_apply_leaves_patch_pending(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    seed_project(dir.path());
    let app = build_test_app(pool, dir.path(), vec![dark_mode_patch()]);

    let response = post_json_auth(
        app,
        "/api/v1/admin/agent/commands",
        json!({ "request": "Add a dark mode toggle" }),
        &owner_token(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["applied"], false);
    assert_eq!(json["data"]["record"]["status"], "pending");
    assert!(!dir.path().join("src/components/theme-toggle.tsx").exists());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn analysis_reports_project_shape(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    seed_project(dir.path());
    let app = build_test_app(pool, dir.path(), vec![]);

    let response = get_auth(app, "/api/v1/admin/agent/analysis", &owner_token()).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["project_name"], "apex-agents");
    assert_eq!(json["data"]["total_files"], 4);
}
