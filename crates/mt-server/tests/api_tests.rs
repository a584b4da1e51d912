// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end coverage of the `/api/v1` REST resources.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use mt_config::ServerConfig;
use mt_model::{Id, RunStatus};
use mt_server::{AppState, build_app};
use mt_store::Store;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

/// Seeded entities shared by the API tests.
struct Fixture {
    state: Arc<AppState>,
    app: Router,
    productversion: Id,
    run: Id,
    rcv: Id,
    env_osx: Id,
    env_win: Id,
    tester: Id,
    api_key: String,
}

async fn fixture() -> Fixture {
    let store = Arc::new(Store::in_memory());

    let product = store.add_product("MozTrap").await.unwrap();
    let pv = store.add_product_version(product.id, "1.0").await.unwrap();
    let env_osx = store
        .add_environment(vec!["OS X".into(), "Firefox 10".into()])
        .await
        .unwrap();
    let env_win = store
        .add_environment(vec!["Windows 7".into(), "Firefox 10".into()])
        .await
        .unwrap();
    let run = store
        .add_run(
            "Smoke",
            "Quick smoke pass",
            RunStatus::Active,
            pv.id,
            vec![env_osx.id, env_win.id],
        )
        .await
        .unwrap();
    let cv = store.add_case_version("Can log in", pv.id).await.unwrap();
    let rcv = store.add_run_case_version(run.id, cv.id, 1).await.unwrap();

    let tester = store
        .add_active_user("tester", "tester@example.com", "sekrit")
        .await
        .unwrap();
    let key = store.create_api_key(tester.id, tester.id).await.unwrap();

    let state = Arc::new(AppState::new(ServerConfig::default(), store));
    let app = build_app(state.clone());

    Fixture {
        state,
        app,
        productversion: pv.id,
        run: run.id,
        rcv: rcv.id,
        env_osx: env_osx.id,
        env_win: env_win.id,
        tester: tester.id,
        api_key: key.key,
    }
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn results_uri(fx: &Fixture) -> String {
    format!(
        "/api/v1/results?username=tester&api_key={}",
        fx.api_key
    )
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_ok() {
    let fx = fixture().await;
    let (status, json) = get(&fx.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["time"].is_string());
}

// ---------------------------------------------------------------------------
// Run resource
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_list_carries_denormalized_names_and_env_refs() {
    let fx = fixture().await;
    let (status, json) = get(&fx.app, "/api/v1/runs").await;
    assert_eq!(status, StatusCode::OK);

    let runs = json.as_array().unwrap();
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run["id"], fx.run);
    assert_eq!(run["product_name"], "MozTrap");
    assert_eq!(run["productversion_name"], "1.0");
    assert_eq!(run["runcaseversions"], json!([fx.rcv]));

    // List responses reference environments by id only.
    assert_eq!(
        run["environments"],
        json!([{ "id": fx.env_osx }, { "id": fx.env_win }])
    );
}

#[tokio::test]
async fn run_detail_embeds_full_environments() {
    let fx = fixture().await;
    let (status, json) = get(&fx.app, &format!("/api/v1/runs/{}", fx.run)).await;
    assert_eq!(status, StatusCode::OK);

    let envs = json["environments"].as_array().unwrap();
    assert_eq!(envs.len(), 2);
    assert_eq!(envs[0]["id"], fx.env_osx);
    assert_eq!(envs[0]["elements"], json!(["OS X", "Firefox 10"]));
    assert_eq!(envs[0]["name"], "OS X, Firefox 10");
}

#[tokio::test]
async fn run_list_filters_by_productversion() {
    let fx = fixture().await;

    // A run under a second product version must not match the filter.
    let product = fx.state.store.add_product("Other").await.unwrap();
    let pv2 = fx
        .state
        .store
        .add_product_version(product.id, "2.0")
        .await
        .unwrap();
    fx.state
        .store
        .add_run("Other run", "", RunStatus::Active, pv2.id, vec![])
        .await
        .unwrap();

    let (status, json) = get(
        &fx.app,
        &format!("/api/v1/runs?productversion={}", fx.productversion),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let runs = json.as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["id"], fx.run);
}

#[tokio::test]
async fn run_list_filters_by_status() {
    let fx = fixture().await;
    fx.state
        .store
        .add_run(
            "Draft run",
            "",
            RunStatus::Draft,
            fx.productversion,
            vec![],
        )
        .await
        .unwrap();

    let (status, json) = get(&fx.app, "/api/v1/runs?status=active").await;
    assert_eq!(status, StatusCode::OK);
    let runs = json.as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["status"], "active");
}

#[tokio::test]
async fn run_list_unknown_status_filter_is_rejected() {
    let fx = fixture().await;
    let (status, json) = get(&fx.app, "/api/v1/runs?status=bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("bogus"));
}

#[tokio::test]
async fn run_detail_unknown_id_404() {
    let fx = fixture().await;
    let (status, json) = get(&fx.app, "/api/v1/runs/99999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "RUN_NOT_FOUND");
}

// ---------------------------------------------------------------------------
// RunCaseVersion resource
// ---------------------------------------------------------------------------

#[tokio::test]
async fn runcaseversion_list_duplicates_run_id_and_embeds_caseversion() {
    let fx = fixture().await;
    let (status, json) = get(&fx.app, "/api/v1/runcaseversions").await;
    assert_eq!(status, StatusCode::OK);

    let links = json.as_array().unwrap();
    assert_eq!(links.len(), 1);
    let link = &links[0];
    assert_eq!(link["id"], fx.rcv);
    assert_eq!(link["run"], fx.run);
    assert_eq!(link["run_id"], fx.run);
    assert_eq!(link["caseversion"]["name"], "Can log in");
}

#[tokio::test]
async fn runcaseversion_list_filters_by_run() {
    let fx = fixture().await;
    let (status, json) = get(
        &fx.app,
        &format!("/api/v1/runcaseversions?run={}", fx.run),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);

    let (status, json) = get(&fx.app, "/api/v1/runcaseversions?run=99999").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn runcaseversion_list_filters_by_caseversion() {
    let fx = fixture().await;
    let cv2 = fx
        .state
        .store
        .add_case_version("Can log out", fx.productversion)
        .await
        .unwrap();
    let rcv2 = fx
        .state
        .store
        .add_run_case_version(fx.run, cv2.id, 2)
        .await
        .unwrap();

    let (status, json) = get(
        &fx.app,
        &format!("/api/v1/runcaseversions?caseversion={}", cv2.id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Only the link for the requested case version; fx.rcv is excluded.
    let links = json.as_array().unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0]["id"], rcv2.id);
    assert_eq!(links[0]["caseversion"]["id"], cv2.id);
    assert_eq!(links[0]["caseversion"]["name"], "Can log out");

    let (status, json) = get(&fx.app, "/api/v1/runcaseversions?caseversion=99999").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn runcaseversion_detail_unknown_id_404() {
    let fx = fixture().await;
    let (status, json) = get(&fx.app, "/api/v1/runcaseversions/99999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "RUN_CASE_VERSION_NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Result resource
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_result_passed() {
    let fx = fixture().await;
    let (status, json) = post_json(
        &fx.app,
        &results_uri(&fx),
        json!({
            "runcaseversion": fx.rcv,
            "environment": fx.env_osx,
            "tester": fx.tester,
            "status": "passed",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "passed");
    assert_eq!(json["runcaseversion"], fx.rcv);
    assert_eq!(json["created_by"], fx.tester);
    assert!(json["completed_at"].is_string());
    assert!(json.get("failure").is_none() || json["failure"].is_null());

    assert_eq!(fx.state.store.result_count().await, 1);
}

#[tokio::test]
async fn create_result_failed_records_failure_detail() {
    let fx = fixture().await;
    let (status, json) = post_json(
        &fx.app,
        &results_uri(&fx),
        json!({
            "runcaseversion": fx.rcv,
            "environment": fx.env_osx,
            "tester": fx.tester,
            "status": "failed",
            "comment": "step 3 broke",
            "failed_step_number": 3,
            "bug_url": "https://bugzilla.example/123",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "failed");
    assert_eq!(json["failure"]["comment"], "step 3 broke");
    assert_eq!(json["failure"]["failed_step_number"], 3);
    assert_eq!(json["failure"]["bug_url"], "https://bugzilla.example/123");
}

#[tokio::test]
async fn create_result_invalidated_keeps_the_comment() {
    let fx = fixture().await;
    let (status, json) = post_json(
        &fx.app,
        &results_uri(&fx),
        json!({
            "runcaseversion": fx.rcv,
            "environment": fx.env_osx,
            "tester": fx.tester,
            "status": "invalidated",
            "comment": "steps are out of date",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "invalidated");
    assert_eq!(json["invalidation_comment"], "steps are out of date");
}

#[tokio::test]
async fn create_result_unknown_status_persists_nothing() {
    let fx = fixture().await;
    let (status, json) = post_json(
        &fx.app,
        &results_uri(&fx),
        json!({
            "runcaseversion": fx.rcv,
            "environment": fx.env_osx,
            "tester": fx.tester,
            "status": "exploded",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("exploded"));
    assert_eq!(json["code"], "RESULT_STATUS_UNKNOWN");
    assert_eq!(fx.state.store.result_count().await, 0);
}

#[tokio::test]
async fn create_result_rejects_pending() {
    let fx = fixture().await;
    let (status, _) = post_json(
        &fx.app,
        &results_uri(&fx),
        json!({
            "runcaseversion": fx.rcv,
            "environment": fx.env_osx,
            "tester": fx.tester,
            "status": "pending",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fx.state.store.result_count().await, 0);
}

#[tokio::test]
async fn create_result_without_credentials_is_unauthorized() {
    let fx = fixture().await;
    let (status, json) = post_json(
        &fx.app,
        "/api/v1/results",
        json!({
            "runcaseversion": fx.rcv,
            "environment": fx.env_osx,
            "tester": fx.tester,
            "status": "passed",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].as_str().unwrap().contains("api_key"));
    assert_eq!(json["code"], "AUTH_API_KEY_INVALID");
}

#[tokio::test]
async fn create_result_with_bad_key_is_unauthorized() {
    let fx = fixture().await;
    let (status, json) = post_json(
        &fx.app,
        "/api/v1/results?username=tester&api_key=not-a-key",
        json!({
            "runcaseversion": fx.rcv,
            "environment": fx.env_osx,
            "tester": fx.tester,
            "status": "passed",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "AUTH_API_KEY_INVALID");
    assert_eq!(fx.state.store.result_count().await, 0);
}

#[tokio::test]
async fn create_result_with_someone_elses_key_is_unauthorized() {
    let fx = fixture().await;
    let other = fx
        .state
        .store
        .add_active_user("other", "other@example.com", "pw")
        .await
        .unwrap();
    let other_key = fx
        .state
        .store
        .create_api_key(other.id, other.id)
        .await
        .unwrap();

    // Key exists but is not owned by "tester".
    let (status, _) = post_json(
        &fx.app,
        &format!("/api/v1/results?username=tester&api_key={}", other_key.key),
        json!({
            "runcaseversion": fx.rcv,
            "environment": fx.env_osx,
            "tester": fx.tester,
            "status": "passed",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_result_unknown_runcaseversion_404() {
    let fx = fixture().await;
    let (status, json) = post_json(
        &fx.app,
        &results_uri(&fx),
        json!({
            "runcaseversion": 99999,
            "environment": fx.env_osx,
            "tester": fx.tester,
            "status": "passed",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "RUN_CASE_VERSION_NOT_FOUND");
}

#[tokio::test]
async fn create_result_unknown_environment_404() {
    let fx = fixture().await;
    let (status, json) = post_json(
        &fx.app,
        &results_uri(&fx),
        json!({
            "runcaseversion": fx.rcv,
            "environment": 99999,
            "tester": fx.tester,
            "status": "passed",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "ENVIRONMENT_NOT_FOUND");
    assert_eq!(fx.state.store.result_count().await, 0);
}
