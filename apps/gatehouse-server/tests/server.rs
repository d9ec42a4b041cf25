#![allow(clippy::unwrap_used)]

//! Whole-server exercises: boot against SQLite storage, provision a tenant
//! over HTTP, and drive the mounted module surfaces end to end.

use std::path::Path;

use axum::body::Body;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use gatehouse_server::boot::{self, App};
use gatehouse_server::config::AppConfig;

fn test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.admin_dsn = format!("sqlite:{}/tenants", dir.display());
    config.database.catalog_dsn = format!("sqlite://{}/catalog.db", dir.display());
    config.database.tenant_template = format!("sqlite://{}/tenants/{{db}}.db", dir.display());
    config.loader.plugins_dir = dir.join("plugins");
    config.bootstrap.superuser_email = Some("root@gatehouse.test".to_owned());
    config.bootstrap.superuser_password = Some("change-me-please".to_owned());
    config
}

async fn request_json(
    app: &App,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, value)
}

fn new_org_request(name: &str) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "kind": "office",
        "address": "12 Perimeter Rd",
        "contact_email": format!("contact@{name}.test"),
        "admin_email": format!("admin@{name}.test"),
        "admin_password": "hunter2hunter2",
    })
}

#[tokio::test]
async fn boot_registers_and_mounts_all_shipped_modules() {
    let dir = tempfile::tempdir().unwrap();
    let app = boot::start(&test_config(dir.path())).await.unwrap();

    assert_eq!(
        app.scan_report.registered,
        ["audit-stats", "qr-access", "weather-connector"]
    );
    assert!(app.scan_report.failed.is_empty());
    assert!(app.boot_report.failed.is_empty());

    let (status, body) = request_json(&app, "GET", "/api/v1/system/modules", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["audit-stats", "qr-access", "weather-connector"]);

    // Every running module answers through its namespaced mount.
    let (status, body) =
        request_json(&app, "GET", "/api/v1/modules/weather-connector/current?city=Utrecht", None)
            .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["city"], "Utrecht");

    let (status, _) = request_json(&app, "GET", "/api/v1/modules/qr-access/status", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, health) = request_json(&app, "GET", "/api/v1/healthz", None).await;
    assert_eq!(health["status"], "ok");
    assert!(health["modules"]["qr-access"].is_object());

    app.shutdown().await;
}

#[tokio::test]
async fn organization_lifecycle_and_tenant_scoped_module_queries() {
    let dir = tempfile::tempdir().unwrap();
    let app = boot::start(&test_config(dir.path())).await.unwrap();

    // Create + provision synchronously.
    let (status, org) = request_json(
        &app,
        "POST",
        "/api/v1/organizations",
        Some(new_org_request("acme")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(org["provisioning_status"], "ready");
    let org_id = org["id"].as_str().unwrap().to_owned();

    let (status, listed) = request_json(&app, "GET", "/api/v1/organizations", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["count"], 1);

    // The audit-stats module reaches into this tenant's (empty) database.
    let (status, summary) = request_json(
        &app,
        "GET",
        &format!("/api/v1/modules/audit-stats/summary?organization_id={org_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total"], 0);

    // Unknown organizations stay a clean 404 at the module surface.
    let (status, _) = request_json(
        &app,
        "GET",
        "/api/v1/modules/audit-stats/summary?organization_id=missing",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Issue and validate an entry pass through the QR module.
    let (status, pass) = request_json(
        &app,
        "POST",
        "/api/v1/modules/qr-access/passes",
        Some(serde_json::json!({
            "organization_id": org_id,
            "access_point": "front-gate",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, verdict) = request_json(
        &app,
        "POST",
        "/api/v1/modules/qr-access/passes/validate",
        Some(pass),
    )
    .await;
    assert_eq!(verdict["valid"], true);

    // Delete the organization row.
    let (status, _) = request_json(
        &app,
        "DELETE",
        &format!("/api/v1/organizations/{org_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) =
        request_json(&app, "GET", &format!("/api/v1/organizations/{org_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.shutdown().await;
}

#[tokio::test]
async fn failed_module_is_visible_but_never_mounted() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.modules.insert(
        "weather-connector".to_owned(),
        serde_json::json!({"fail_init": true}),
    );
    let app = boot::start(&config).await.unwrap();

    assert_eq!(app.boot_report.failed.len(), 1);
    assert_eq!(app.boot_report.failed[0].module, "weather-connector");

    // Fail-closed: the surface is absent.
    let (status, _) =
        request_json(&app, "GET", "/api/v1/modules/weather-connector/current", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // But administration still sees the module and its state.
    let (status, body) = request_json(
        &app,
        "GET",
        "/api/v1/system/modules/weather-connector/health",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "failed");
    assert!(body["health"].is_null());

    // Aggregate health covers running modules only.
    let (_, health) = request_json(&app, "GET", "/api/v1/healthz", None).await;
    assert!(health["modules"]["weather-connector"].is_null());
    assert!(health["modules"]["qr-access"].is_object());

    app.shutdown().await;
}

#[tokio::test]
async fn module_client_packs_download_as_tarballs() {
    let dir = tempfile::tempdir().unwrap();
    let client_dir = dir.path().join("plugins/builtin/qr-access/client");
    std::fs::create_dir_all(&client_dir).unwrap();
    std::fs::write(client_dir.join("module.js"), b"export default {};\n").unwrap();

    let app = boot::start(&test_config(dir.path())).await.unwrap();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/system/modules/qr-access/download")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/gzip"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(!bytes.is_empty());

    let (status, _) = request_json(
        &app,
        "GET",
        "/api/v1/system/modules/audit-stats/download",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.shutdown().await;
}
