//! Host HTTP surface: organization management, module administration and
//! health. Thin glue over the directory service and the module registry —
//! all real decisions live in `tenancy` and `modhost`.
//!
//! Module capability surfaces are mounted separately under
//! `{api_prefix}/modules/{name}`; the administrative listing lives under
//! `/system` so the two namespaces cannot shadow each other.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde_json::json;

use modhost::{HealthStatus, ModuleRegistry};
use tenancy::{DirectoryService, NewOrganization, TenancyError, TenantDirectory};

use crate::pack::ModulePackStore;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ModuleRegistry>,
    pub directory: Arc<DirectoryService>,
    pub packs: Arc<dyn ModulePackStore>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn error_response(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(json!({"detail": detail.into()})))
}

fn internal(e: &TenancyError) -> ApiError {
    tracing::error!(error = %e, "catalog operation failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "catalog operation failed")
}

#[must_use]
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/system/modules", get(list_modules))
        .route("/system/modules/{name}/health", get(module_health))
        .route("/system/modules/{name}/download", get(download_pack))
        .route("/organizations", post(create_organization).get(list_organizations))
        .route(
            "/organizations/{id}",
            get(get_organization).delete(delete_organization),
        )
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    let report = state.registry.health_report().await;
    let degraded = report
        .iter()
        .any(|(_, h)| h.status != HealthStatus::Ok);
    let modules: serde_json::Map<String, serde_json::Value> = report
        .into_iter()
        .map(|(name, health)| (name, json!(health)))
        .collect();
    Json(json!({
        "status": if degraded { "degraded" } else { "ok" },
        "modules": modules,
    }))
}

async fn list_modules(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({"data": state.registry.list_modules()}))
}

async fn module_health(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let entry = state
        .registry
        .get(&name)
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, format!("module '{name}' not found")))?;
    let health = entry.health().await;
    Ok(Json(json!({
        "name": name,
        "state": entry.state(),
        "health": health,
    })))
}

async fn download_pack(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let packs = Arc::clone(&state.packs);
    let lookup_name = name.clone();
    let archived = tokio::task::spawn_blocking(move || packs.archive(&lookup_name))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "pack archiving task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "pack archiving failed")
        })?
        .map_err(|e| {
            tracing::error!(module = %name, error = %e, "pack archiving failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "pack archiving failed")
        })?;
    let Some(bytes) = archived else {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            format!("module '{name}' client pack not found"),
        ));
    };
    let headers = [
        (header::CONTENT_TYPE, "application/gzip".to_owned()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}.tar.gz\""),
        ),
    ];
    Ok((headers, bytes).into_response())
}

async fn create_organization(
    State(state): State<AppState>,
    Json(req): Json<NewOrganization>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let org = state.directory.create_organization(req).await.map_err(|e| {
        match e {
            TenancyError::NameCollision(_) | TenancyError::Provision { .. } => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to create tenant environment: {e}"),
            ),
            other => internal(&other),
        }
    })?;
    Ok((StatusCode::CREATED, Json(json!(org))))
}

async fn list_organizations(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let orgs = state
        .directory
        .organizations()
        .await
        .map_err(|e| internal(&e))?;
    let count = orgs.len();
    Ok(Json(json!({"data": orgs, "count": count})))
}

async fn get_organization(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let org = state
        .directory
        .organization(&id)
        .await
        .map_err(|e| internal(&e))?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Organization not found"))?;
    Ok(Json(json!(org)))
}

async fn delete_organization(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let existed = state
        .directory
        .delete_organization(&id)
        .await
        .map_err(|e| internal(&e))?;
    if !existed {
        return Err(error_response(StatusCode::NOT_FOUND, "Organization not found"));
    }
    Ok(Json(json!({"message": "Organization deleted successfully"})))
}
