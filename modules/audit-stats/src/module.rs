//! Module wiring for audit analytics.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use modhost::{Module, ModuleCtx, ModuleDescriptor, ModuleHealth};
use tenancy::{TenancyError, TenantDirectory};

use crate::stats;

/// Shared with route handlers; the directory arrives during `initialize`.
#[derive(Default)]
pub struct StatsState {
    directory: OnceLock<Arc<dyn TenantDirectory>>,
}

/// Audit-log analytics over per-tenant databases, resolved through the
/// tenant directory at request time — never a shared table.
pub struct AuditStatsModule {
    descriptor: ModuleDescriptor,
    state: Arc<StatsState>,
}

impl Default for AuditStatsModule {
    fn default() -> Self {
        Self {
            descriptor: ModuleDescriptor {
                name: "audit-stats".to_owned(),
                version: "1.1.0".to_owned(),
                description: "Audit-log analytics per tenant".to_owned(),
                author: "Gatehouse Team".to_owned(),
                license_required: true,
                is_external: false,
                dependencies: Vec::new(),
            },
            state: Arc::new(StatsState::default()),
        }
    }
}

#[async_trait]
impl Module for AuditStatsModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn initialize(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        let directory = ctx.client_hub().get_required::<dyn TenantDirectory>()?;
        self.state
            .directory
            .set(directory)
            .map_err(|_| anyhow::anyhow!("audit-stats initialized twice"))?;
        tracing::info!("audit-stats ready");
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> ModuleHealth {
        if self.state.directory.get().is_some() {
            ModuleHealth::ok_with(serde_json::json!({"monitored_table": "audit_logs"}))
        } else {
            ModuleHealth::degraded(serde_json::json!({"detail": "tenant directory not wired"}))
        }
    }

    fn exposed_routes(&self) -> Router {
        Router::new()
            .route("/summary", get(summary))
            .route("/levels", get(levels))
            .with_state(Arc::clone(&self.state))
    }
}

#[derive(Debug, Deserialize)]
struct TenantParams {
    organization_id: String,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn error_response(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({"detail": detail.into()})))
}

fn map_tenancy_error(e: &TenancyError) -> ApiError {
    match e {
        TenancyError::OrganizationNotFound(_) => {
            error_response(StatusCode::NOT_FOUND, e.to_string())
        }
        TenancyError::NotProvisioned(_) => error_response(StatusCode::CONFLICT, e.to_string()),
        _ => error_response(StatusCode::INTERNAL_SERVER_ERROR, "tenant query failed"),
    }
}

async fn tenant_session(
    state: &StatsState,
    organization_id: &str,
) -> Result<tenancy::TenantSession, ApiError> {
    let Some(directory) = state.directory.get() else {
        return Err(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "module not initialized",
        ));
    };
    directory
        .session(organization_id)
        .await
        .map_err(|e| map_tenancy_error(&e))
}

async fn summary(
    State(state): State<Arc<StatsState>>,
    Query(params): Query<TenantParams>,
) -> Result<Json<stats::AuditSummary>, ApiError> {
    let session = tenant_session(&state, &params.organization_id).await?;
    let summary = stats::summarize(&session, Utc::now()).await.map_err(|e| {
        tracing::error!(error = %e, "audit summary failed");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "audit summary failed")
    })?;
    Ok(Json(summary))
}

async fn levels(
    State(state): State<Arc<StatsState>>,
    Query(params): Query<TenantParams>,
) -> Result<Json<Vec<String>>, ApiError> {
    let session = tenant_session(&state, &params.organization_id).await?;
    let levels = stats::levels(&session).await.map_err(|e| {
        tracing::error!(error = %e, "audit level listing failed");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "audit level listing failed")
    })?;
    Ok(Json(levels))
}
