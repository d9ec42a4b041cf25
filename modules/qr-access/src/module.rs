//! Module wiring for QR access.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::RngCore;
use serde::Deserialize;

use modhost::{Module, ModuleCtx, ModuleDescriptor, ModuleHealth};

use crate::passes::{EntryPass, PassService, PassVerdict};

const DEFAULT_PASS_TTL_SECS: u64 = 120;

#[derive(Debug, Deserialize)]
struct QrAccessConfig {
    pass_ttl_secs: u64,
}

impl Default for QrAccessConfig {
    fn default() -> Self {
        Self {
            pass_ttl_secs: DEFAULT_PASS_TTL_SECS,
        }
    }
}

/// QR entry-pass module: issues signed short-lived passes and validates
/// them at the gate.
pub struct QrAccessModule {
    descriptor: ModuleDescriptor,
    service: Arc<PassService>,
}

impl Default for QrAccessModule {
    fn default() -> Self {
        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        Self {
            descriptor: ModuleDescriptor {
                name: "qr-access".to_owned(),
                version: "1.2.0".to_owned(),
                description: "QR entry-pass issuance and validation".to_owned(),
                author: "Gatehouse Team".to_owned(),
                license_required: true,
                is_external: false,
                dependencies: Vec::new(),
            },
            service: Arc::new(PassService::new(secret, DEFAULT_PASS_TTL_SECS)),
        }
    }
}

#[async_trait]
impl Module for QrAccessModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn initialize(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        let cfg: QrAccessConfig = ctx.config()?;
        self.service.set_ttl_secs(cfg.pass_ttl_secs);
        tracing::info!(ttl_secs = cfg.pass_ttl_secs, "qr-access ready");
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> ModuleHealth {
        ModuleHealth::ok_with(serde_json::json!({
            "issued": self.service.issued_count(),
            "pass_ttl_secs": self.service.ttl_secs(),
        }))
    }

    fn exposed_routes(&self) -> Router {
        Router::new()
            .route("/passes", post(issue_pass))
            .route("/passes/validate", post(validate_pass))
            .route("/status", get(status))
            .with_state(Arc::clone(&self.service))
    }
}

#[derive(Debug, Deserialize)]
struct IssueRequest {
    organization_id: String,
    access_point: String,
}

async fn issue_pass(
    State(service): State<Arc<PassService>>,
    Json(req): Json<IssueRequest>,
) -> (StatusCode, Json<EntryPass>) {
    let pass = service.issue(&req.organization_id, &req.access_point);
    (StatusCode::CREATED, Json(pass))
}

async fn validate_pass(
    State(service): State<Arc<PassService>>,
    Json(pass): Json<EntryPass>,
) -> Json<PassVerdict> {
    Json(service.validate(&pass))
}

async fn status(State(service): State<Arc<PassService>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "active",
        "type": "qr_access",
        "issued": service.issued_count(),
    }))
}
