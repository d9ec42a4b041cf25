//! Tenant provisioning state machine.
//!
//! Brings a new organization's isolated storage online, synchronously within
//! the create-organization flow:
//!
//! ```text
//! Pending -> DbCreated -> SchemaReady -> SeededOrg -> SuperuserReady -> Ready
//!      \________\____________\______________\________________\-> Failed
//! ```
//!
//! The catalog row is inserted optimistically before anything else (to obtain
//! the id) and every completed stage persists its status to that row, so an
//! interrupted run leaves a provisional row a sweep can identify. Any stage
//! failure compensates — drop the tenant database if it was created, delete
//! the catalog row — before surfacing: an organization record with no usable
//! backing database must never stay visible to callers.
//!
//! There is no automatic retry and no cancellation of an in-flight run; the
//! caller retries the whole create-organization operation, which generates a
//! fresh database identifier.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use modhost_db::{AdminDb, ConnectOpts, DbError, DbHandle, DsnTemplate};
use rand::RngCore;
use uuid::Uuid;

use crate::catalog::{self, CatalogUser, NewOrganization, Organization, ProvisioningStatus};
use crate::{TenancyError, on_pool, password, schema};

/// Bounded retry budget for database-name generation.
const DEFAULT_NAME_ATTEMPTS: u32 = 5;

/// Generator of tenant database identifiers.
///
/// Must be collision-resistant under concurrent generation: collisions are
/// survived by retry, not prevented by a lock. Deterministic implementations
/// exist for tests.
pub trait DbNameGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Default generator: `org_` + 12 hex characters (48 random bits).
pub struct RandomDbNames;

impl DbNameGenerator for RandomDbNames {
    fn generate(&self) -> String {
        let mut bytes = [0u8; 6];
        rand::rng().fill_bytes(&mut bytes);
        format!("org_{}", hex::encode(bytes))
    }
}

/// The provisioning step that failed, surfaced for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionStage {
    CreateDatabase,
    ApplySchema,
    SeedOrganization,
    CreateTenantSuperuser,
    CreateCatalogLogin,
}

impl ProvisionStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateDatabase => "create_database",
            Self::ApplySchema => "apply_schema",
            Self::SeedOrganization => "seed_organization",
            Self::CreateTenantSuperuser => "create_tenant_superuser",
            Self::CreateCatalogLogin => "create_catalog_login",
        }
    }
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum StageFailure {
    /// Name generation exhausted its retry budget.
    Collision(u32),
    Stage {
        stage: ProvisionStage,
        source: anyhow::Error,
        db_created: bool,
    },
}

fn stage_failure(
    stage: ProvisionStage,
    source: impl Into<anyhow::Error>,
    db_created: bool,
) -> StageFailure {
    StageFailure::Stage {
        stage,
        source: source.into(),
        db_created,
    }
}

/// State machine driver for standing up one tenant database.
pub struct TenantProvisioner {
    admin: AdminDb,
    template: DsnTemplate,
    catalog: Arc<DbHandle>,
    names: Arc<dyn DbNameGenerator>,
    tenant_schema: Cow<'static, str>,
    max_name_attempts: u32,
}

impl TenantProvisioner {
    #[must_use]
    pub fn new(admin: AdminDb, template: DsnTemplate, catalog: Arc<DbHandle>) -> Self {
        Self {
            admin,
            template,
            catalog,
            names: Arc::new(RandomDbNames),
            tenant_schema: Cow::Borrowed(schema::TENANT_SCHEMA),
            max_name_attempts: DEFAULT_NAME_ATTEMPTS,
        }
    }

    /// Replace the identifier generator (deterministic ones in tests).
    #[must_use]
    pub fn with_name_generator(mut self, names: Arc<dyn DbNameGenerator>) -> Self {
        self.names = names;
        self
    }

    /// Replace the tenant schema statement set.
    #[must_use]
    pub fn with_tenant_schema(mut self, sql: impl Into<Cow<'static, str>>) -> Self {
        self.tenant_schema = sql.into();
        self
    }

    #[must_use]
    pub fn with_max_name_attempts(mut self, attempts: u32) -> Self {
        self.max_name_attempts = attempts.max(1);
        self
    }

    /// Run the full state machine for one new organization.
    ///
    /// Blocks until `Ready` or `Failed`; a caller-imposed timeout means
    /// "unknown outcome, verify before retrying".
    ///
    /// # Errors
    /// [`TenancyError::NameCollision`] when identifier generation exhausts
    /// its budget, [`TenancyError::Provision`] for any later stage — in both
    /// cases after compensating cleanup.
    pub async fn provision(&self, req: NewOrganization) -> Result<Organization, TenancyError> {
        let mut org = Organization {
            id: Uuid::new_v4().to_string(),
            name: req.name.clone(),
            kind: req.kind.clone(),
            address: req.address.clone(),
            contact_email: req.contact_email.clone(),
            is_active: true,
            db_name: self.names.generate(),
            provisioning_status: ProvisioningStatus::Pending.as_str().to_owned(),
            created_at: Utc::now().to_rfc3339(),
        };

        // The row goes in first to obtain a stable id; everything after this
        // point must either reach Ready or take this row back out.
        catalog::insert_organization(&self.catalog, &org).await?;
        tracing::info!(org = %org.id, db = %org.db_name, "provisioning tenant");

        match self.run_stages(&mut org, &req).await {
            Ok(()) => {
                org.provisioning_status = ProvisioningStatus::Ready.as_str().to_owned();
                tracing::info!(org = %org.id, db = %org.db_name, "tenant provisioned");
                Ok(org)
            }
            Err(StageFailure::Collision(attempts)) => {
                self.compensate(&org, false).await;
                Err(TenancyError::NameCollision(attempts))
            }
            Err(StageFailure::Stage {
                stage,
                source,
                db_created,
            }) => {
                tracing::error!(
                    org = %org.id,
                    db = %org.db_name,
                    stage = %stage,
                    error = %source,
                    "tenant provisioning failed"
                );
                self.compensate(&org, db_created).await;
                Err(TenancyError::Provision { stage, source })
            }
        }
    }

    /// Delete provisional catalog rows older than `older_than`. Recovery for
    /// crashes that bypassed the in-band compensation path.
    ///
    /// # Errors
    /// Returns the underlying database error.
    pub async fn sweep_stale_provisional(
        &self,
        older_than: chrono::Duration,
    ) -> Result<u64, TenancyError> {
        let cutoff = (Utc::now() - older_than).to_rfc3339();
        catalog::sweep_stale_provisional(&self.catalog, &cutoff).await
    }

    async fn run_stages(
        &self,
        org: &mut Organization,
        req: &NewOrganization,
    ) -> Result<(), StageFailure> {
        self.create_database_with_retry(org).await?;
        self.advance(org, ProvisioningStatus::DbCreated, ProvisionStage::CreateDatabase)
            .await?;

        let tenant = self
            .connect_tenant(&org.db_name)
            .await
            .map_err(|e| stage_failure(ProvisionStage::ApplySchema, e, true))?;
        let staged = self.stages_on_tenant(org, req, &tenant).await;
        // One close on every path; pooled connections are already back.
        tenant.close().await;
        staged
    }

    /// `New -> DbCreated`: create the database, retrying generation on
    /// collision up to the budget. Collisions are detected distinctly from
    /// other errors and never consume the whole operation silently.
    async fn create_database_with_retry(&self, org: &mut Organization) -> Result<(), StageFailure> {
        for attempt in 1..=self.max_name_attempts {
            match self.admin.create_database(&org.db_name).await {
                Ok(()) => return Ok(()),
                Err(DbError::NameCollision(name)) => {
                    tracing::warn!(
                        org = %org.id,
                        db = %name,
                        attempt,
                        "tenant database name collision"
                    );
                    if attempt == self.max_name_attempts {
                        break;
                    }
                    org.db_name = self.names.generate();
                    catalog::update_org_db_name(&self.catalog, &org.id, &org.db_name)
                        .await
                        .map_err(|e| {
                            stage_failure(ProvisionStage::CreateDatabase, e, false)
                        })?;
                }
                Err(e) => {
                    return Err(stage_failure(ProvisionStage::CreateDatabase, e, false));
                }
            }
        }
        Err(StageFailure::Collision(self.max_name_attempts))
    }

    async fn stages_on_tenant(
        &self,
        org: &mut Organization,
        req: &NewOrganization,
        tenant: &DbHandle,
    ) -> Result<(), StageFailure> {
        // DbCreated -> SchemaReady
        tenant
            .execute_batch(&self.tenant_schema)
            .await
            .map_err(|e| stage_failure(ProvisionStage::ApplySchema, e, true))?;
        self.advance(org, ProvisioningStatus::SchemaReady, ProvisionStage::ApplySchema)
            .await?;

        // SchemaReady -> SeededOrg: mirror the catalog record so the tenant
        // database is self-describing.
        seed_organization_mirror(tenant, org)
            .await
            .map_err(|e| stage_failure(ProvisionStage::SeedOrganization, e, true))?;
        self.advance(org, ProvisioningStatus::SeededOrg, ProvisionStage::SeedOrganization)
            .await?;

        // SeededOrg -> SuperuserReady: privileged account inside the tenant.
        let hashed = password::hash_password(&req.admin_password)
            .map_err(|e| stage_failure(ProvisionStage::CreateTenantSuperuser, e, true))?;
        create_tenant_superuser(tenant, &req.admin_email, &hashed)
            .await
            .map_err(|e| stage_failure(ProvisionStage::CreateTenantSuperuser, e, true))?;
        self.advance(
            org,
            ProvisioningStatus::SuperuserReady,
            ProvisionStage::CreateTenantSuperuser,
        )
        .await?;

        // SuperuserReady -> Ready: matching login in the shared catalog.
        let login = CatalogUser {
            id: Uuid::new_v4().to_string(),
            email: req.admin_email.clone(),
            hashed_password: hashed,
            full_name: Some("Organization Admin".to_owned()),
            is_active: true,
            is_superuser: true,
            organization_id: Some(org.id.clone()),
        };
        catalog::insert_user(&self.catalog, &login)
            .await
            .map_err(|e| stage_failure(ProvisionStage::CreateCatalogLogin, e, true))?;
        self.advance(org, ProvisioningStatus::Ready, ProvisionStage::CreateCatalogLogin)
            .await?;

        Ok(())
    }

    /// Persist a completed stage's status to the catalog row. A persistence
    /// failure is attributed to the stage that just ran.
    async fn advance(
        &self,
        org: &mut Organization,
        status: ProvisioningStatus,
        stage: ProvisionStage,
    ) -> Result<(), StageFailure> {
        catalog::update_org_status(&self.catalog, &org.id, status)
            .await
            .map_err(|e| stage_failure(stage, e, true))?;
        org.provisioning_status = status.as_str().to_owned();
        tracing::debug!(org = %org.id, status = status.as_str(), "provisioning advanced");
        Ok(())
    }

    /// Compensating actions: best-effort drop of the tenant database, then
    /// removal of the optimistic catalog row.
    async fn compensate(&self, org: &Organization, db_created: bool) {
        if db_created {
            if let Err(e) = self.admin.drop_database(&org.db_name).await {
                tracing::warn!(
                    org = %org.id,
                    db = %org.db_name,
                    error = %e,
                    "failed to drop tenant database during compensation"
                );
            }
        }
        match catalog::delete_organization(&self.catalog, &org.id).await {
            Ok(_) => {}
            Err(e) => {
                // The invariant "no catalog row without a backing database"
                // is now violated; the stale-provisional sweep is the net.
                tracing::error!(
                    org = %org.id,
                    error = %e,
                    "failed to delete catalog row after provisioning failure"
                );
            }
        }
    }

    async fn connect_tenant(&self, db_name: &str) -> Result<DbHandle, TenancyError> {
        let dsn = self.template.render(db_name)?;
        let opts = ConnectOpts {
            // The database was just created by the admin connection; the
            // tenant handle must never invent one.
            create_sqlite_dbs: false,
            ..ConnectOpts::default()
        };
        Ok(DbHandle::connect(&dsn, &opts).await?)
    }
}

async fn seed_organization_mirror(
    tenant: &DbHandle,
    org: &Organization,
) -> Result<(), modhost_db::DbError> {
    on_pool!(tenant, |pool| {
        sqlx::query(
            "INSERT INTO organizations \
             (id, name, kind, address, contact_email, is_active, db_name, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&org.id)
        .bind(&org.name)
        .bind(&org.kind)
        .bind(&org.address)
        .bind(&org.contact_email)
        .bind(org.is_active)
        .bind(&org.db_name)
        .bind(&org.created_at)
        .execute(pool)
        .await?;
    });
    Ok(())
}

async fn create_tenant_superuser(
    tenant: &DbHandle,
    email: &str,
    hashed_password: &str,
) -> Result<(), modhost_db::DbError> {
    on_pool!(tenant, |pool| {
        sqlx::query(
            "INSERT INTO users \
             (id, email, hashed_password, full_name, is_active, is_superuser) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(email)
        .bind(hashed_password)
        .bind("Organization Admin")
        .bind(true)
        .bind(true)
        .execute(pool)
        .await?;
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_names_are_well_formed_and_distinct() {
        let names = RandomDbNames;
        let a = names.generate();
        let b = names.generate();
        assert!(a.starts_with("org_") && a.len() == 16);
        assert!(modhost_db::is_valid_db_name(&a));
        assert_ne!(a, b);
    }

    #[test]
    fn stage_names_are_stable() {
        assert_eq!(ProvisionStage::CreateDatabase.to_string(), "create_database");
        assert_eq!(ProvisionStage::CreateCatalogLogin.to_string(), "create_catalog_login");
    }
}
