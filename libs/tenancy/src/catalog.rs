//! Catalog records and repository functions for the shared database.

use modhost_db::DbHandle;
use serde::{Deserialize, Serialize};

use crate::{TenancyError, on_pool, schema};

/// Provisioning progress of an organization's isolated database. Persisted
/// on the catalog row after each completed stage, so a crash mid-way leaves
/// a row that a cleanup sweep can identify; `Ready` is the activation flip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStatus {
    Pending,
    DbCreated,
    SchemaReady,
    SeededOrg,
    SuperuserReady,
    Ready,
    Failed,
}

impl ProvisioningStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::DbCreated => "db_created",
            Self::SchemaReady => "schema_ready",
            Self::SeededOrg => "seeded_org",
            Self::SuperuserReady => "superuser_ready",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "db_created" => Some(Self::DbCreated),
            "schema_ready" => Some(Self::SchemaReady),
            "seeded_org" => Some(Self::SeededOrg),
            "superuser_ready" => Some(Self::SuperuserReady),
            "ready" => Some(Self::Ready),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// An organization as stored in the catalog. `db_name` is the sole handle
/// the session factory uses to address the tenant's isolated storage.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Organization {
    pub id: String,
    pub name: String,
    /// residential, office, commercial, …
    pub kind: String,
    pub address: String,
    pub contact_email: String,
    pub is_active: bool,
    pub db_name: String,
    pub provisioning_status: String,
    pub created_at: String,
}

impl Organization {
    #[must_use]
    pub fn status(&self) -> Option<ProvisioningStatus> {
        ProvisioningStatus::parse(&self.provisioning_status)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status() == Some(ProvisioningStatus::Ready)
    }
}

/// Create-organization request: catalog fields plus the credentials for the
/// tenant's first privileged account.
#[derive(Clone, Debug, Deserialize)]
pub struct NewOrganization {
    pub name: String,
    pub kind: String,
    pub address: String,
    pub contact_email: String,
    pub admin_email: String,
    pub admin_password: String,
}

/// A login-capable account in the shared catalog.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct CatalogUser {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub organization_id: Option<String>,
}

/// Apply the catalog schema (idempotent).
///
/// # Errors
/// Returns the underlying database error.
pub async fn apply_catalog_schema(db: &DbHandle) -> Result<(), TenancyError> {
    db.execute_batch(schema::CATALOG_SCHEMA).await?;
    Ok(())
}

/// # Errors
/// Returns the underlying database error (including unique violations on
/// `db_name`).
pub async fn insert_organization(db: &DbHandle, org: &Organization) -> Result<(), TenancyError> {
    on_pool!(db, |pool| {
        sqlx::query(
            "INSERT INTO organizations \
             (id, name, kind, address, contact_email, is_active, db_name, provisioning_status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&org.id)
        .bind(&org.name)
        .bind(&org.kind)
        .bind(&org.address)
        .bind(&org.contact_email)
        .bind(org.is_active)
        .bind(&org.db_name)
        .bind(&org.provisioning_status)
        .bind(&org.created_at)
        .execute(pool)
        .await?;
    });
    Ok(())
}

/// # Errors
/// Returns the underlying database error.
pub async fn get_organization(
    db: &DbHandle,
    id: &str,
) -> Result<Option<Organization>, TenancyError> {
    let row = on_pool!(db, |pool| {
        sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
    });
    Ok(row)
}

/// # Errors
/// Returns the underlying database error.
pub async fn list_organizations(db: &DbHandle) -> Result<Vec<Organization>, TenancyError> {
    let rows = on_pool!(db, |pool| {
        sqlx::query_as::<_, Organization>("SELECT * FROM organizations ORDER BY created_at, id")
            .fetch_all(pool)
            .await?
    });
    Ok(rows)
}

/// Delete an organization row. Returns whether a row existed.
///
/// # Errors
/// Returns the underlying database error.
pub async fn delete_organization(db: &DbHandle, id: &str) -> Result<bool, TenancyError> {
    let affected = on_pool!(db, |pool| {
        sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected()
    });
    Ok(affected > 0)
}

/// # Errors
/// Returns the underlying database error.
pub async fn update_org_status(
    db: &DbHandle,
    id: &str,
    status: ProvisioningStatus,
) -> Result<(), TenancyError> {
    on_pool!(db, |pool| {
        sqlx::query("UPDATE organizations SET provisioning_status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(pool)
            .await?;
    });
    Ok(())
}

/// # Errors
/// Returns the underlying database error.
pub async fn update_org_db_name(
    db: &DbHandle,
    id: &str,
    db_name: &str,
) -> Result<(), TenancyError> {
    on_pool!(db, |pool| {
        sqlx::query("UPDATE organizations SET db_name = $1 WHERE id = $2")
            .bind(db_name)
            .bind(id)
            .execute(pool)
            .await?;
    });
    Ok(())
}

/// # Errors
/// Returns the underlying database error (including unique violations on
/// `email`).
pub async fn insert_user(db: &DbHandle, user: &CatalogUser) -> Result<(), TenancyError> {
    on_pool!(db, |pool| {
        sqlx::query(
            "INSERT INTO users \
             (id, email, hashed_password, full_name, is_active, is_superuser, organization_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.hashed_password)
        .bind(&user.full_name)
        .bind(user.is_active)
        .bind(user.is_superuser)
        .bind(&user.organization_id)
        .execute(pool)
        .await?;
    });
    Ok(())
}

/// # Errors
/// Returns the underlying database error.
pub async fn find_user_by_email(
    db: &DbHandle,
    email: &str,
) -> Result<Option<CatalogUser>, TenancyError> {
    let row = on_pool!(db, |pool| {
        sqlx::query_as::<_, CatalogUser>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(pool)
            .await?
    });
    Ok(row)
}

/// Delete provisional organization rows created before the cutoff (RFC 3339).
/// Crash recovery for rows whose provisioning never reached `Ready`; returns
/// the number of rows removed.
///
/// # Errors
/// Returns the underlying database error.
pub async fn sweep_stale_provisional(
    db: &DbHandle,
    cutoff_rfc3339: &str,
) -> Result<u64, TenancyError> {
    let affected = on_pool!(db, |pool| {
        sqlx::query(
            "DELETE FROM organizations WHERE provisioning_status != 'ready' AND created_at < $1",
        )
        .bind(cutoff_rfc3339)
        .execute(pool)
        .await?
        .rows_affected()
    });
    if affected > 0 {
        tracing::info!(rows = affected, "swept stale provisional organizations");
    }
    Ok(affected)
}
