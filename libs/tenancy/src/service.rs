//! Directory service: the one place that ties the catalog, the provisioner
//! and the session factory together. Feature modules consume it through the
//! [`TenantDirectory`] trait via the client hub, so module crates depend on
//! this crate's traits only, never on the server's wiring.

use std::sync::Arc;

use async_trait::async_trait;
use modhost_db::DbHandle;
use uuid::Uuid;

use crate::catalog::{self, CatalogUser, NewOrganization, Organization};
use crate::provisioner::TenantProvisioner;
use crate::sessions::{TenantSession, TenantSessions};
use crate::{TenancyError, password};

/// Capability surface modules use to reach tenant data.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Catalog lookup; absence is a normal outcome.
    async fn organization(&self, id: &str) -> Result<Option<Organization>, TenancyError>;

    /// Read-only catalog listing.
    async fn organizations(&self) -> Result<Vec<Organization>, TenancyError>;

    /// A session scoped to one organization's isolated database.
    async fn session(&self, organization_id: &str) -> Result<TenantSession, TenancyError>;
}

/// Concrete directory backed by the shared catalog database.
pub struct DirectoryService {
    catalog: Arc<DbHandle>,
    sessions: Arc<TenantSessions>,
    provisioner: TenantProvisioner,
}

impl DirectoryService {
    #[must_use]
    pub fn new(
        catalog: Arc<DbHandle>,
        sessions: Arc<TenantSessions>,
        provisioner: TenantProvisioner,
    ) -> Self {
        Self {
            catalog,
            sessions,
            provisioner,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<DbHandle> {
        &self.catalog
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<TenantSessions> {
        &self.sessions
    }

    /// Create an organization and synchronously provision its isolated
    /// database; the organization is usable only once this returns `Ok`.
    ///
    /// # Errors
    /// Propagates provisioning failures after compensating cleanup.
    pub async fn create_organization(
        &self,
        req: NewOrganization,
    ) -> Result<Organization, TenancyError> {
        self.provisioner.provision(req).await
    }

    /// Delete an organization's catalog row. Returns whether it existed.
    ///
    /// # Errors
    /// Returns the underlying database error.
    // TODO: reclaim the tenant database when an organization is deleted;
    // today the row goes away and the database stays for manual archival.
    pub async fn delete_organization(&self, id: &str) -> Result<bool, TenancyError> {
        catalog::delete_organization(&self.catalog, id).await
    }

    /// Make sure the configured platform superuser can log in against the
    /// shared entry point. Idempotent; runs at every boot.
    ///
    /// # Errors
    /// Returns database or hashing errors.
    pub async fn ensure_first_superuser(
        &self,
        email: &str,
        plain_password: &str,
    ) -> Result<(), TenancyError> {
        if catalog::find_user_by_email(&self.catalog, email)
            .await?
            .is_some()
        {
            return Ok(());
        }
        let user = CatalogUser {
            id: Uuid::new_v4().to_string(),
            email: email.to_owned(),
            hashed_password: password::hash_password(plain_password)?,
            full_name: Some("Platform Superuser".to_owned()),
            is_active: true,
            is_superuser: true,
            organization_id: None,
        };
        catalog::insert_user(&self.catalog, &user).await?;
        tracing::info!(email, "seeded first catalog superuser");
        Ok(())
    }

    /// Operator entry point for crash recovery; see
    /// [`TenantProvisioner::sweep_stale_provisional`].
    ///
    /// # Errors
    /// Returns the underlying database error.
    pub async fn sweep_stale_provisional(
        &self,
        older_than: chrono::Duration,
    ) -> Result<u64, TenancyError> {
        self.provisioner.sweep_stale_provisional(older_than).await
    }
}

#[async_trait]
impl TenantDirectory for DirectoryService {
    async fn organization(&self, id: &str) -> Result<Option<Organization>, TenancyError> {
        catalog::get_organization(&self.catalog, id).await
    }

    async fn organizations(&self) -> Result<Vec<Organization>, TenancyError> {
        catalog::list_organizations(&self.catalog).await
    }

    async fn session(&self, organization_id: &str) -> Result<TenantSession, TenancyError> {
        let org = catalog::get_organization(&self.catalog, organization_id)
            .await?
            .ok_or_else(|| TenancyError::OrganizationNotFound(organization_id.to_owned()))?;
        self.sessions.session_for(&org).await
    }
}
