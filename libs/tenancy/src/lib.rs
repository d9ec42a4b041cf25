//! Gatehouse tenancy: one isolated database per customer organization.
//!
//! The shared **catalog** database holds cross-tenant records (organizations
//! and login-capable accounts). Each organization's own data lives in a
//! dedicated database created by the [`provisioner`] state machine and
//! addressed exclusively through its generated database name by the
//! [`sessions`] factory. Tenant databases are full independent copies of the
//! schema — there is no shared-table fallback anywhere.

pub mod catalog;
pub mod password;
pub mod provisioner;
pub mod schema;
pub mod service;
pub mod sessions;

pub use catalog::{CatalogUser, NewOrganization, Organization, ProvisioningStatus};
pub use provisioner::{DbNameGenerator, ProvisionStage, RandomDbNames, TenantProvisioner};
pub use service::{DirectoryService, TenantDirectory};
pub use sessions::{TenantSession, TenantSessions};

use thiserror::Error;

/// Errors of the tenancy layer.
#[derive(Debug, Error)]
pub enum TenancyError {
    /// Database-name generation kept colliding; the whole create-organization
    /// operation failed and may be retried by the caller with fresh names.
    #[error("tenant database name collided on all {0} attempts")]
    NameCollision(u32),

    /// A provisioning step after name generation failed. The optimistic
    /// catalog row has been deleted and the tenant database (if created)
    /// dropped before this is returned.
    #[error("tenant provisioning failed at stage '{stage}'")]
    Provision {
        stage: provisioner::ProvisionStage,
        #[source]
        source: anyhow::Error,
    },

    /// An operation was attempted against an organization whose provisioning
    /// never reached `Ready`.
    #[error("organization '{0}' is not provisioned")]
    NotProvisioned(String),

    #[error("organization not found: {0}")]
    OrganizationNotFound(String),

    #[error(transparent)]
    Db(#[from] modhost_db::DbError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("password hashing failed: {0}")]
    Password(#[from] bcrypt::BcryptError),
}

pub(crate) use modhost_db::on_pool;
