//! Tenant session factory.
//!
//! Produces scoped data-access handles bound to one tenant's isolated
//! database by substituting its generated name into the shared connection
//! template. A handle scoped to tenant A can never observe tenant B's data:
//! isolation is by construction of the database name, with no shared-table
//! fallback to fall through to.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use modhost_db::{ConnectOpts, DbHandle, DsnTemplate};

use crate::catalog::Organization;
use crate::TenancyError;

/// Pool cache keyed by database name: one pool per tenant, shared by every
/// unit of work against that tenant.
pub struct TenantSessions {
    template: DsnTemplate,
    opts: ConnectOpts,
    pools: DashMap<String, Arc<DbHandle>>,
}

/// A scoped handle for one unit of work against one tenant's database.
///
/// Connections check out of the pool per operation and return on drop, so
/// release is deterministic on every exit path — success, business-logic
/// failure or infrastructure failure.
#[derive(Clone, Debug)]
pub struct TenantSession {
    handle: Arc<DbHandle>,
}

impl TenantSession {
    #[must_use]
    pub fn db(&self) -> &DbHandle {
        &self.handle
    }
}

impl TenantSessions {
    #[must_use]
    pub fn new(template: DsnTemplate, opts: ConnectOpts) -> Self {
        Self {
            template,
            // The factory addresses existing databases only; creating one is
            // the provisioner's job.
            opts: ConnectOpts {
                create_sqlite_dbs: false,
                ..opts
            },
            pools: DashMap::new(),
        }
    }

    /// Session for a catalog organization, refusing anything not `Ready`.
    ///
    /// # Errors
    /// Returns [`TenancyError::NotProvisioned`] for organizations whose
    /// provisioning never completed, or a connection error.
    pub async fn session_for(&self, org: &Organization) -> Result<TenantSession, TenancyError> {
        if !org.is_ready() {
            return Err(TenancyError::NotProvisioned(org.name.clone()));
        }
        self.open(&org.db_name).await
    }

    /// Session for a database name that is already known to be provisioned.
    ///
    /// # Errors
    /// Returns template or connection errors.
    pub async fn open(&self, db_name: &str) -> Result<TenantSession, TenancyError> {
        if let Some(existing) = self.pools.get(db_name) {
            return Ok(TenantSession {
                handle: Arc::clone(&existing),
            });
        }
        let dsn = self.template.render(db_name)?;
        let handle = Arc::new(DbHandle::connect(&dsn, &self.opts).await?);
        // Two concurrent first-openers race here; keep the stored pool and
        // close the loser's.
        let handle = match self.pools.entry(db_name.to_owned()) {
            Entry::Occupied(entry) => {
                handle.close().await;
                Arc::clone(entry.get())
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&handle));
                handle
            }
        };
        Ok(TenantSession { handle })
    }

    /// Close every cached pool. Called at process shutdown.
    pub async fn close_all(&self) {
        let names: Vec<String> = self.pools.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Some((_, handle)) = self.pools.remove(&name) {
                handle.close().await;
            }
        }
    }

    #[must_use]
    pub fn template(&self) -> &DsnTemplate {
        &self.template
    }
}
