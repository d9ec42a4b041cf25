//! Process-wide module table and lifecycle driver.
//!
//! The registry is explicit state owned by the boot routine — constructed
//! empty, filled by the loader, drained through [`ModuleRegistry::shutdown_all`]
//! — so tests can run any number of independent registries in parallel.
//!
//! Registration order is the single source of ordering: initialization and
//! route mounting walk it forward, shutdown walks it in reverse.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use parking_lot::RwLock;
use serde::Serialize;

use crate::context::ModuleEnv;
use crate::contracts::{Module, ModuleDescriptor, ModuleHealth};

/// Lifecycle state of a registered module. Owned exclusively by the
/// registry; `Initializing → Failed` is terminal for the boot cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Loaded,
    Initializing,
    Running,
    Failed,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Registering a name that is already present is a hard error for that
    /// one registration; the first instance is never silently overwritten.
    #[error("module '{0}' is already registered")]
    DuplicateName(String),
}

/// One registered module with its registry-owned state.
pub struct ModuleEntry {
    descriptor: ModuleDescriptor,
    module: Arc<dyn Module>,
    state: RwLock<ModuleState>,
}

impl ModuleEntry {
    #[must_use]
    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn state(&self) -> ModuleState {
        *self.state.read()
    }

    /// Probe the module's health. Only meaningful once running; any other
    /// state reports `None` rather than touching the module.
    pub async fn health(&self) -> Option<ModuleHealth> {
        if self.state() == ModuleState::Running {
            Some(self.module.health_check().await)
        } else {
            None
        }
    }

    fn set_state(&self, next: ModuleState) {
        *self.state.write() = next;
    }
}

/// Outcome of [`ModuleRegistry::initialize_all`]. Partial boot is expected:
/// failures are listed, not raised.
#[derive(Debug, Default)]
pub struct BootReport {
    pub started: Vec<String>,
    pub failed: Vec<BootFailure>,
}

#[derive(Debug)]
pub struct BootFailure {
    pub module: String,
    pub error: String,
}

/// Ordered, name-unique table of loaded modules.
///
/// Reads (`list_modules`, `get`, health probes) are safe concurrently with
/// `initialize_all`/`shutdown_all`: the entry list is only mutated by
/// boot-phase `register` calls, and per-entry state sits behind its own lock.
#[derive(Default)]
pub struct ModuleRegistry {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Arc<ModuleEntry>>,
    by_name: HashMap<String, usize>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module in `Loaded` state, appending to discovery order.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateName`] if the descriptor name is
    /// already present.
    pub fn register(&self, module: Arc<dyn Module>) -> Result<(), RegistryError> {
        let descriptor = module.descriptor().clone();
        let mut inner = self.inner.write();
        if inner.by_name.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateName(descriptor.name));
        }
        tracing::info!(
            module = %descriptor.name,
            version = %descriptor.version,
            "module registered"
        );
        let index = inner.entries.len();
        inner.by_name.insert(descriptor.name.clone(), index);
        inner.entries.push(Arc::new(ModuleEntry {
            descriptor,
            module,
            state: RwLock::new(ModuleState::Loaded),
        }));
        Ok(())
    }

    /// Initialize every registered module, in registration order.
    ///
    /// A module that fails is marked `Failed`, excluded from route mounting
    /// and health aggregation, and the loop continues: one broken module
    /// never aborts the boot. Each module's `initialize` runs at most once
    /// per process lifetime — only `Loaded` entries are touched.
    pub async fn initialize_all(&self, env: &ModuleEnv) -> BootReport {
        let mut report = BootReport::default();
        for entry in self.snapshot() {
            let name = entry.descriptor.name.clone();
            if entry.state() != ModuleState::Loaded {
                continue;
            }
            entry.set_state(ModuleState::Initializing);
            tracing::info!(module = %name, "initializing module");
            let ctx = env.for_module(&name);
            match entry.module.initialize(&ctx).await {
                Ok(()) => {
                    entry.set_state(ModuleState::Running);
                    report.started.push(name);
                }
                Err(e) => {
                    entry.set_state(ModuleState::Failed);
                    tracing::error!(module = %name, error = %e, "module initialization failed");
                    report.failed.push(BootFailure {
                        module: name,
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Mount every running module's routes under
    /// `{namespace_prefix}/{name}`, in registration order. Modules that did
    /// not reach `Running` are never mounted (fail-closed).
    ///
    /// `namespace_prefix` must start with `/` and carry no trailing slash,
    /// e.g. `/api/v1/modules`.
    #[must_use]
    pub fn mount_routes(&self, host: Router, namespace_prefix: &str) -> Router {
        let mut host = host;
        for entry in self.snapshot() {
            if entry.state() != ModuleState::Running {
                continue;
            }
            let path = format!("{namespace_prefix}/{}", entry.descriptor.name);
            tracing::info!(module = %entry.descriptor.name, path = %path, "mounting module routes");
            host = host.nest(&path, entry.module.exposed_routes());
        }
        host
    }

    /// Shut down running modules in reverse registration order. Failures are
    /// logged, never propagated, so every later module still gets its
    /// shutdown attempt.
    pub async fn shutdown_all(&self) {
        for entry in self.snapshot().into_iter().rev() {
            if entry.state() != ModuleState::Running {
                continue;
            }
            entry.set_state(ModuleState::ShuttingDown);
            let name = &entry.descriptor.name;
            tracing::info!(module = %name, "shutting down module");
            if let Err(e) = entry.module.shutdown().await {
                tracing::warn!(module = %name, error = %e, "module shutdown failed");
            }
            entry.set_state(ModuleState::Stopped);
        }
    }

    /// Read-only snapshot of registered descriptors, in registration order.
    #[must_use]
    pub fn list_modules(&self) -> Vec<ModuleDescriptor> {
        self.inner
            .read()
            .entries
            .iter()
            .map(|e| e.descriptor.clone())
            .collect()
    }

    /// Lookup by name. Absence is a normal outcome, not an error.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ModuleEntry>> {
        let inner = self.inner.read();
        let index = *inner.by_name.get(name)?;
        Some(Arc::clone(&inner.entries[index]))
    }

    /// Health of every running module, keyed by name. Failed and stopped
    /// modules are excluded.
    pub async fn health_report(&self) -> Vec<(String, ModuleHealth)> {
        let mut out = Vec::new();
        for entry in self.snapshot() {
            if let Some(health) = entry.health().await {
                out.push((entry.descriptor.name.clone(), health));
            }
        }
        out
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<ModuleEntry>> {
        self.inner.read().entries.iter().map(Arc::clone).collect()
    }
}
