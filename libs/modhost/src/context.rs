//! Module execution contexts.
//!
//! [`ModuleEnv`] is the host-owned bundle of shared services created once by
//! the boot routine; it hands module factories their optional shared context
//! and derives a per-module [`ModuleCtx`] for each lifecycle call.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::client_hub::ClientHub;
use crate::config::{ConfigError, ConfigProvider, module_config_or_default};

/// Shared services handle passed to module factories and used by the
/// registry to build per-module contexts.
#[derive(Clone)]
pub struct ModuleEnv {
    config_provider: Arc<dyn ConfigProvider>,
    client_hub: Arc<ClientHub>,
    root_token: CancellationToken,
}

impl ModuleEnv {
    #[must_use]
    pub fn new(
        config_provider: Arc<dyn ConfigProvider>,
        client_hub: Arc<ClientHub>,
        root_token: CancellationToken,
    ) -> Self {
        Self {
            config_provider,
            client_hub,
            root_token,
        }
    }

    #[must_use]
    pub fn client_hub(&self) -> &Arc<ClientHub> {
        &self.client_hub
    }

    #[must_use]
    pub fn config_provider(&self) -> &dyn ConfigProvider {
        &*self.config_provider
    }

    /// Derive the scoped context for one module. Each module gets a child
    /// cancellation token, so the host can cancel everything at once while a
    /// future revocation path could cancel one module alone.
    #[must_use]
    pub fn for_module(&self, module_name: &str) -> ModuleCtx {
        ModuleCtx {
            module_name: Arc::from(module_name),
            config_provider: Arc::clone(&self.config_provider),
            client_hub: Arc::clone(&self.client_hub),
            cancellation_token: self.root_token.child_token(),
        }
    }
}

/// Per-module execution context passed to `Module::initialize`.
#[derive(Clone)]
pub struct ModuleCtx {
    module_name: Arc<str>,
    config_provider: Arc<dyn ConfigProvider>,
    client_hub: Arc<ClientHub>,
    cancellation_token: CancellationToken,
}

impl ModuleCtx {
    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// The service registry for inter-module collaboration. Register your
    /// public API here during `initialize`; consume other modules' APIs the
    /// same way.
    #[must_use]
    pub fn client_hub(&self) -> &ClientHub {
        &self.client_hub
    }

    /// Cancellation token for graceful-shutdown coordination of any
    /// background work the module spawns.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    /// Deserialize this module's config section, falling back to
    /// `T::default()` when the section is absent.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] when a present section does not
    /// deserialize.
    pub fn config<T: DeserializeOwned + Default>(&self) -> Result<T, ConfigError> {
        module_config_or_default(self.config_provider.as_ref(), &self.module_name)
    }

    /// The raw JSON section, for dynamic inspection.
    #[must_use]
    pub fn raw_config(&self) -> serde_json::Value {
        self.config_provider
            .module_section(&self.module_name)
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()))
    }
}
