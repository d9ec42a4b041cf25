//! Gatehouse module host.
//!
//! The extensibility core of the platform: feature modules (QR access, audit
//! analytics, external connectors, …) implement the [`Module`] capability
//! contract, declare themselves in a source-root manifest, and are picked up
//! at boot by the [`loader`] and driven through their lifecycle by the
//! [`registry`] — without any change to core code.
//!
//! Boot sequence, in order:
//!
//! 1. [`loader::scan_and_register`] walks the configured source roots,
//!    builds each manifest entry in isolation and registers the survivors.
//! 2. [`registry::ModuleRegistry::initialize_all`] drives every registered
//!    module to `Running` or `Failed`; one module's failure never aborts the
//!    boot.
//! 3. [`registry::ModuleRegistry::mount_routes`] exposes each running
//!    module's router under a namespaced path. Modules that failed to
//!    initialize are never mounted.
//! 4. On shutdown, [`registry::ModuleRegistry::shutdown_all`] walks the
//!    registration order in reverse.

pub mod client_hub;
pub mod config;
pub mod context;
pub mod contracts;
pub mod loader;
pub mod registry;

pub use client_hub::ClientHub;
pub use config::{ConfigError, ConfigProvider};
pub use context::{ModuleCtx, ModuleEnv};
pub use contracts::{HealthStatus, Module, ModuleDescriptor, ModuleHealth};
pub use loader::{LoaderError, ManifestEntry, ScanReport, SourceRoot};
pub use registry::{BootReport, ModuleRegistry, ModuleState, RegistryError};

// Re-exported for the `register_module!` macro.
pub use inventory;

/// Declare a module in a source-root manifest.
///
/// The entry key orders modules within their root (lexicographically) and
/// should match the module's descriptor name.
///
/// ```ignore
/// modhost::register_module!(SourceRoot::Builtin, "qr-access", |_env| {
///     Ok(std::sync::Arc::new(QrAccessModule::default()) as _)
/// });
/// ```
#[macro_export]
macro_rules! register_module {
    ($root:expr, $entry:literal, $build:expr) => {
        $crate::inventory::submit! {
            $crate::loader::ManifestEntry {
                root: $root,
                entry: $entry,
                build: $build,
            }
        }
    };
}
