//! The capability contract every feature module must satisfy.

use async_trait::async_trait;
use axum::Router;
use serde::Serialize;

/// Immutable metadata describing a module. Created once per module instance
/// at load time; the registry treats the name as the unique key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    /// Whether serving this module's routes requires an organization license.
    pub license_required: bool,
    /// True for modules discovered from the external connectors root.
    pub is_external: bool,
    /// Names of modules this one expects to be registered alongside it.
    /// Informational: the loader warns on unmet entries, nothing reorders.
    pub dependencies: Vec<String>,
}

impl ModuleDescriptor {
    /// Structural sanity used by the loader before registration: the name
    /// must be non-empty and safe to appear as a path segment.
    #[must_use]
    pub fn has_valid_name(&self) -> bool {
        !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    }
}

/// Status tag of a module health probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Error,
}

/// Result of a [`Module::health_check`] probe.
#[derive(Clone, Debug, Serialize)]
pub struct ModuleHealth {
    pub status: HealthStatus,
    /// Free-form detail payload (connection counts, cache sizes, …).
    pub details: serde_json::Value,
}

impl ModuleHealth {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: HealthStatus::Ok,
            details: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn ok_with(details: serde_json::Value) -> Self {
        Self {
            status: HealthStatus::Ok,
            details,
        }
    }

    #[must_use]
    pub fn degraded(details: serde_json::Value) -> Self {
        Self {
            status: HealthStatus::Degraded,
            details,
        }
    }

    #[must_use]
    pub fn error(details: serde_json::Value) -> Self {
        Self {
            status: HealthStatus::Error,
            details,
        }
    }
}

/// The plugin boundary: every module, regardless of source root, exposes
/// exactly these five operations.
///
/// Lifecycle guarantees are owned by the registry, not the module:
/// `initialize` is invoked at most once per process lifetime, `shutdown` at
/// most once and only after a successful `initialize`. `health_check` may be
/// called any number of times once the module is running, concurrently with
/// anything else, and must not mutate module state — which is why every
/// operation takes `&self`.
#[async_trait]
pub trait Module: Send + Sync + 'static {
    /// Pure, side-effect-free metadata accessor.
    fn descriptor(&self) -> &ModuleDescriptor;

    /// Bring the module up: network calls, cache warming, collaborator
    /// lookup through [`crate::ClientHub`]. An `Err` marks the module
    /// `Failed` for this boot cycle; there is no automatic retry.
    async fn initialize(&self, ctx: &crate::context::ModuleCtx) -> anyhow::Result<()>;

    /// Release resources acquired in `initialize`.
    async fn shutdown(&self) -> anyhow::Result<()>;

    /// Non-mutating health probe.
    async fn health_check(&self) -> ModuleHealth;

    /// The module's capability surface. Mounted by the host under
    /// `{namespace_prefix}/{name}` — and only for modules that reached
    /// `Running` (fail-closed).
    fn exposed_routes(&self) -> Router;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    fn descriptor(name: &str) -> ModuleDescriptor {
        ModuleDescriptor {
            name: name.to_owned(),
            version: "1.0.0".to_owned(),
            description: String::new(),
            author: String::new(),
            license_required: true,
            is_external: false,
            dependencies: Vec::new(),
        }
    }

    #[test]
    fn name_validation() {
        assert!(descriptor("qr-access").has_valid_name());
        assert!(descriptor("audit_stats2").has_valid_name());
        assert!(!descriptor("").has_valid_name());
        assert!(!descriptor("has space").has_valid_name());
        assert!(!descriptor("Slash/name").has_valid_name());
    }

    #[test]
    fn health_serializes_with_lowercase_tags() {
        let h = ModuleHealth::degraded(serde_json::json!({"cache": "cold"}));
        let v = serde_json::to_value(&h).expect("serialize");
        assert_eq!(v["status"], "degraded");
        assert_eq!(v["details"]["cache"], "cold");
    }
}
