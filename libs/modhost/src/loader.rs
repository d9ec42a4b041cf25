//! Manifest-driven module discovery.
//!
//! Module crates declare themselves with [`crate::register_module!`], which
//! submits a [`ManifestEntry`] into the process-wide inventory. The loader
//! walks the configured source roots in order, takes each root's entries in
//! deterministic lexicographic order, and builds and registers every
//! candidate in isolation: a broken entry is logged and skipped, never fatal
//! to the scan. Only an unresolvable source root aborts the boot.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::context::ModuleEnv;
use crate::contracts::Module;
use crate::registry::ModuleRegistry;

/// Named locations modules are discovered from, scanned in the order the
/// host configuration lists them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceRoot {
    /// Modules shipped with the platform.
    Builtin,
    /// Locally-authored plugins.
    Local,
    /// Externally-installed connectors.
    External,
}

impl SourceRoot {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Builtin => "builtin",
            Self::Local => "local",
            Self::External => "external",
        }
    }
}

impl fmt::Display for SourceRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceRoot {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "builtin" => Ok(Self::Builtin),
            "local" => Ok(Self::Local),
            "external" => Ok(Self::External),
            other => Err(LoaderError::UnresolvedRoot(other.to_owned())),
        }
    }
}

/// A module factory declared in a source root.
///
/// `entry` is the unit's identity within the root: it orders the scan and is
/// expected to equal the built module's descriptor name.
pub struct ManifestEntry {
    pub root: SourceRoot,
    pub entry: &'static str,
    pub build: fn(&ModuleEnv) -> anyhow::Result<Arc<dyn Module>>,
}

inventory::collect!(ManifestEntry);

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// A configured source root does not exist at all. Unlike a broken
    /// entry, this is fatal: the host was told to scan something that cannot
    /// be scanned.
    #[error("source root '{0}' cannot be resolved")]
    UnresolvedRoot(String),
}

/// Outcome of a scan: what registered, and which entries were skipped.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Successfully registered module names, in registration order.
    pub registered: Vec<String>,
    pub failed: Vec<ScanFailure>,
}

#[derive(Debug)]
pub struct ScanFailure {
    pub root: SourceRoot,
    pub entry: String,
    pub reason: String,
}

impl ScanReport {
    fn reject(&mut self, root: SourceRoot, entry: &str, reason: String) {
        tracing::warn!(root = %root, entry = %entry, reason = %reason, "skipping module candidate");
        self.failed.push(ScanFailure {
            root,
            entry: entry.to_owned(),
            reason,
        });
    }
}

/// Scan the given source roots in order and hand every successfully built
/// module to the registry.
///
/// # Errors
/// Returns [`LoaderError::UnresolvedRoot`] for a root name that does not
/// resolve; per-candidate failures are recorded in the report instead.
pub fn scan_and_register(
    roots: &[String],
    env: &ModuleEnv,
    registry: &ModuleRegistry,
) -> Result<ScanReport, LoaderError> {
    let mut report = ScanReport::default();

    for root_name in roots {
        let root: SourceRoot = root_name.parse()?;
        let mut entries: Vec<&ManifestEntry> = inventory::iter::<ManifestEntry>
            .into_iter()
            .filter(|e| e.root == root)
            .collect();
        // Lexicographic order keeps registration — and therefore mount and
        // shutdown order, and the winner under duplicate names — stable
        // across builds.
        entries.sort_by_key(|e| e.entry);
        tracing::info!(root = %root, candidates = entries.len(), "scanning source root");

        for manifest in entries {
            let module = match (manifest.build)(env) {
                Ok(module) => module,
                Err(e) => {
                    report.reject(root, manifest.entry, format!("build failed: {e:#}"));
                    continue;
                }
            };
            let descriptor = module.descriptor();
            if !descriptor.has_valid_name() {
                report.reject(
                    root,
                    manifest.entry,
                    format!("invalid module name '{}'", descriptor.name),
                );
                continue;
            }
            if descriptor.name != manifest.entry {
                report.reject(
                    root,
                    manifest.entry,
                    format!(
                        "descriptor name '{}' does not match manifest entry",
                        descriptor.name
                    ),
                );
                continue;
            }
            let name = descriptor.name.clone();
            match registry.register(module) {
                Ok(()) => report.registered.push(name),
                Err(e) => report.reject(root, manifest.entry, e.to_string()),
            }
        }
    }

    warn_on_unmet_dependencies(registry);
    Ok(report)
}

/// Descriptor `dependencies` are informational; an unmet one is worth a
/// warning at boot but gates nothing.
fn warn_on_unmet_dependencies(registry: &ModuleRegistry) {
    let descriptors = registry.list_modules();
    let known: HashSet<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
    for descriptor in &descriptors {
        for dep in &descriptor.dependencies {
            if !known.contains(dep.as_str()) {
                tracing::warn!(
                    module = %descriptor.name,
                    dependency = %dep,
                    "declared dependency is not registered"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn root_names_resolve() {
        assert_eq!("builtin".parse::<SourceRoot>().ok(), Some(SourceRoot::Builtin));
        assert_eq!("local".parse::<SourceRoot>().ok(), Some(SourceRoot::Local));
        assert_eq!("external".parse::<SourceRoot>().ok(), Some(SourceRoot::External));
    }

    #[test]
    fn unknown_root_is_unresolved() {
        let err = "marketplace".parse::<SourceRoot>().unwrap_err();
        assert!(matches!(err, LoaderError::UnresolvedRoot(r) if r == "marketplace"));
    }
}
