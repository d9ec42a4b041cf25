//! Typed access to per-module configuration sections.
//!
//! The host's config file carries one JSON object per module under
//! `modules.<name>`; modules deserialize it into their own config struct.
//! Two loading modes: lenient (missing section → `T::default()`) for modules
//! that run fine unconfigured, and strict for modules that cannot.

use serde::de::DeserializeOwned;

/// Configuration error for typed section loads.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no config section for module '{module}'")]
    SectionMissing { module: String },

    #[error("config section for module '{module}' must be an object")]
    NotAnObject { module: String },

    #[error("invalid config for module '{module}': {source}")]
    Invalid {
        module: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Provider of module-specific configuration sections (raw JSON).
pub trait ConfigProvider: Send + Sync {
    /// Returns the raw section for the module, if any.
    fn module_section(&self, module_name: &str) -> Option<&serde_json::Value>;
}

/// Lenient loader: absent or non-object sections fall back to `T::default()`.
///
/// # Errors
/// Returns [`ConfigError::Invalid`] only when a section exists and is an
/// object but cannot be deserialized.
pub fn module_config_or_default<T: DeserializeOwned + Default>(
    provider: &dyn ConfigProvider,
    module_name: &str,
) -> Result<T, ConfigError> {
    let Some(section) = provider.module_section(module_name) else {
        return Ok(T::default());
    };
    if !section.is_object() {
        return Ok(T::default());
    }
    serde_json::from_value(section.clone()).map_err(|e| ConfigError::Invalid {
        module: module_name.to_owned(),
        source: e,
    })
}

/// Strict loader: the section must exist, be an object, and deserialize.
///
/// # Errors
/// Returns the matching [`ConfigError`] variant for each violation.
pub fn module_config_required<T: DeserializeOwned>(
    provider: &dyn ConfigProvider,
    module_name: &str,
) -> Result<T, ConfigError> {
    let section = provider
        .module_section(module_name)
        .ok_or_else(|| ConfigError::SectionMissing {
            module: module_name.to_owned(),
        })?;
    if !section.is_object() {
        return Err(ConfigError::NotAnObject {
            module: module_name.to_owned(),
        });
    }
    serde_json::from_value(section.clone()).map_err(|e| ConfigError::Invalid {
        module: module_name.to_owned(),
        source: e,
    })
}
