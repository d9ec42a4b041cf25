//! Layered application configuration.
//!
//! Precedence, lowest to highest: built-in defaults, YAML file, environment
//! variables prefixed `GATEHOUSE__` (sections split on `__`, e.g.
//! `GATEHOUSE__SERVER__BIND_ADDR`). The defaults run a single-box SQLite
//! deployment out of the box; production points the three database fields at
//! Postgres.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub api_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8087".to_owned(),
            api_prefix: "/api/v1".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Privileged connection able to issue create-database commands.
    pub admin_dsn: String,
    /// The shared catalog database.
    pub catalog_dsn: String,
    /// Tenant connection template with a `{db}` placeholder.
    pub tenant_template: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            admin_dsn: "sqlite:./data/tenants".to_owned(),
            catalog_dsn: "sqlite://./data/catalog.db".to_owned(),
            tenant_template: "sqlite://./data/tenants/{db}.db".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Source roots, scanned in order.
    pub roots: Vec<String>,
    /// Directory module client packs are served from.
    pub plugins_dir: PathBuf,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            roots: vec![
                "builtin".to_owned(),
                "local".to_owned(),
                "external".to_owned(),
            ],
            plugins_dir: PathBuf::from("./plugins"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
        }
    }
}

/// Platform superuser seeded into the catalog at boot when both fields are
/// present.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub superuser_email: Option<String>,
    pub superuser_password: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub loader: LoaderConfig,
    pub logging: LoggingConfig,
    pub bootstrap: BootstrapConfig,
    /// Raw per-module config sections, keyed by module name.
    pub modules: BTreeMap<String, serde_json::Value>,
}

impl AppConfig {
    /// Load layered configuration.
    ///
    /// # Errors
    /// Returns an error when the file or environment cannot be parsed into
    /// the config shape.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed("GATEHOUSE__").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Effective configuration, for `--print-config` and `check`.
    ///
    /// # Errors
    /// Returns a serialization error.
    pub fn to_pretty(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Bridges the application config into the module host's provider trait.
pub struct AppConfigProvider {
    modules: BTreeMap<String, serde_json::Value>,
}

impl AppConfigProvider {
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        Self {
            modules: config.modules.clone(),
        }
    }
}

impl modhost::ConfigProvider for AppConfigProvider {
    fn module_section(&self, module_name: &str) -> Option<&serde_json::Value> {
        self.modules.get(module_name)
    }
}
