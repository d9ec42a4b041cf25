//! Module wiring and cache for the weather connector.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use modhost::{Module, ModuleCtx, ModuleDescriptor, ModuleHealth};

const DEFAULT_CACHE_SECS: u64 = 300;

#[derive(Debug, Deserialize)]
struct WeatherConfig {
    #[serde(default = "default_api_base")]
    api_base: String,
    #[serde(default = "default_cache_secs")]
    cache_secs: u64,
    /// Refuse to initialize; exercises the host's fail-closed boot path.
    #[serde(default)]
    fail_init: bool,
}

fn default_api_base() -> String {
    "https://wx.example/api/v2".to_owned()
}

fn default_cache_secs() -> u64 {
    DEFAULT_CACHE_SECS
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            cache_secs: default_cache_secs(),
            fail_init: false,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct WeatherReading {
    pub city: String,
    pub temperature_c: i32,
    pub condition: &'static str,
    pub observed_at: String,
    pub source: String,
}

struct CachedReading {
    reading: WeatherReading,
    fetched_at: DateTime<Utc>,
}

#[derive(Default)]
struct ConnectorState {
    api_base: RwLock<String>,
    cache_secs: RwLock<u64>,
    cache: RwLock<HashMap<String, CachedReading>>,
}

impl ConnectorState {
    fn lookup(&self, city: &str) -> WeatherReading {
        let ttl = *self.cache_secs.read();
        let now = Utc::now();
        if let Some(cached) = self.cache.read().get(city) {
            let age = now.signed_duration_since(cached.fetched_at);
            if age < chrono::Duration::seconds(i64::try_from(ttl).unwrap_or(i64::MAX)) {
                return cached.reading.clone();
            }
        }
        let reading = self.fetch(city, now);
        self.cache.write().insert(
            city.to_owned(),
            CachedReading {
                reading: reading.clone(),
                fetched_at: now,
            },
        );
        reading
    }

    /// Stand-in for the upstream call: deterministic per city so displays
    /// and tests get stable values.
    fn fetch(&self, city: &str, now: DateTime<Utc>) -> WeatherReading {
        let seed: u32 = city.bytes().map(u32::from).sum();
        let temperature_c = 8 + i32::try_from(seed % 20).unwrap_or(0);
        let condition = match seed % 4 {
            0 => "clear",
            1 => "cloudy",
            2 => "rain",
            _ => "wind",
        };
        WeatherReading {
            city: city.to_owned(),
            temperature_c,
            condition,
            observed_at: now.to_rfc3339(),
            source: self.api_base.read().clone(),
        }
    }
}

/// Weather connector module (external source root, no license required).
pub struct WeatherConnectorModule {
    descriptor: ModuleDescriptor,
    state: Arc<ConnectorState>,
}

impl Default for WeatherConnectorModule {
    fn default() -> Self {
        Self {
            descriptor: ModuleDescriptor {
                name: "weather-connector".to_owned(),
                version: "1.0.1".to_owned(),
                description: "Weather lookups for gate displays".to_owned(),
                author: "Gatehouse Team".to_owned(),
                license_required: false,
                is_external: true,
                dependencies: Vec::new(),
            },
            state: Arc::new(ConnectorState::default()),
        }
    }
}

#[async_trait]
impl Module for WeatherConnectorModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn initialize(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        let cfg: WeatherConfig = ctx.config()?;
        if cfg.fail_init {
            anyhow::bail!("weather connector configured to fail initialization");
        }
        *self.state.api_base.write() = cfg.api_base;
        *self.state.cache_secs.write() = cfg.cache_secs;
        tracing::info!(cache_secs = *self.state.cache_secs.read(), "weather-connector ready");
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        self.state.cache.write().clear();
        Ok(())
    }

    async fn health_check(&self) -> ModuleHealth {
        ModuleHealth::ok_with(serde_json::json!({
            "api_base": *self.state.api_base.read(),
            "cached_cities": self.state.cache.read().len(),
        }))
    }

    fn exposed_routes(&self) -> Router {
        Router::new()
            .route("/current", get(current))
            .route("/status", get(status))
            .with_state(Arc::clone(&self.state))
    }
}

#[derive(Debug, Deserialize)]
struct CityParams {
    #[serde(default = "default_city")]
    city: String,
}

fn default_city() -> String {
    "Medellin".to_owned()
}

async fn current(
    State(state): State<Arc<ConnectorState>>,
    Query(params): Query<CityParams>,
) -> Json<WeatherReading> {
    Json(state.lookup(&params.city))
}

async fn status(State(state): State<Arc<ConnectorState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "active",
        "type": "weather_connector",
        "cached_cities": state.cache.read().len(),
    }))
}
