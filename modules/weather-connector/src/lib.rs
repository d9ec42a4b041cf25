//! External weather connector: cached lookups for gate displays.
//!
//! The upstream weather API is an external collaborator; this module keeps a
//! per-city cache in front of it and degrades to the last known reading.

pub mod module;

pub use module::WeatherConnectorModule;

use modhost::SourceRoot;

modhost::register_module!(SourceRoot::External, "weather-connector", |_env| {
    Ok(std::sync::Arc::new(WeatherConnectorModule::default())
        as std::sync::Arc<dyn modhost::Module>)
});
