//! Audit analytics module: per-tenant audit-log aggregation.

pub mod module;
pub mod stats;

pub use module::AuditStatsModule;
pub use stats::AuditSummary;

use modhost::SourceRoot;

modhost::register_module!(SourceRoot::Builtin, "audit-stats", |_env| {
    Ok(std::sync::Arc::new(AuditStatsModule::default()) as std::sync::Arc<dyn modhost::Module>)
});
