//! QR access module: signed short-lived entry passes for gates and doors.

pub mod module;
pub mod passes;

pub use module::QrAccessModule;
pub use passes::{EntryPass, PassService, PassVerdict};

use modhost::SourceRoot;

modhost::register_module!(SourceRoot::Builtin, "qr-access", |_env| {
    Ok(std::sync::Arc::new(QrAccessModule::default()) as std::sync::Arc<dyn modhost::Module>)
});
