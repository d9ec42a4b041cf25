//! Boot sequence: storage, tenancy services, module scan, lifecycle
//! initialization and router assembly.
//!
//! Phase order mirrors the process lifecycle: catalog → directory services →
//! manifest scan → `initialize_all` → route mounting. Shutdown reverses it.

use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use modhost::loader::scan_and_register;
use modhost::{BootReport, ClientHub, ModuleEnv, ModuleRegistry, ScanReport};
use modhost_db::{AdminDb, ConnectOpts, DbHandle, DsnTemplate};
use tenancy::catalog::apply_catalog_schema;
use tenancy::{DirectoryService, TenantDirectory, TenantProvisioner, TenantSessions};

use crate::config::{AppConfig, AppConfigProvider};
use crate::pack::FsPackStore;
use crate::routes::{self, AppState};

/// A fully wired application, ready to serve.
pub struct App {
    pub router: Router,
    pub registry: Arc<ModuleRegistry>,
    pub directory: Arc<DirectoryService>,
    pub sessions: Arc<TenantSessions>,
    pub catalog: Arc<DbHandle>,
    pub cancel: CancellationToken,
    pub scan_report: ScanReport,
    pub boot_report: BootReport,
}

impl App {
    /// Tear everything down: modules in reverse registration order, then
    /// tenant pools, then the catalog pool.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.registry.shutdown_all().await;
        self.sessions.close_all().await;
        self.catalog.close().await;
        tracing::info!("shutdown complete");
    }
}

/// Bring the platform up.
///
/// # Errors
/// Fails on unusable storage configuration, an unresolvable source root, or
/// a broken catalog database. Individual module failures do not fail the
/// boot; they are reported and excluded from routing.
pub async fn start(config: &AppConfig) -> anyhow::Result<App> {
    // Shared catalog database.
    let catalog = Arc::new(
        DbHandle::connect(&config.database.catalog_dsn, &ConnectOpts::default()).await?,
    );
    apply_catalog_schema(&catalog).await?;

    // Tenancy services.
    let admin = AdminDb::connect(&config.database.admin_dsn).await?;
    let template = DsnTemplate::parse(config.database.tenant_template.clone())?;
    let sessions = Arc::new(TenantSessions::new(template.clone(), ConnectOpts::default()));
    let provisioner = TenantProvisioner::new(admin, template, Arc::clone(&catalog));
    let directory = Arc::new(DirectoryService::new(
        Arc::clone(&catalog),
        Arc::clone(&sessions),
        provisioner,
    ));

    if let (Some(email), Some(password)) = (
        config.bootstrap.superuser_email.as_deref(),
        config.bootstrap.superuser_password.as_deref(),
    ) {
        directory.ensure_first_superuser(email, password).await?;
    }

    // Module host environment: config sections, client hub, root token.
    let hub = Arc::new(ClientHub::default());
    hub.register::<dyn TenantDirectory>(
        Arc::clone(&directory) as Arc<dyn TenantDirectory>
    );
    let cancel = CancellationToken::new();
    let env = ModuleEnv::new(
        Arc::new(AppConfigProvider::new(config)),
        Arc::clone(&hub),
        cancel.clone(),
    );

    // Discover, register, initialize.
    let registry = Arc::new(ModuleRegistry::new());
    let scan_report = scan_and_register(&config.loader.roots, &env, &registry)?;
    tracing::info!(
        registered = scan_report.registered.len(),
        skipped = scan_report.failed.len(),
        "module scan complete"
    );
    let boot_report = registry.initialize_all(&env).await;
    if !boot_report.failed.is_empty() {
        tracing::warn!(
            failed = boot_report.failed.len(),
            "some modules failed to initialize and will not serve routes"
        );
    }

    // Router: management surface plus namespaced module mounts.
    let prefix = config.server.api_prefix.trim_end_matches('/');
    let state = AppState {
        registry: Arc::clone(&registry),
        directory: Arc::clone(&directory),
        packs: Arc::new(FsPackStore::new(
            config.loader.plugins_dir.clone(),
            config.loader.roots.clone(),
        )),
    };
    let mut api = routes::api_router(state);
    api = registry.mount_routes(api, "/modules");
    let router = Router::new()
        .nest(prefix, api)
        .layer(TraceLayer::new_for_http());

    Ok(App {
        router,
        registry,
        directory,
        sessions,
        catalog,
        cancel,
        scan_report,
        boot_report,
    })
}
