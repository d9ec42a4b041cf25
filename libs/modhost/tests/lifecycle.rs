#![allow(clippy::unwrap_used)]

//! End-to-end exercises of the manifest scan, partial boot and namespaced
//! route mounting, using manifest entries declared by this test binary.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::routing::get;
use axum::{Json, Router};
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use modhost::loader::scan_and_register;
use modhost::{
    ClientHub, ConfigProvider, LoaderError, Module, ModuleCtx, ModuleDescriptor, ModuleEnv,
    ModuleHealth, ModuleRegistry, ModuleState, SourceRoot,
};

struct NoConfig;

impl ConfigProvider for NoConfig {
    fn module_section(&self, _module_name: &str) -> Option<&serde_json::Value> {
        None
    }
}

fn env() -> ModuleEnv {
    ModuleEnv::new(
        Arc::new(NoConfig),
        Arc::new(ClientHub::default()),
        CancellationToken::new(),
    )
}

struct FixtureModule {
    descriptor: ModuleDescriptor,
    fail_init: bool,
    reply: &'static str,
}

impl FixtureModule {
    fn build(name: &str, fail_init: bool, reply: &'static str) -> Arc<dyn Module> {
        Arc::new(Self {
            descriptor: ModuleDescriptor {
                name: name.to_owned(),
                version: "0.1.0".to_owned(),
                description: "test fixture".to_owned(),
                author: "tests".to_owned(),
                license_required: false,
                is_external: false,
                dependencies: Vec::new(),
            },
            fail_init,
            reply,
        })
    }
}

#[async_trait]
impl Module for FixtureModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn initialize(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        if self.fail_init {
            anyhow::bail!("fixture refuses to initialize");
        }
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> ModuleHealth {
        ModuleHealth::ok_with(serde_json::json!({"reply": self.reply}))
    }

    fn exposed_routes(&self) -> Router {
        let reply = self.reply;
        Router::new()
            .route("/ping", get(move || async move { reply }))
            .route(
                "/status",
                get(|| async { Json(serde_json::json!({"status": "active"})) }),
            )
    }
}

// Builtin root: two good modules (one of which fails initialize) and one
// entry whose build blows up.
modhost::register_module!(SourceRoot::Builtin, "alpha-mod", |_env| {
    Ok(FixtureModule::build("alpha-mod", false, "alpha"))
});
modhost::register_module!(SourceRoot::Builtin, "beta-mod", |_env| {
    Ok(FixtureModule::build("beta-mod", true, "beta"))
});
modhost::register_module!(SourceRoot::Builtin, "broken-mod", |_env| {
    anyhow::bail!("synthetic load failure")
});

// Local root: a duplicate of alpha-mod, a good module, and a descriptor
// whose name does not match its manifest entry.
modhost::register_module!(SourceRoot::Local, "alpha-mod", |_env| {
    Ok(FixtureModule::build("alpha-mod", false, "impostor"))
});
modhost::register_module!(SourceRoot::Local, "gamma-mod", |_env| {
    Ok(FixtureModule::build("gamma-mod", false, "gamma"))
});
modhost::register_module!(SourceRoot::Local, "mismatch-mod", |_env| {
    Ok(FixtureModule::build("other-name", false, "mismatch"))
});

#[tokio::test]
async fn one_broken_entry_does_not_sink_the_root() {
    let registry = ModuleRegistry::new();
    let report = scan_and_register(&["builtin".to_owned()], &env(), &registry).unwrap();

    assert_eq!(report.registered, ["alpha-mod", "beta-mod"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].entry, "broken-mod");
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn roots_scan_in_order_and_duplicates_lose() {
    let registry = ModuleRegistry::new();
    let report = scan_and_register(
        &["builtin".to_owned(), "local".to_owned()],
        &env(),
        &registry,
    )
    .unwrap();

    // Registration order: builtin first, each root lexicographic.
    assert_eq!(report.registered, ["alpha-mod", "beta-mod", "gamma-mod"]);

    let failed_entries: Vec<&str> = report.failed.iter().map(|f| f.entry.as_str()).collect();
    assert_eq!(failed_entries, ["broken-mod", "alpha-mod", "mismatch-mod"]);
    assert_eq!(registry.len(), 3);

    // The builtin alpha-mod won; the local impostor never replaced it.
    registry.initialize_all(&env()).await;
    let alpha = registry.get("alpha-mod").unwrap();
    let health = alpha.health().await.unwrap();
    assert_eq!(health.details["reply"], "alpha");
}

#[tokio::test]
async fn unknown_root_aborts_the_scan() {
    let registry = ModuleRegistry::new();
    let err = scan_and_register(&["marketplace".to_owned()], &env(), &registry).unwrap_err();
    assert!(matches!(err, LoaderError::UnresolvedRoot(r) if r == "marketplace"));
}

#[tokio::test]
async fn failed_modules_are_never_mounted() {
    let registry = ModuleRegistry::new();
    scan_and_register(
        &["builtin".to_owned(), "local".to_owned()],
        &env(),
        &registry,
    )
    .unwrap();
    let report = registry.initialize_all(&env()).await;
    assert_eq!(report.started, ["alpha-mod", "gamma-mod"]);
    assert_eq!(report.failed[0].module, "beta-mod");
    assert_eq!(registry.get("beta-mod").unwrap().state(), ModuleState::Failed);

    let app = registry.mount_routes(Router::new(), "/api/v1/modules");

    let ok = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/modules/alpha-mod/ping")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    let body = ok.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"alpha");

    let gamma = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/modules/gamma-mod/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(gamma.status(), StatusCode::OK);

    // beta-mod failed initialize: fail-closed, nothing mounted.
    let closed = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/modules/beta-mod/ping")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(closed.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn interleaved_health_probes_leave_state_alone() {
    let registry = ModuleRegistry::new();
    scan_and_register(&["builtin".to_owned()], &env(), &registry).unwrap();
    registry.initialize_all(&env()).await;

    let alpha = registry.get("alpha-mod").unwrap();
    for _ in 0..4 {
        let (a, b, c) = tokio::join!(alpha.health(), alpha.health(), alpha.health());
        assert!(a.is_some() && b.is_some() && c.is_some());
    }
    assert_eq!(alpha.state(), ModuleState::Running);

    let report = registry.health_report().await;
    let names: Vec<&str> = report.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["alpha-mod"]);
}
