#![allow(clippy::unwrap_used)]

//! Provisioning state machine and isolation guarantees, exercised end to end
//! against the SQLite backend (one file per tenant database under a temp
//! directory — same admin semantics as Postgres, no server required).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use modhost_db::{AdminDb, ConnectOpts, DbHandle, DsnTemplate};
use tenancy::catalog::{apply_catalog_schema, find_user_by_email, get_organization};
use tenancy::provisioner::{DbNameGenerator, ProvisionStage, RandomDbNames, TenantProvisioner};
use tenancy::sessions::TenantSessions;
use tenancy::{NewOrganization, TenancyError, TenantSession};

/// Deterministic name generator: hands out a fixed sequence, then falls back
/// to random names.
struct SeqNames {
    queue: Mutex<VecDeque<String>>,
}

impl SeqNames {
    fn new(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(names.iter().map(|s| (*s).to_owned()).collect()),
        })
    }
}

impl DbNameGenerator for SeqNames {
    fn generate(&self) -> String {
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| RandomDbNames.generate())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    admin: AdminDb,
    template: DsnTemplate,
    catalog: Arc<DbHandle>,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let admin = AdminDb::connect(&format!("sqlite:{}", dir.path().display()))
            .await
            .unwrap();
        let template =
            DsnTemplate::parse(format!("sqlite://{}/{{db}}.db", dir.path().display())).unwrap();
        let catalog = Arc::new(
            DbHandle::connect("sqlite::memory:", &ConnectOpts::default())
                .await
                .unwrap(),
        );
        apply_catalog_schema(&catalog).await.unwrap();
        Self {
            _dir: dir,
            admin,
            template,
            catalog,
        }
    }

    fn provisioner(&self) -> TenantProvisioner {
        TenantProvisioner::new(
            self.admin.clone(),
            self.template.clone(),
            Arc::clone(&self.catalog),
        )
    }

    fn sessions(&self) -> TenantSessions {
        TenantSessions::new(self.template.clone(), ConnectOpts::default())
    }
}

fn request(name: &str, admin_email: &str) -> NewOrganization {
    NewOrganization {
        name: name.to_owned(),
        kind: "residential".to_owned(),
        address: "12 Perimeter Rd".to_owned(),
        contact_email: format!("contact@{name}.test"),
        admin_email: admin_email.to_owned(),
        admin_password: "hunter2hunter2".to_owned(),
    }
}

async fn tenant_marker(session: &TenantSession, message: &str) {
    sqlx::query("INSERT INTO audit_logs (id, level, message, created_at) VALUES ($1, $2, $3, $4)")
        .bind(uuid::Uuid::new_v4().to_string())
        .bind("info")
        .bind(message)
        .bind("2026-08-08T00:00:00+00:00")
        .execute(session.db().sqlite().unwrap())
        .await
        .unwrap();
}

async fn tenant_messages(session: &TenantSession) -> Vec<String> {
    sqlx::query_scalar("SELECT message FROM audit_logs ORDER BY message")
        .fetch_all(session.db().sqlite().unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn happy_path_reaches_ready_with_all_accounts() {
    let h = Harness::new().await;
    let org = h
        .provisioner()
        .provision(request("acme", "admin@acme.test"))
        .await
        .unwrap();

    assert!(org.is_ready());
    assert!(org.db_name.starts_with("org_"));
    assert!(h.admin.database_exists(&org.db_name).await.unwrap());

    // Catalog row persisted and flipped to ready.
    let stored = get_organization(&h.catalog, &org.id).await.unwrap().unwrap();
    assert!(stored.is_ready());

    // Catalog login exists and is linked to the organization.
    let login = find_user_by_email(&h.catalog, "admin@acme.test")
        .await
        .unwrap()
        .unwrap();
    assert!(login.is_superuser);
    assert_eq!(login.organization_id.as_deref(), Some(org.id.as_str()));
    assert!(tenancy::password::verify_password(
        "hunter2hunter2",
        &login.hashed_password
    ));

    // Tenant database is self-describing: mirror row + tenant superuser.
    let sessions = h.sessions();
    let session = sessions.session_for(&org).await.unwrap();
    let mirror: (String, String) =
        sqlx::query_as("SELECT id, name FROM organizations WHERE id = $1")
            .bind(&org.id)
            .fetch_one(session.db().sqlite().unwrap())
            .await
            .unwrap();
    assert_eq!(mirror.1, "acme");
    let superusers: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_superuser AND email = $1")
            .bind("admin@acme.test")
            .fetch_one(session.db().sqlite().unwrap())
            .await
            .unwrap();
    assert_eq!(superusers, 1);
    sessions.close_all().await;
}

#[tokio::test]
async fn schema_failure_leaves_no_catalog_row_and_no_database() {
    let h = Harness::new().await;
    let provisioner = h
        .provisioner()
        .with_name_generator(SeqNames::new(&["org_doomed"]))
        .with_tenant_schema("CREATE TABLE broken (;"); // does not parse

    let err = provisioner
        .provision(request("doomed", "admin@doomed.test"))
        .await
        .unwrap_err();
    match err {
        TenancyError::Provision { stage, .. } => {
            assert_eq!(stage, ProvisionStage::ApplySchema);
        }
        other => panic!("unexpected error: {other}"),
    }

    // Compensation: no catalog row survives without a backing database, and
    // the half-made database is gone too.
    let orgs = tenancy::catalog::list_organizations(&h.catalog).await.unwrap();
    assert!(orgs.is_empty());
    assert!(
        find_user_by_email(&h.catalog, "admin@doomed.test")
            .await
            .unwrap()
            .is_none()
    );
    assert!(!h.admin.database_exists("org_doomed").await.unwrap());
}

#[tokio::test]
async fn name_collision_retries_with_fresh_identifier() {
    let h = Harness::new().await;
    // Occupy the first generated name ahead of time.
    h.admin.create_database("org_taken").await.unwrap();

    let org = h
        .provisioner()
        .with_name_generator(SeqNames::new(&["org_taken", "org_fresh"]))
        .provision(request("retry", "admin@retry.test"))
        .await
        .unwrap();

    assert_eq!(org.db_name, "org_fresh");
    assert!(h.admin.database_exists("org_fresh").await.unwrap());
    // No second tenant ended up behind the occupied identifier, and the
    // catalog agrees with the final name.
    let stored = get_organization(&h.catalog, &org.id).await.unwrap().unwrap();
    assert_eq!(stored.db_name, "org_fresh");
}

#[tokio::test]
async fn exhausted_collisions_fail_the_whole_operation() {
    let h = Harness::new().await;
    h.admin.create_database("org_stuck").await.unwrap();

    let err = h
        .provisioner()
        .with_name_generator(SeqNames::new(&["org_stuck", "org_stuck", "org_stuck"]))
        .with_max_name_attempts(3)
        .provision(request("stuck", "admin@stuck.test"))
        .await
        .unwrap_err();

    assert!(matches!(err, TenancyError::NameCollision(3)));
    let orgs = tenancy::catalog::list_organizations(&h.catalog).await.unwrap();
    assert!(orgs.is_empty());
    // The pre-existing database it collided with is untouched.
    assert!(h.admin.database_exists("org_stuck").await.unwrap());
}

#[tokio::test]
async fn sessions_are_isolated_per_tenant() {
    let h = Harness::new().await;
    let provisioner = h.provisioner();
    let org_x = provisioner
        .provision(request("xenon", "admin@xenon.test"))
        .await
        .unwrap();
    let org_y = provisioner
        .provision(request("yttrium", "admin@yttrium.test"))
        .await
        .unwrap();
    assert_ne!(org_x.db_name, org_y.db_name);

    let sessions = h.sessions();
    let sx = sessions.session_for(&org_x).await.unwrap();
    let sy = sessions.session_for(&org_y).await.unwrap();

    tenant_marker(&sx, "marker-for-x").await;
    tenant_marker(&sy, "marker-for-y").await;

    assert_eq!(tenant_messages(&sx).await, ["marker-for-x"]);
    assert_eq!(tenant_messages(&sy).await, ["marker-for-y"]);

    // Each tenant only ever sees its own superuser as well.
    let emails: Vec<String> = sqlx::query_scalar("SELECT email FROM users")
        .fetch_all(sx.db().sqlite().unwrap())
        .await
        .unwrap();
    assert_eq!(emails, ["admin@xenon.test"]);
    sessions.close_all().await;
}

#[tokio::test]
async fn concurrent_provisioning_yields_distinct_tenants() {
    let h = Harness::new().await;
    let provisioner = Arc::new(h.provisioner());

    let a = {
        let p = Arc::clone(&provisioner);
        tokio::spawn(async move { p.provision(request("alpha", "admin@alpha.test")).await })
    };
    let b = {
        let p = Arc::clone(&provisioner);
        tokio::spawn(async move { p.provision(request("beta", "admin@beta.test")).await })
    };

    let org_a = a.await.unwrap().unwrap();
    let org_b = b.await.unwrap().unwrap();
    assert_ne!(org_a.db_name, org_b.db_name);
    assert!(h.admin.database_exists(&org_a.db_name).await.unwrap());
    assert!(h.admin.database_exists(&org_b.db_name).await.unwrap());
}
