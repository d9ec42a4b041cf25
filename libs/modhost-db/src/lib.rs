//! Gatehouse database abstraction.
//!
//! A thin layer over `sqlx` pools that the rest of the workspace talks to:
//! engine detection by DSN scheme, a pooled [`DbHandle`] per database, the
//! administrative connection used to create and drop tenant databases, and
//! the DSN template with a substitutable database-name segment.
//!
//! Postgres is the production engine; SQLite backs tests and single-box
//! deployments, where each "database" is a file under a base directory.

pub mod admin;
pub mod template;

pub use admin::AdminDb;
pub use template::DsnTemplate;

use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;

/// Library-local result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Typed error for handles, templates and admin operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("unknown DSN scheme: {0}")]
    UnknownDsn(String),

    #[error("invalid DSN template: {0}")]
    InvalidTemplate(String),

    #[error("invalid database name: {0}")]
    InvalidDbName(String),

    /// A database with the generated name already exists. Callers retry with
    /// a fresh name; every other failure is terminal for the operation.
    #[error("database already exists: {0}")]
    NameCollision(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Supported engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbEngine {
    Postgres,
    Sqlite,
}

/// Connection options applied to every pool this crate opens.
#[derive(Clone, Debug)]
pub struct ConnectOpts {
    /// Maximum number of connections in the pool.
    pub max_conns: u32,
    /// Timeout to acquire a connection from the pool.
    pub acquire_timeout: Duration,
    /// For SQLite file DSNs, create the file and parent directories if missing.
    pub create_sqlite_dbs: bool,
}

impl Default for ConnectOpts {
    fn default() -> Self {
        Self {
            max_conns: 10,
            acquire_timeout: Duration::from_secs(30),
            create_sqlite_dbs: true,
        }
    }
}

/// One concrete sqlx pool.
#[derive(Clone, Debug)]
pub enum DbPool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// Pooled handle to a single database.
///
/// Cloning is cheap (sqlx pools are reference-counted); dropping a checked-out
/// connection returns it to the pool on every exit path.
#[derive(Clone, Debug)]
pub struct DbHandle {
    engine: DbEngine,
    pool: DbPool,
    dsn: String,
}

impl DbHandle {
    /// Detect engine by DSN scheme.
    ///
    /// Only the scheme prefix is inspected; the tail (credentials, params) is
    /// never touched.
    ///
    /// # Errors
    /// Returns [`DbError::UnknownDsn`] if the scheme is not recognized.
    pub fn detect(dsn: &str) -> Result<DbEngine> {
        let s = dsn.trim_start();
        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            Ok(DbEngine::Postgres)
        } else if s.starts_with("sqlite:") {
            Ok(DbEngine::Sqlite)
        } else {
            Err(DbError::UnknownDsn(dsn.to_owned()))
        }
    }

    /// Connect and build a handle.
    ///
    /// # Errors
    /// Returns an error if the DSN is invalid or the connection fails.
    pub async fn connect(dsn: &str, opts: &ConnectOpts) -> Result<Self> {
        let engine = Self::detect(dsn)?;
        match engine {
            DbEngine::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(opts.max_conns)
                    .acquire_timeout(opts.acquire_timeout)
                    .connect(dsn)
                    .await?;
                Ok(Self {
                    engine,
                    pool: DbPool::Postgres(pool),
                    dsn: dsn.to_owned(),
                })
            }
            DbEngine::Sqlite => {
                let conn_opts = SqliteConnectOptions::from_str(dsn)?
                    .create_if_missing(opts.create_sqlite_dbs);
                if opts.create_sqlite_dbs {
                    if let Some(parent) = sqlite_file_path(dsn).and_then(|p| {
                        p.parent().map(std::path::Path::to_path_buf)
                    }) {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                let pool = SqlitePoolOptions::new()
                    .max_connections(opts.max_conns)
                    .acquire_timeout(opts.acquire_timeout)
                    .connect_with(conn_opts)
                    .await?;
                Ok(Self {
                    engine,
                    pool: DbPool::Sqlite(pool),
                    dsn: dsn.to_owned(),
                })
            }
        }
    }

    /// Graceful pool close. Dropping the last clone also closes the pool;
    /// this just makes teardown explicit and awaitable.
    pub async fn close(&self) {
        match &self.pool {
            DbPool::Postgres(p) => p.close().await,
            DbPool::Sqlite(p) => p.close().await,
        }
    }

    #[must_use]
    pub fn engine(&self) -> DbEngine {
        self.engine
    }

    #[must_use]
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    /// The underlying pool, for callers that must branch per engine.
    #[must_use]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[must_use]
    pub fn postgres(&self) -> Option<&PgPool> {
        match &self.pool {
            DbPool::Postgres(p) => Some(p),
            DbPool::Sqlite(_) => None,
        }
    }

    #[must_use]
    pub fn sqlite(&self) -> Option<&SqlitePool> {
        match &self.pool {
            DbPool::Sqlite(p) => Some(p),
            DbPool::Postgres(_) => None,
        }
    }

    /// Execute a batch of semicolon-separated statements (schema application).
    ///
    /// # Errors
    /// Returns the first statement error; earlier statements stay applied.
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        match &self.pool {
            DbPool::Postgres(p) => {
                sqlx::raw_sql(sql).execute(p).await?;
            }
            DbPool::Sqlite(p) => {
                sqlx::raw_sql(sql).execute(p).await?;
            }
        }
        Ok(())
    }

    /// Cheap connectivity probe.
    ///
    /// # Errors
    /// Returns an error if the database does not answer.
    pub async fn ping(&self) -> Result<()> {
        match &self.pool {
            DbPool::Postgres(p) => {
                sqlx::query("SELECT 1").execute(p).await?;
            }
            DbPool::Sqlite(p) => {
                sqlx::query("SELECT 1").execute(p).await?;
            }
        }
        Ok(())
    }
}

/// Run a query body against whichever engine backs a [`DbHandle`]. The body
/// is expanded once per pool type, so `$pool` is a concrete `&PgPool` or
/// `&SqlitePool` inside it; write the SQL with `$N` placeholders, which both
/// engines accept.
///
/// ```ignore
/// let n: u64 = modhost_db::on_pool!(handle, |pool| {
///     sqlx::query("DELETE FROM audit_logs").execute(pool).await?.rows_affected()
/// });
/// ```
#[macro_export]
macro_rules! on_pool {
    ($handle:expr, |$pool:ident| $body:expr) => {
        match $handle.pool() {
            $crate::DbPool::Postgres($pool) => $body,
            $crate::DbPool::Sqlite($pool) => $body,
        }
    };
}

/// Resolve the file path of a SQLite DSN, if it names a file.
fn sqlite_file_path(dsn: &str) -> Option<std::path::PathBuf> {
    let rest = dsn.trim_start().strip_prefix("sqlite:")?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(std::path::PathBuf::from(path))
}

/// Validate an identifier used as a database name.
///
/// Names are generated (`org_` + hex) or operator-provided; either way they
/// must be safe to splice into `CREATE DATABASE` and file paths: leading
/// ASCII letter, then lowercase letters, digits and underscores, at most 63
/// bytes (the Postgres identifier limit).
#[must_use]
pub fn is_valid_db_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 63 {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
