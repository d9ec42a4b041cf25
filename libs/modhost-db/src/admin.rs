//! Administrative connection: create, drop and probe databases.
//!
//! Distinct from per-tenant connections. The Postgres variant holds a small
//! pool against the maintenance database and issues `CREATE DATABASE`; the
//! SQLite variant manages files under a base directory, which gives tests
//! and single-box deployments the same semantics without a server.
//!
//! Name collisions surface as [`DbError::NameCollision`] so that callers can
//! retry generation; any other failure is terminal for the operation.

use std::path::{Path, PathBuf};

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::{DbError, Result, is_valid_db_name};

/// Postgres `duplicate_database` SQLSTATE.
const PG_DUPLICATE_DATABASE: &str = "42P04";

/// A privileged handle capable of creating and dropping databases.
#[derive(Clone, Debug)]
pub enum AdminDb {
    Postgres { pool: PgPool },
    Sqlite { base_dir: PathBuf },
}

impl AdminDb {
    /// Connect an administrative handle.
    ///
    /// `postgres://…` DSNs open a two-connection pool against the maintenance
    /// database. `sqlite:<dir>` DSNs name a base directory under which each
    /// database is a `<name>.db` file; the directory is created if missing.
    ///
    /// # Errors
    /// Returns an error for unknown schemes or connection failures.
    pub async fn connect(admin_dsn: &str) -> Result<Self> {
        let s = admin_dsn.trim();
        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            let pool = PgPoolOptions::new().max_connections(2).connect(s).await?;
            Ok(Self::Postgres { pool })
        } else if let Some(dir) = s.strip_prefix("sqlite:") {
            let dir = dir.strip_prefix("//").unwrap_or(dir);
            if dir.is_empty() {
                return Err(DbError::InvalidTemplate(
                    "sqlite admin DSN must name a base directory".to_owned(),
                ));
            }
            let base_dir = PathBuf::from(dir);
            std::fs::create_dir_all(&base_dir)?;
            Ok(Self::Sqlite { base_dir })
        } else {
            Err(DbError::UnknownDsn(admin_dsn.to_owned()))
        }
    }

    /// Create a new, empty database.
    ///
    /// # Errors
    /// Returns [`DbError::NameCollision`] if a database with this name
    /// already exists, [`DbError::InvalidDbName`] for unsafe names, or the
    /// underlying engine error.
    pub async fn create_database(&self, name: &str) -> Result<()> {
        if !is_valid_db_name(name) {
            return Err(DbError::InvalidDbName(name.to_owned()));
        }
        tracing::debug!(db = name, "creating database");
        match self {
            Self::Postgres { pool } => {
                // CREATE DATABASE cannot be parameterized or prepared; the
                // name is identifier-validated above and double-quoted here,
                // and raw_sql keeps it on the simple query protocol.
                let stmt = format!("CREATE DATABASE \"{name}\"");
                match sqlx::raw_sql(&stmt).execute(pool).await {
                    Ok(_) => Ok(()),
                    Err(e) if is_duplicate_database(&e) => {
                        Err(DbError::NameCollision(name.to_owned()))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Self::Sqlite { base_dir } => {
                // create_new is the atomic exists-check: a concurrent creator
                // loses with AlreadyExists rather than truncating the winner.
                match std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(Self::sqlite_path(base_dir, name))
                {
                    Ok(_) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                        Err(DbError::NameCollision(name.to_owned()))
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Whether a database with this name exists.
    ///
    /// # Errors
    /// Returns the underlying engine error.
    pub async fn database_exists(&self, name: &str) -> Result<bool> {
        if !is_valid_db_name(name) {
            return Err(DbError::InvalidDbName(name.to_owned()));
        }
        match self {
            Self::Postgres { pool } => {
                let row: Option<(i32,)> =
                    sqlx::query_as("SELECT 1 FROM pg_database WHERE datname = $1")
                        .bind(name)
                        .fetch_optional(pool)
                        .await?;
                Ok(row.is_some())
            }
            Self::Sqlite { base_dir } => Ok(Self::sqlite_path(base_dir, name).exists()),
        }
    }

    /// Drop a database if it exists. Used as the compensating action after a
    /// failed provisioning run; absence is not an error.
    ///
    /// # Errors
    /// Returns the underlying engine error.
    pub async fn drop_database(&self, name: &str) -> Result<()> {
        if !is_valid_db_name(name) {
            return Err(DbError::InvalidDbName(name.to_owned()));
        }
        tracing::debug!(db = name, "dropping database");
        match self {
            Self::Postgres { pool } => {
                let stmt = format!("DROP DATABASE IF EXISTS \"{name}\"");
                sqlx::raw_sql(&stmt).execute(pool).await?;
                Ok(())
            }
            Self::Sqlite { base_dir } => {
                match std::fs::remove_file(Self::sqlite_path(base_dir, name)) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    fn sqlite_path(base_dir: &Path, name: &str) -> PathBuf {
        base_dir.join(format!("{name}.db"))
    }
}

fn is_duplicate_database(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Database(db) if db.code().as_deref() == Some(PG_DUPLICATE_DATABASE)
    )
}
