//! Aggregation queries over one tenant's audit log.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use modhost_db::on_pool;
use serde::Serialize;
use tenancy::TenantSession;

/// Aggregated view of a tenant's audit log.
#[derive(Clone, Debug, Serialize)]
pub struct AuditSummary {
    pub total: i64,
    /// Entry count per level, level-ordered for stable output.
    pub breakdown: BTreeMap<String, i64>,
    /// Entries recorded in the 24 hours before the reference instant.
    pub last_24h: i64,
}

/// Compute the summary for one tenant as of `now`.
///
/// # Errors
/// Returns the underlying database error.
pub async fn summarize(
    session: &TenantSession,
    now: DateTime<Utc>,
) -> Result<AuditSummary, modhost_db::DbError> {
    let db = session.db();
    let rows: Vec<(String, i64)> = on_pool!(db, |pool| {
        sqlx::query_as("SELECT level, COUNT(*) FROM audit_logs GROUP BY level ORDER BY level")
            .fetch_all(pool)
            .await?
    });

    let cutoff = (now - chrono::Duration::hours(24)).to_rfc3339();
    let last_24h: i64 = on_pool!(db, |pool| {
        sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs WHERE created_at >= $1")
            .bind(&cutoff)
            .fetch_one(pool)
            .await?
    });

    let total = rows.iter().map(|(_, n)| n).sum();
    Ok(AuditSummary {
        total,
        breakdown: rows.into_iter().collect(),
        last_24h,
    })
}

/// Distinct levels seen in this tenant's audit log.
///
/// # Errors
/// Returns the underlying database error.
pub async fn levels(session: &TenantSession) -> Result<Vec<String>, modhost_db::DbError> {
    let db = session.db();
    let rows: Vec<String> = on_pool!(db, |pool| {
        sqlx::query_scalar("SELECT DISTINCT level FROM audit_logs ORDER BY level")
            .fetch_all(pool)
            .await?
    });
    Ok(rows)
}
