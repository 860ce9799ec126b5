//! Schema bootstrap.
//!
//! The service applies a plain SQL file at startup. There is no migration
//! tooling: every statement in the file is expected to be idempotent
//! (`CREATE ... IF NOT EXISTS`).

use order_info_core::{OrderError, Result};
use sqlx::PgPool;

/// The four-table aggregate schema shipped with this crate.
pub const SCHEMA: &str = include_str!("../sql/schema.sql");

/// Execute `sql` against `pool` as a single batch.
///
/// Blank input is skipped.
///
/// # Errors
///
/// Returns [`OrderError::Storage`] if any statement fails.
pub async fn apply_schema(pool: &PgPool, sql: &str) -> Result<()> {
    if sql.trim().is_empty() {
        tracing::warn!("Schema script is empty, skipping");
        return Ok(());
    }

    sqlx::raw_sql(sql)
        .execute(pool)
        .await
        .map_err(|e| OrderError::Storage(format!("failed to apply schema: {e}")))?;

    tracing::info!("Database schema applied");
    Ok(())
}
