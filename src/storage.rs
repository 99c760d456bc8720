//! Connection pool setup and the transaction coordinator.
//!
//! Repositories never open their own connections: every repository
//! method takes `&mut PgConnection`, which is either a pool-acquired
//! connection or the handle of an enclosing transaction. The coordinator
//! below is the only place transactions begin and end.

use std::{future::Future, pin::Pin, time::Duration};

use anyhow::{Context, Result};
use sqlx::{PgConnection, PgPool, postgres::PgPoolOptions};

/// Future returned by a unit of work running inside a transaction.
pub type UnitOfWork<'c, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>;

/// Connect to the database with the service's standard pool settings.
///
/// # Errors
/// Returns an error if the pool cannot be established.
pub async fn connect(dsn: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")
}

/// Runs `unit` inside a single transaction: commits on success, rolls
/// back and returns the unit's error verbatim on failure.
///
/// Single-level only. The unit of work must pass the provided handle to
/// every repository call it makes; opening a second connection inside
/// the unit would escape the transaction.
///
/// # Errors
/// Returns the unit's own error, or the database error from
/// begin/commit.
pub async fn execute_in_transaction<T, E, F>(pool: &PgPool, unit: F) -> Result<T, E>
where
    E: From<sqlx::Error>,
    F: for<'c> FnOnce(&'c mut PgConnection) -> UnitOfWork<'c, T, E>,
{
    let mut tx = pool.begin().await?;

    match unit(&mut *tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            // Roll back and surface the original error; a failed
            // rollback would mask it.
            let _ = tx.rollback().await;
            Err(err)
        }
    }
}

/// Returns `true` when `err` is a unique-violation (SQLSTATE `23505`).
#[must_use]
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}
