//! Advisory locking around batches
//!
//! `up`, `down`, `reset` and the repair operations hold a session-level
//! advisory lock named after the target database, so two processes cannot
//! interleave ledger writes. Acquisition is polled until the configured
//! timeout.

use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

use crate::connection::Connection;
use crate::error::{MigrateResult, MigrationError};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lock name for a database
pub fn lock_name(database: &str) -> String {
    format!("elif_migrate.{}", database)
}

/// First 8 bytes of the SHA-256 of the lock name, for backends keyed by integers
pub fn advisory_key(name: &str) -> i64 {
    let digest = Sha256::digest(name.as_bytes());
    let mut key = [0u8; 8];
    key.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(key)
}

/// Poll `try_lock` until it succeeds or `timeout` elapses
pub async fn acquire(
    conn: &mut dyn Connection,
    name: &str,
    timeout: Duration,
) -> MigrateResult<()> {
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if conn.try_lock(name).await? {
            tracing::debug!("Acquired migration lock '{}' after {} attempt(s)", name, attempts);
            return Ok(());
        }

        if start.elapsed() >= timeout {
            return Err(MigrationError::LockTimeout {
                database: conn.database().to_string(),
                seconds: timeout.as_secs(),
            });
        }

        if attempts == 1 {
            tracing::info!("Waiting for migration lock '{}' held by another process", name);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Release the lock; failures only warn since the session end frees it anyway
pub async fn release(conn: &mut dyn Connection, name: &str) {
    match conn.unlock(name).await {
        Ok(()) => tracing::debug!("Released migration lock '{}'", name),
        Err(e) => tracing::warn!("Failed to release migration lock '{}': {}", name, e),
    }
}
