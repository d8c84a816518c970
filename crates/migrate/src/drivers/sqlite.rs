//! SQLite driver
//!
//! The database is a single file. Writers are already serialized by the file
//! lock, so advisory locking is a no-op here.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection as RawConnection};
use sqlx::Connection as SqlxConnection;
use std::path::{Path, PathBuf};

use super::connection_error;
use crate::connection::{Connection, SqlParam};
use crate::dialect::Dialect;
use crate::error::MigrateResult;
use crate::ledger::LedgerEntry;

#[derive(Debug, Clone)]
pub struct SqliteDriver {
    database: String,
    path: PathBuf,
}

impl SqliteDriver {
    pub fn new(database: &str, path: &Path) -> Self {
        Self {
            database: database.to_string(),
            path: path.to_path_buf(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self, create: bool) -> MigrateResult<RawConnection> {
        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(create);
        RawConnection::connect_with(&options)
            .await
            .map_err(|e| connection_error(Dialect::Sqlite, &self.path.display().to_string(), e))
    }

    /// Connect to an existing database file
    pub async fn connect(&self) -> MigrateResult<SqliteConnection> {
        let conn = self.open(false).await?;
        Ok(SqliteConnection {
            conn,
            database: self.database.clone(),
        })
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub async fn create_database(&self) -> MigrateResult<bool> {
        if self.exists() {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.open(true).await?.close().await?;
        Ok(true)
    }

    pub fn drop_database(&self) -> MigrateResult<bool> {
        if !self.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path)?;
        for suffix in ["-wal", "-shm", "-journal"] {
            let mut sidecar = self.path.clone().into_os_string();
            sidecar.push(suffix);
            let sidecar = PathBuf::from(sidecar);
            if sidecar.exists() {
                std::fs::remove_file(sidecar)?;
            }
        }
        Ok(true)
    }
}

sqlx_session!(RawConnection);

/// A single SQLite session
pub struct SqliteConnection {
    conn: RawConnection,
    database: String,
}

#[async_trait]
impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn database(&self) -> &str {
        &self.database
    }

    async fn execute_script(&mut self, sql: &str) -> MigrateResult<u64> {
        run_script(&mut self.conn, sql).await
    }

    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> MigrateResult<u64> {
        run_statement(&mut self.conn, sql, params).await
    }

    async fn fetch_ledger(&mut self, sql: &str) -> MigrateResult<Vec<LedgerEntry>> {
        fetch_entries(&mut self.conn, sql).await
    }

    async fn fetch_exists(&mut self, sql: &str, params: &[SqlParam]) -> MigrateResult<bool> {
        row_exists(&mut self.conn, sql, params).await
    }

    async fn try_lock(&mut self, _name: &str) -> MigrateResult<bool> {
        Ok(true)
    }

    async fn unlock(&mut self, _name: &str) -> MigrateResult<()> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> MigrateResult<()> {
        self.conn.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_exists_drop() {
        let dir = tempfile::tempdir().unwrap();
        let driver = SqliteDriver::new("cache", &dir.path().join("nested/cache.db"));

        assert!(!driver.exists());
        assert!(driver.create_database().await.unwrap());
        assert!(driver.exists());
        assert!(!driver.create_database().await.unwrap());

        assert!(driver.drop_database().unwrap());
        assert!(!driver.exists());
        assert!(!driver.drop_database().unwrap());
    }

    #[tokio::test]
    async fn test_connect_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let driver = SqliteDriver::new("cache", &dir.path().join("missing.db"));
        assert!(matches!(
            driver.connect().await,
            Err(crate::MigrationError::Connection { .. })
        ));
    }

    #[tokio::test]
    async fn test_script_rolls_back_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let driver = SqliteDriver::new("app", &dir.path().join("app.db"));
        driver.create_database().await.unwrap();
        let mut conn = driver.connect().await.unwrap();

        conn.execute_script("CREATE TABLE a (id INTEGER);").await.unwrap();
        let err = conn
            .execute_script("INSERT INTO a VALUES (1); INSERT INTO missing VALUES (2);")
            .await;
        assert!(err.is_err());

        let exists = conn
            .fetch_exists("SELECT 1 FROM a", &[])
            .await
            .unwrap();
        assert!(!exists, "partial script must be rolled back");
    }

    #[tokio::test]
    async fn test_boxed_session_runs_on_spawned_task() {
        let dir = tempfile::tempdir().unwrap();
        let driver = SqliteDriver::new("app", &dir.path().join("app.db"));
        driver.create_database().await.unwrap();
        let mut conn: Box<dyn Connection> = Box::new(driver.connect().await.unwrap());

        let handle = tokio::spawn(async move {
            conn.execute_script("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1), (2);")
                .await?;
            let inserted = conn
                .execute("INSERT INTO t VALUES (?)", &[SqlParam::from("3")])
                .await?;
            let found = conn
                .fetch_exists("SELECT 1 FROM t WHERE id = ?", &[SqlParam::from("3")])
                .await?;
            conn.close().await?;
            Ok::<_, crate::MigrationError>((inserted, found))
        });

        assert_eq!(handle.await.unwrap().unwrap(), (1, true));
    }
}
