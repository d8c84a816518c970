//! MySQL / MariaDB driver

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection as RawConnection};
use sqlx::Connection as SqlxConnection;

use super::connection_error;
use crate::connection::{Connection, SqlParam};
use crate::dialect::Dialect;
use crate::error::MigrateResult;
use crate::ledger::LedgerEntry;
use crate::lock::advisory_key;

/// GET_LOCK rejects names longer than this
const MAX_LOCK_NAME: usize = 64;

#[derive(Clone)]
pub struct MySqlDriver {
    database: String,
    host: String,
    port: u16,
    user: Option<String>,
    password: Option<String>,
}

impl std::fmt::Debug for MySqlDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlDriver")
            .field("database", &self.database)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl MySqlDriver {
    pub fn new(
        database: &str,
        host: &str,
        port: u16,
        user: Option<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            database: database.to_string(),
            host: host.to_string(),
            port,
            user,
            password,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn options(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new().host(&self.host).port(self.port);
        if let Some(user) = &self.user {
            options = options.username(user);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        options
    }

    /// Server-level session with no default schema
    async fn open_server(&self) -> MigrateResult<RawConnection> {
        RawConnection::connect_with(&self.options())
            .await
            .map_err(|e| connection_error(Dialect::MySql, &format!("{}:{}", self.host, self.port), e))
    }

    pub async fn connect(&self) -> MigrateResult<MySqlConnection> {
        let conn = RawConnection::connect_with(&self.options().database(&self.database))
            .await
            .map_err(|e| {
                connection_error(
                    Dialect::MySql,
                    &format!("{}:{}/{}", self.host, self.port, self.database),
                    e,
                )
            })?;
        Ok(MySqlConnection {
            conn,
            database: self.database.clone(),
        })
    }

    pub async fn exists(&self) -> MigrateResult<bool> {
        let mut conn = self.open_server().await?;
        let found = sqlx::query("SELECT 1 FROM INFORMATION_SCHEMA.SCHEMATA WHERE SCHEMA_NAME = ?")
            .bind(&self.database)
            .fetch_optional(&mut conn)
            .await?
            .is_some();
        conn.close().await?;
        Ok(found)
    }

    pub async fn create_database(&self) -> MigrateResult<bool> {
        if self.exists().await? {
            return Ok(false);
        }
        let sql = format!(
            "CREATE DATABASE IF NOT EXISTS {}",
            Dialect::MySql.quote_identifier(&self.database)
        );
        tracing::debug!("{}", sql);

        let mut conn = self.open_server().await?;
        sqlx::raw_sql(&sql).execute(&mut conn).await?;
        conn.close().await?;
        Ok(true)
    }

    pub async fn drop_database(&self) -> MigrateResult<bool> {
        if !self.exists().await? {
            return Ok(false);
        }
        let sql = format!(
            "DROP DATABASE IF EXISTS {}",
            Dialect::MySql.quote_identifier(&self.database)
        );
        tracing::debug!("{}", sql);

        let mut conn = self.open_server().await?;
        sqlx::raw_sql(&sql).execute(&mut conn).await?;
        conn.close().await?;
        Ok(true)
    }
}

fn lock_identifier(name: &str) -> String {
    if name.len() <= MAX_LOCK_NAME {
        name.to_string()
    } else {
        format!("elif_migrate.{:016x}", advisory_key(name))
    }
}

sqlx_session!(RawConnection);

/// A single MySQL session
pub struct MySqlConnection {
    conn: RawConnection,
    database: String,
}

#[async_trait]
impl Connection for MySqlConnection {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn database(&self) -> &str {
        &self.database
    }

    // DDL statements commit implicitly on MySQL, so a failed script may leave
    // earlier statements of the same script applied.
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

    async fn try_lock(&mut self, name: &str) -> MigrateResult<bool> {
        // GET_LOCK returns 1 on success, 0 on timeout and NULL on error
        let acquired: Option<i64> = sqlx::query_scalar("SELECT CAST(GET_LOCK(?, 0) AS SIGNED)")
            .bind(lock_identifier(name))
            .fetch_one(&mut self.conn)
            .await?;
        Ok(acquired == Some(1))
    }

    async fn unlock(&mut self, name: &str) -> MigrateResult<()> {
        let released: Option<i64> = sqlx::query_scalar("SELECT CAST(RELEASE_LOCK(?) AS SIGNED)")
            .bind(lock_identifier(name))
            .fetch_one(&mut self.conn)
            .await?;
        if released != Some(1) {
            tracing::warn!("Lock '{}' was not held by this session", name);
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> MigrateResult<()> {
        self.conn.close().await?;
        Ok(())
    }
}
