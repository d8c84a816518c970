//! PostgreSQL driver

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection as SqlxConnection;

use super::connection_error;
use crate::connection::{Connection, SqlParam};
use crate::dialect::Dialect;
use crate::error::MigrateResult;
use crate::ledger::LedgerEntry;
use crate::lock::advisory_key;

/// Database used for catalog lookups and CREATE/DROP DATABASE
const MAINTENANCE_DATABASE: &str = "postgres";

#[derive(Clone)]
pub struct PostgresDriver {
    database: String,
    host: String,
    port: u16,
    user: Option<String>,
    password: Option<String>,
}

impl std::fmt::Debug for PostgresDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDriver")
            .field("database", &self.database)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl PostgresDriver {
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

    fn options(&self, database: &str) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(database);
        if let Some(user) = &self.user {
            options = options.username(user);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        options
    }

    async fn open(&self, database: &str) -> MigrateResult<PgConnection> {
        PgConnection::connect_with(&self.options(database))
            .await
            .map_err(|e| {
                connection_error(
                    Dialect::Postgres,
                    &format!("{}:{}/{}", self.host, self.port, database),
                    e,
                )
            })
    }

    pub async fn connect(&self) -> MigrateResult<PostgresConnection> {
        let conn = self.open(&self.database).await?;
        Ok(PostgresConnection {
            conn,
            database: self.database.clone(),
        })
    }

    pub async fn exists(&self) -> MigrateResult<bool> {
        let mut conn = self.open(MAINTENANCE_DATABASE).await?;
        let found = sqlx::query("SELECT 1 FROM pg_database WHERE datname = $1")
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
            "CREATE DATABASE {}",
            Dialect::Postgres.quote_identifier(&self.database)
        );
        tracing::debug!("{}", sql);

        let mut conn = self.open(MAINTENANCE_DATABASE).await?;
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
            Dialect::Postgres.quote_identifier(&self.database)
        );
        tracing::debug!("{}", sql);

        let mut conn = self.open(MAINTENANCE_DATABASE).await?;
        sqlx::raw_sql(&sql).execute(&mut conn).await?;
        conn.close().await?;
        Ok(true)
    }
}

sqlx_session!(PgConnection);

/// A single PostgreSQL session
pub struct PostgresConnection {
    conn: PgConnection,
    database: String,
}

#[async_trait]
impl Connection for PostgresConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
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

    async fn try_lock(&mut self, name: &str) -> MigrateResult<bool> {
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(advisory_key(name))
            .fetch_one(&mut self.conn)
            .await?;
        Ok(acquired)
    }

    async fn unlock(&mut self, name: &str) -> MigrateResult<()> {
        let released: bool = sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
            .bind(advisory_key(name))
            .fetch_one(&mut self.conn)
            .await?;
        if !released {
            tracing::warn!("Advisory lock '{}' was not held by this session", name);
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> MigrateResult<()> {
        self.conn.close().await?;
        Ok(())
    }
}
