//! Backend drivers
//!
//! A [`Driver`] turns resolved [`ConnectionSettings`] into live connections
//! and handles database-level housekeeping: existence checks, setup and drop.
//! Every backend talks to the server through `sqlx`; no external client
//! binaries are involved.

use crate::config::{ConfigError, ConnectionSettings, Endpoint};
use crate::connection::Connection;
use crate::dialect::{validate_database_name, Dialect};
use crate::error::{MigrateResult, MigrationError};
use crate::ledger::Ledger;

/// Bind a slice of [`SqlParam`](crate::connection::SqlParam) onto an `sqlx` query
macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                $crate::connection::SqlParam::Text(value) => query.bind(value.clone()),
                $crate::connection::SqlParam::Timestamp(value) => query.bind(*value),
            };
        }
        query
    }};
}

/// Statement helpers shared by every `sqlx` session type.
///
/// Expands to `run_script`, `run_statement`, `fetch_entries` and `row_exists`
/// over the given raw connection. Each returns a boxed future bound to the
/// connection borrow, and goes through `sqlx::Executor` directly, so no
/// executor lifetime has to be proven `Send` inside an `#[async_trait]` body.
macro_rules! sqlx_session {
    ($raw:ty) => {
        type SessionFuture<'c, T> = ::std::pin::Pin<
            Box<dyn ::std::future::Future<Output = $crate::error::MigrateResult<T>> + Send + 'c>,
        >;

        /// Run a multi-statement script in its own transaction
        fn run_script<'c>(conn: &'c mut $raw, sql: &'c str) -> SessionFuture<'c, u64> {
            Box::pin(async move {
                let mut tx = ::sqlx::Connection::begin(conn).await?;
                match ::sqlx::Executor::execute(&mut *tx, ::sqlx::raw_sql(sql)).await {
                    Ok(result) => {
                        tx.commit().await?;
                        Ok(result.rows_affected())
                    }
                    Err(e) => {
                        if let Err(rollback) = tx.rollback().await {
                            tracing::error!("Rollback failed: {}", rollback);
                        }
                        Err(e.into())
                    }
                }
            })
        }

        /// Run one parameterized statement in its own transaction
        fn run_statement<'c>(
            conn: &'c mut $raw,
            sql: &'c str,
            params: &'c [$crate::connection::SqlParam],
        ) -> SessionFuture<'c, u64> {
            Box::pin(async move {
                let mut tx = ::sqlx::Connection::begin(conn).await?;
                let query = bind_params!(::sqlx::query(sql), params);
                let result = ::sqlx::Executor::execute(&mut *tx, query).await?;
                tx.commit().await?;
                Ok(result.rows_affected())
            })
        }

        /// Read `(migration, ran_at)` rows
        fn fetch_entries<'c>(
            conn: &'c mut $raw,
            sql: &'c str,
        ) -> SessionFuture<'c, Vec<$crate::ledger::LedgerEntry>> {
            Box::pin(async move {
                let rows = ::sqlx::Executor::fetch_all(conn, ::sqlx::query(sql)).await?;
                let mut entries = Vec::with_capacity(rows.len());
                for row in rows {
                    entries.push($crate::ledger::LedgerEntry {
                        migration: ::sqlx::Row::try_get(&row, "migration")?,
                        ran_at: ::sqlx::Row::try_get(&row, "ran_at")?,
                    });
                }
                Ok(entries)
            })
        }

        /// Whether a query returns at least one row
        fn row_exists<'c>(
            conn: &'c mut $raw,
            sql: &'c str,
            params: &'c [$crate::connection::SqlParam],
        ) -> SessionFuture<'c, bool> {
            Box::pin(async move {
                let query = bind_params!(::sqlx::query(sql), params);
                let row = ::sqlx::Executor::fetch_optional(conn, query).await?;
                Ok(row.is_some())
            })
        }
    };
}

pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use mysql::{MySqlConnection, MySqlDriver};
pub use postgres::{PostgresConnection, PostgresDriver};
pub use sqlite::{SqliteConnection, SqliteDriver};

/// Map a connect failure to a connectivity fault
pub(crate) fn connection_error(dialect: Dialect, target: &str, err: sqlx::Error) -> MigrationError {
    MigrationError::Connection {
        dialect,
        message: format!("{}: {}", target, err),
    }
}

/// Backend driver for one configured database
#[derive(Debug, Clone)]
pub enum Driver {
    MySql(MySqlDriver),
    Postgres(PostgresDriver),
    Sqlite(SqliteDriver),
}

impl Driver {
    pub fn new(settings: &ConnectionSettings) -> MigrateResult<Self> {
        validate_database_name(&settings.database)?;

        let driver = match (settings.dialect, &settings.endpoint) {
            (
                Dialect::Postgres,
                Endpoint::Network {
                    host,
                    port,
                    user,
                    password,
                },
            ) => Driver::Postgres(PostgresDriver::new(
                &settings.database,
                host,
                *port,
                user.clone(),
                password.clone(),
            )),
            (
                Dialect::MySql,
                Endpoint::Network {
                    host,
                    port,
                    user,
                    password,
                },
            ) => Driver::MySql(MySqlDriver::new(
                &settings.database,
                host,
                *port,
                user.clone(),
                password.clone(),
            )),
            (Dialect::Sqlite, Endpoint::File { path }) => {
                Driver::Sqlite(SqliteDriver::new(&settings.database, path))
            }
            (dialect, _) => {
                return Err(ConfigError::invalid_value(
                    format!("databases.{}", settings.database),
                    dialect.to_string(),
                    "a dialect matching its endpoint (host for mysql/postgres, path for sqlite)",
                )
                .into())
            }
        };

        Ok(driver)
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            Driver::MySql(_) => Dialect::MySql,
            Driver::Postgres(_) => Dialect::Postgres,
            Driver::Sqlite(_) => Dialect::Sqlite,
        }
    }

    pub fn database(&self) -> &str {
        match self {
            Driver::MySql(driver) => driver.database(),
            Driver::Postgres(driver) => driver.database(),
            Driver::Sqlite(driver) => driver.database(),
        }
    }

    /// Open a connection bound to the configured database
    pub async fn connect(&self) -> MigrateResult<Box<dyn Connection>> {
        tracing::debug!("Connecting to {} database '{}'", self.dialect(), self.database());
        let connection: Box<dyn Connection> = match self {
            Driver::MySql(driver) => Box::new(driver.connect().await?),
            Driver::Postgres(driver) => Box::new(driver.connect().await?),
            Driver::Sqlite(driver) => Box::new(driver.connect().await?),
        };
        Ok(connection)
    }

    /// Whether the database exists on the server (or on disk)
    pub async fn exists(&self) -> MigrateResult<bool> {
        match self {
            Driver::MySql(driver) => driver.exists().await,
            Driver::Postgres(driver) => driver.exists().await,
            Driver::Sqlite(driver) => Ok(driver.exists()),
        }
    }

    /// Create the database if absent, then the ledger table.
    ///
    /// Returns whether the database had to be created.
    pub async fn setup(&self) -> MigrateResult<bool> {
        let created = match self {
            Driver::MySql(driver) => driver.create_database().await?,
            Driver::Postgres(driver) => driver.create_database().await?,
            Driver::Sqlite(driver) => driver.create_database().await?,
        };
        if created {
            tracing::info!("Created {} database '{}'", self.dialect(), self.database());
        }

        let mut conn = self.connect().await?;
        Ledger::new(self.dialect()).ensure(conn.as_mut()).await?;
        conn.close().await?;
        Ok(created)
    }

    /// Drop the database; returns whether anything was dropped
    pub async fn drop_database(&self) -> MigrateResult<bool> {
        let dropped = match self {
            Driver::MySql(driver) => driver.drop_database().await?,
            Driver::Postgres(driver) => driver.drop_database().await?,
            Driver::Sqlite(driver) => driver.drop_database()?,
        };
        if dropped {
            tracing::info!("Dropped {} database '{}'", self.dialect(), self.database());
        }
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_driver_matches_endpoint() {
        let settings = ConnectionSettings {
            database: "app".into(),
            dialect: Dialect::Postgres,
            endpoint: Endpoint::Network {
                host: "localhost".into(),
                port: 5432,
                user: None,
                password: None,
            },
        };
        let driver = Driver::new(&settings).unwrap();
        assert_eq!(driver.dialect(), Dialect::Postgres);
        assert_eq!(driver.database(), "app");

        let sqlite = ConnectionSettings {
            database: "cache".into(),
            dialect: Dialect::Sqlite,
            endpoint: Endpoint::File {
                path: PathBuf::from("cache.db"),
            },
        };
        assert_eq!(Driver::new(&sqlite).unwrap().dialect(), Dialect::Sqlite);
    }

    #[test]
    fn test_driver_rejects_mismatch() {
        let settings = ConnectionSettings {
            database: "app".into(),
            dialect: Dialect::MySql,
            endpoint: Endpoint::File {
                path: PathBuf::from("app.db"),
            },
        };
        assert!(matches!(
            Driver::new(&settings),
            Err(MigrationError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_driver_rejects_unsafe_name() {
        let settings = ConnectionSettings {
            database: "app\"; DROP DATABASE x; --".into(),
            dialect: Dialect::Postgres,
            endpoint: Endpoint::Network {
                host: "localhost".into(),
                port: 5432,
                user: None,
                password: None,
            },
        };
        assert!(matches!(
            Driver::new(&settings),
            Err(MigrationError::InvalidDatabaseName(_))
        ));
    }
}
