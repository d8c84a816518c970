//! Connection abstraction used by the migrator
//!
//! Each backend driver hands out a boxed [`Connection`]; the migrator never
//! sees a concrete `sqlx` type, which lets tests inject a scripted double.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::dialect::Dialect;
use crate::error::MigrateResult;
use crate::ledger::LedgerEntry;

/// A bound statement parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Timestamp(NaiveDateTime),
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<NaiveDateTime> for SqlParam {
    fn from(value: NaiveDateTime) -> Self {
        SqlParam::Timestamp(value)
    }
}

/// One exclusive session against one database
#[async_trait]
pub trait Connection: Send {
    /// Dialect of the backend
    fn dialect(&self) -> Dialect;

    /// Name of the database this connection is bound to
    fn database(&self) -> &str;

    /// Run a multi-statement script inside its own transaction.
    ///
    /// The transaction is rolled back if any statement fails. Returns the
    /// number of affected rows reported by the backend.
    async fn execute_script(&mut self, sql: &str) -> MigrateResult<u64>;

    /// Run one parameterized statement inside its own transaction
    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> MigrateResult<u64>;

    /// Run a query selecting `(migration, ran_at)` rows
    async fn fetch_ledger(&mut self, sql: &str) -> MigrateResult<Vec<LedgerEntry>>;

    /// Run a query and report whether it returned any row
    async fn fetch_exists(&mut self, sql: &str, params: &[SqlParam]) -> MigrateResult<bool>;

    /// Try once to take the named session-level advisory lock
    async fn try_lock(&mut self, name: &str) -> MigrateResult<bool>;

    /// Release the named advisory lock
    async fn unlock(&mut self, name: &str) -> MigrateResult<()>;

    /// Close the session
    async fn close(self: Box<Self>) -> MigrateResult<()>;
}
