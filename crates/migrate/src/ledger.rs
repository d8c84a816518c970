//! The `__migrations` ledger table
//!
//! One row per applied migration. Statements are rendered per dialect from a
//! small template table so the rest of the engine never writes SQL by hand.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::connection::{Connection, SqlParam};
use crate::dialect::Dialect;
use crate::error::{MigrateResult, MigrationError};

/// Logical ledger table name, identical for every dialect
pub const LEDGER_TABLE: &str = "__migrations";

/// A row of the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub migration: String,
    pub ran_at: NaiveDateTime,
}

impl LedgerEntry {
    pub fn new(migration: impl Into<String>, ran_at: NaiveDateTime) -> Self {
        Self {
            migration: migration.into(),
            ran_at,
        }
    }
}

/// Ledger statements for one dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ledger {
    dialect: Dialect,
}

impl Ledger {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn table_name(&self) -> &'static str {
        LEDGER_TABLE
    }

    fn table(&self) -> String {
        self.dialect.quote_identifier(LEDGER_TABLE)
    }

    pub fn create_table_sql(&self) -> String {
        let column_types = match self.dialect {
            Dialect::Postgres => ("VARCHAR(255)", "TIMESTAMP"),
            Dialect::MySql => ("VARCHAR(255)", "DATETIME"),
            Dialect::Sqlite => ("TEXT", "DATETIME"),
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {} (migration {} NOT NULL PRIMARY KEY, ran_at {} NOT NULL DEFAULT CURRENT_TIMESTAMP)",
            self.table(),
            column_types.0,
            column_types.1
        )
    }

    pub fn select_ran_sql(&self) -> String {
        format!(
            "SELECT migration, ran_at FROM {} ORDER BY migration DESC",
            self.table()
        )
    }

    pub fn select_last_sql(&self) -> String {
        format!(
            "SELECT migration, ran_at FROM {} ORDER BY ran_at DESC, migration DESC LIMIT 1",
            self.table()
        )
    }

    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (migration, ran_at) VALUES ({}, {})",
            self.table(),
            self.dialect.placeholder(1),
            self.dialect.placeholder(2)
        )
    }

    pub fn delete_sql(&self) -> String {
        format!(
            "DELETE FROM {} WHERE migration = {}",
            self.table(),
            self.dialect.placeholder(1)
        )
    }

    /// Catalog lookup taking the table name as its only parameter
    pub fn has_table_sql(&self) -> String {
        match self.dialect {
            Dialect::Postgres => "SELECT 1 FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = $1".to_string(),
            Dialect::MySql => "SELECT 1 FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = ?".to_string(),
            Dialect::Sqlite => "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?".to_string(),
        }
    }

    /// Create the ledger table if it does not exist
    pub async fn ensure(&self, conn: &mut dyn Connection) -> MigrateResult<()> {
        let sql = self.create_table_sql();
        tracing::debug!("{}", sql);
        conn.execute(&sql, &[])
            .await
            .map_err(|e| MigrationError::ledger("create", e))?;
        Ok(())
    }

    /// Whether `table` exists in the connected database
    pub async fn has_table(&self, conn: &mut dyn Connection, table: &str) -> MigrateResult<bool> {
        conn.fetch_exists(&self.has_table_sql(), &[SqlParam::from(table)])
            .await
    }

    /// Every entry, newest id first
    pub async fn ran(&self, conn: &mut dyn Connection) -> MigrateResult<Vec<LedgerEntry>> {
        conn.fetch_ledger(&self.select_ran_sql())
            .await
            .map_err(|e| MigrationError::ledger("select", e))
    }

    /// The entry with the latest `ran_at`
    pub async fn last(&self, conn: &mut dyn Connection) -> MigrateResult<Option<LedgerEntry>> {
        let mut rows = conn
            .fetch_ledger(&self.select_last_sql())
            .await
            .map_err(|e| MigrationError::ledger("select", e))?;
        Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
    }

    pub async fn insert(
        &self,
        conn: &mut dyn Connection,
        id: &str,
        ran_at: NaiveDateTime,
    ) -> MigrateResult<()> {
        conn.execute(&self.insert_sql(), &[SqlParam::from(id), SqlParam::from(ran_at)])
            .await
            .map_err(|e| MigrationError::ledger("insert", e))?;
        Ok(())
    }

    pub async fn delete(&self, conn: &mut dyn Connection, id: &str) -> MigrateResult<()> {
        conn.execute(&self.delete_sql(), &[SqlParam::from(id)])
            .await
            .map_err(|e| MigrationError::ledger("delete", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_is_shared() {
        for dialect in Dialect::ALL {
            assert_eq!(Ledger::new(dialect).table_name(), "__migrations");
        }
    }

    #[test]
    fn test_create_table_sql() {
        assert_eq!(
            Ledger::new(Dialect::Postgres).create_table_sql(),
            "CREATE TABLE IF NOT EXISTS \"__migrations\" (migration VARCHAR(255) NOT NULL PRIMARY KEY, ran_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP)"
        );
        assert!(Ledger::new(Dialect::MySql)
            .create_table_sql()
            .starts_with("CREATE TABLE IF NOT EXISTS `__migrations` (migration VARCHAR(255)"));
        assert!(Ledger::new(Dialect::Sqlite)
            .create_table_sql()
            .contains("migration TEXT NOT NULL PRIMARY KEY, ran_at DATETIME"));
    }

    #[test]
    fn test_placeholders_per_dialect() {
        assert_eq!(
            Ledger::new(Dialect::Postgres).insert_sql(),
            "INSERT INTO \"__migrations\" (migration, ran_at) VALUES ($1, $2)"
        );
        assert_eq!(
            Ledger::new(Dialect::MySql).delete_sql(),
            "DELETE FROM `__migrations` WHERE migration = ?"
        );
    }

    #[test]
    fn test_select_ordering() {
        let ledger = Ledger::new(Dialect::Sqlite);
        assert!(ledger.select_ran_sql().ends_with("ORDER BY migration DESC"));
        assert!(ledger
            .select_last_sql()
            .ends_with("ORDER BY ran_at DESC, migration DESC LIMIT 1"));
    }

    #[test]
    fn test_has_table_queries() {
        assert!(Ledger::new(Dialect::Postgres).has_table_sql().contains("current_schema()"));
        assert!(Ledger::new(Dialect::MySql).has_table_sql().contains("DATABASE()"));
        assert!(Ledger::new(Dialect::Sqlite).has_table_sql().contains("sqlite_master"));
    }
}
