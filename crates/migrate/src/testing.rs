//! In-memory connection double for unit tests

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::{Arc, Mutex};

use crate::connection::{Connection, SqlParam};
use crate::dialect::Dialect;
use crate::error::{MigrateResult, MigrationError};
use crate::ledger::{Ledger, LedgerEntry, LEDGER_TABLE};
use crate::listers;

/// Fixed timestamp on 2024-06-01 at `hour`:00
pub fn at(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub ledger: Vec<LedgerEntry>,
    /// Scripts that executed successfully, in order
    pub scripts: Vec<String>,
    pub ledger_created: bool,
    /// Fail any script containing this text
    pub fail_script_containing: Option<String>,
    /// Fail ledger writes for this migration id
    pub fail_ledger_for: Option<String>,
    pub locked: bool,
    /// Pretend another session holds the advisory lock
    pub held_elsewhere: bool,
}

/// Interprets exactly the statements [`Ledger`] renders for its dialect
pub struct FakeConnection {
    dialect: Dialect,
    ledger: Ledger,
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnection {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ledger: Ledger::new(dialect),
            state: Arc::new(Mutex::new(FakeState::default())),
        }
    }

    pub fn state(&self) -> Arc<Mutex<FakeState>> {
        Arc::clone(&self.state)
    }
}

fn text(params: &[SqlParam], index: usize) -> MigrateResult<String> {
    match params.get(index) {
        Some(SqlParam::Text(value)) => Ok(value.clone()),
        other => Err(MigrationError::Database(format!(
            "expected text parameter {}, got {:?}",
            index + 1,
            other
        ))),
    }
}

#[async_trait]
impl Connection for FakeConnection {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn database(&self) -> &str {
        "app"
    }

    async fn execute_script(&mut self, sql: &str) -> MigrateResult<u64> {
        let mut state = self.state.lock().unwrap();
        if let Some(marker) = &state.fail_script_containing {
            if sql.contains(marker.as_str()) {
                return Err(MigrationError::Database(format!(
                    "syntax error near \"{}\"",
                    marker
                )));
            }
        }
        state.scripts.push(sql.to_string());
        Ok(1)
    }

    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> MigrateResult<u64> {
        let mut state = self.state.lock().unwrap();

        if sql == self.ledger.create_table_sql() {
            state.ledger_created = true;
            return Ok(0);
        }

        if sql == self.ledger.insert_sql() {
            let id = text(params, 0)?;
            let ran_at = match params.get(1) {
                Some(SqlParam::Timestamp(ran_at)) => *ran_at,
                other => {
                    return Err(MigrationError::Database(format!(
                        "expected timestamp parameter, got {:?}",
                        other
                    )))
                }
            };
            if state.fail_ledger_for.as_deref() == Some(id.as_str()) {
                return Err(MigrationError::Database("disk I/O error".into()));
            }
            if state.ledger.iter().any(|e| e.migration == id) {
                return Err(MigrationError::Database(format!(
                    "duplicate key value violates unique constraint on {}",
                    LEDGER_TABLE
                )));
            }
            state.ledger.push(LedgerEntry::new(id, ran_at));
            return Ok(1);
        }

        if sql == self.ledger.delete_sql() {
            let id = text(params, 0)?;
            if state.fail_ledger_for.as_deref() == Some(id.as_str()) {
                return Err(MigrationError::Database("disk I/O error".into()));
            }
            let before = state.ledger.len();
            state.ledger.retain(|e| e.migration != id);
            return Ok((before - state.ledger.len()) as u64);
        }

        Err(MigrationError::Database(format!("unexpected statement: {}", sql)))
    }

    async fn fetch_ledger(&mut self, sql: &str) -> MigrateResult<Vec<LedgerEntry>> {
        let state = self.state.lock().unwrap();

        if sql == self.ledger.select_ran_sql() {
            let mut entries = state.ledger.clone();
            entries.sort_by(|a, b| b.migration.cmp(&a.migration));
            return Ok(entries);
        }

        if sql == self.ledger.select_last_sql() {
            return Ok(listers::revert_order(&state.ledger)
                .into_iter()
                .take(1)
                .collect());
        }

        Err(MigrationError::Database(format!("unexpected query: {}", sql)))
    }

    async fn fetch_exists(&mut self, sql: &str, params: &[SqlParam]) -> MigrateResult<bool> {
        if sql == self.ledger.has_table_sql() {
            let table = text(params, 0)?;
            return Ok(table == LEDGER_TABLE && self.state.lock().unwrap().ledger_created);
        }
        Err(MigrationError::Database(format!("unexpected query: {}", sql)))
    }

    async fn try_lock(&mut self, _name: &str) -> MigrateResult<bool> {
        let mut state = self.state.lock().unwrap();
        if state.held_elsewhere {
            return Ok(false);
        }
        state.locked = true;
        Ok(true)
    }

    async fn unlock(&mut self, _name: &str) -> MigrateResult<()> {
        self.state.lock().unwrap().locked = false;
        Ok(())
    }

    async fn close(self: Box<Self>) -> MigrateResult<()> {
        Ok(())
    }
}
