//! The migrator: applies, reverts and inspects migrations for one database
//!
//! A [`Migrator`] owns exactly one connection. Every batch runs migrations one
//! at a time in order, each as two transactions: the script, then the ledger
//! write. A batch that stops partway returns [`MigrationError::Halted`] with
//! the work already done, so callers never confuse a failure with a short
//! count.

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::MigrateConfig;
use crate::connection::Connection;
use crate::dialect::{validate_database_name, Dialect};
use crate::drivers::Driver;
use crate::error::{MigrateResult, MigrationError};
use crate::ledger::{Ledger, LedgerEntry};
use crate::listers::{self, MigrationStatus};
use crate::lock;
use crate::migration::{migrations_directory, Direction, Migration};
use crate::progress::{Cancellation, NoProgress, Progress, StepOutcome};
use crate::scanner::Scanner;

/// Outcome of an `up`/`down` batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub direction: Direction,
    /// Migrations whose script ran and whose ledger change was recorded, in order
    pub completed: Vec<String>,
    /// Migrations with an empty script; nothing ran for them
    pub skipped: Vec<String>,
    pub affected_rows: u64,
    /// The batch stopped early because cancellation was requested
    pub cancelled: bool,
}

impl BatchReport {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            completed: Vec::new(),
            skipped: Vec::new(),
            affected_rows: 0,
            cancelled: false,
        }
    }

    /// Number of fully applied (or reverted) migrations
    pub fn count(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.skipped.is_empty()
    }
}

/// Paths written by [`Migrator::create`], relative to the project root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedMigration {
    pub id: String,
    pub up: PathBuf,
    pub down: PathBuf,
}

impl CreatedMigration {
    fn new(migration: &Migration, project_root: &Path) -> Self {
        let relative = |path: PathBuf| {
            path.strip_prefix(project_root)
                .map(Path::to_path_buf)
                .unwrap_or(path)
        };
        Self {
            id: migration.id.clone(),
            up: relative(migration.script_path(Direction::Up)),
            down: relative(migration.script_path(Direction::Down)),
        }
    }
}

/// Scaffold a migration for `database` without opening a connection
pub fn create_migration(
    config: &MigrateConfig,
    database: &str,
    name: &str,
) -> MigrateResult<CreatedMigration> {
    let scanner = Scanner::new(config.migrations_directory(database)?);
    let migration = scanner.create(name, Utc::now().naive_utc())?;
    Ok(CreatedMigration::new(&migration, &config.project_root))
}

/// Migration executor bound to one connection and one dialect
pub struct Migrator {
    connection: Box<dyn Connection>,
    ledger: Ledger,
    database: String,
    migrations_root: PathBuf,
    project_root: PathBuf,
    lock_timeout: Duration,
    progress: Box<dyn Progress>,
    cancellation: Cancellation,
}

impl Migrator {
    /// Wrap an already open connection
    pub fn new(connection: Box<dyn Connection>, config: &MigrateConfig) -> MigrateResult<Self> {
        let database = connection.database().to_string();
        validate_database_name(&database)?;

        Ok(Self {
            ledger: Ledger::new(connection.dialect()),
            connection,
            database,
            migrations_root: config.migrations_root(),
            project_root: config.project_root.clone(),
            lock_timeout: Duration::from_secs(config.lock_timeout_secs),
            progress: Box::new(NoProgress),
            cancellation: Cancellation::new(),
        })
    }

    /// Resolve `database` from the config, connect, and make sure the ledger exists
    pub async fn connect(config: &MigrateConfig, database: &str) -> MigrateResult<Self> {
        let settings = config.database(database)?;
        let driver = Driver::new(&settings)?;
        let connection = driver.connect().await?;

        let mut migrator = Self::new(connection, config)?;
        migrator.ensure_ledger().await?;
        Ok(migrator)
    }

    pub fn with_progress(mut self, progress: Box<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Handle that stops a running batch before its next migration
    pub fn cancellation(&self) -> Cancellation {
        self.cancellation.clone()
    }

    pub fn dialect(&self) -> Dialect {
        self.ledger.dialect()
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// `<migrations-root>/<dialect>/<database>`
    pub fn migrations_directory_path(&self) -> PathBuf {
        migrations_directory(&self.migrations_root, self.dialect(), &self.database)
    }

    pub fn scanner(&self) -> Scanner {
        Scanner::new(self.migrations_directory_path())
    }

    pub async fn ensure_ledger(&mut self) -> MigrateResult<()> {
        self.ledger.ensure(self.connection.as_mut()).await
    }

    pub async fn has_table(&mut self, table: &str) -> MigrateResult<bool> {
        self.ledger.has_table(self.connection.as_mut(), table).await
    }

    async fn ledger_snapshot(&mut self) -> MigrateResult<Vec<LedgerEntry>> {
        self.ledger.ran(self.connection.as_mut()).await
    }

    /// Every migration on disk, oldest first
    pub fn list_all(&self) -> MigrateResult<Vec<String>> {
        self.scanner().list_all()
    }

    /// Ledger entries, newest id first
    pub async fn list_ran(&mut self) -> MigrateResult<Vec<LedgerEntry>> {
        self.ledger_snapshot().await
    }

    /// Migrations on disk not yet in the ledger, oldest first
    pub async fn list_pending(&mut self) -> MigrateResult<Vec<String>> {
        let all = self.list_all()?;
        let ran = self.ledger_snapshot().await?;
        Ok(listers::pending(&all, &ran))
    }

    pub async fn status(&mut self) -> MigrateResult<MigrationStatus> {
        let all = self.list_all()?;
        let ran = self.ledger_snapshot().await?;
        Ok(listers::status(&all, &ran))
    }

    /// Apply up to `limit` pending migrations, all of them when `None`
    pub async fn up(&mut self, limit: Option<usize>) -> MigrateResult<BatchReport> {
        let lock = self.acquire_lock().await?;
        let result = self.run_up(limit).await;
        self.release_lock(&lock).await;
        result
    }

    async fn run_up(&mut self, limit: Option<usize>) -> MigrateResult<BatchReport> {
        self.ensure_ledger().await?;
        let mut pending = self.list_pending().await?;
        if pending.is_empty() {
            tracing::info!("Nothing to migrate for '{}'", self.database);
            return Ok(BatchReport::new(Direction::Up));
        }

        pending.truncate(limit.unwrap_or(pending.len()));
        self.run_batch(Direction::Up, pending).await
    }

    /// Revert up to `limit` ran migrations, most recently ran first; all when `None`
    pub async fn down(&mut self, limit: Option<usize>) -> MigrateResult<BatchReport> {
        let lock = self.acquire_lock().await?;
        let result = self.run_down(limit).await;
        self.release_lock(&lock).await;
        result
    }

    async fn run_down(&mut self, limit: Option<usize>) -> MigrateResult<BatchReport> {
        self.ensure_ledger().await?;
        let ran = self.ledger_snapshot().await?;
        if ran.is_empty() {
            tracing::info!("Nothing to roll back for '{}'", self.database);
            return Ok(BatchReport::new(Direction::Down));
        }

        let mut ids: Vec<String> = listers::revert_order(&ran)
            .into_iter()
            .map(|entry| entry.migration)
            .collect();
        ids.truncate(limit.unwrap_or(ids.len()));
        self.run_batch(Direction::Down, ids).await
    }

    /// Revert every ran migration
    pub async fn reset(&mut self) -> MigrateResult<BatchReport> {
        self.down(None).await
    }

    /// Run `ids` in order. A pending cancellation request is consumed when the
    /// batch returns, so later batches on this migrator run normally.
    async fn run_batch(
        &mut self,
        direction: Direction,
        ids: Vec<String>,
    ) -> MigrateResult<BatchReport> {
        let result = self.run_ids(direction, ids).await;
        self.cancellation.reset();
        result
    }

    async fn run_ids(
        &mut self,
        direction: Direction,
        ids: Vec<String>,
    ) -> MigrateResult<BatchReport> {
        let mut report = BatchReport::new(direction);
        self.progress.begin(direction, ids.len());

        for id in ids {
            if self.cancellation.is_cancelled() {
                tracing::warn!(
                    "Cancelled before {}; {} migration(s) completed",
                    id,
                    report.count()
                );
                report.cancelled = true;
                break;
            }

            match self.run_one(direction, &id).await {
                Ok(outcome) => {
                    match outcome {
                        StepOutcome::Completed { affected_rows } => {
                            report.affected_rows += affected_rows;
                            report.completed.push(id.clone());
                        }
                        StepOutcome::Skipped => report.skipped.push(id.clone()),
                    }
                    self.progress.step(&id, &outcome);
                }
                Err(source) => {
                    self.progress.finish();
                    tracing::error!("Migration {} failed: {}", id, source);
                    return Err(MigrationError::Halted {
                        direction,
                        failed: id,
                        report,
                        source: Box::new(source),
                    });
                }
            }
        }

        self.progress.finish();
        Ok(report)
    }

    async fn run_one(&mut self, direction: Direction, id: &str) -> MigrateResult<StepOutcome> {
        let migration = self.scanner().load(id)?;
        let sql = migration.read_script(direction)?;

        if sql.trim().is_empty() {
            tracing::warn!(
                "Skipping {}: {} script is empty",
                id,
                direction
            );
            return Ok(StepOutcome::Skipped);
        }

        tracing::debug!("Running {} script of {}:\n{}", direction, id, sql);
        let affected_rows = self
            .connection
            .execute_script(&sql)
            .await
            .map_err(|e| MigrationError::ScriptFailed {
                id: id.to_string(),
                direction,
                message: match e {
                    MigrationError::Database(message) => message,
                    other => other.to_string(),
                },
            })?;

        match direction {
            Direction::Up => {
                self.ledger
                    .insert(self.connection.as_mut(), id, Utc::now().naive_utc())
                    .await?;
                tracing::info!("Migrated: {}", id);
            }
            Direction::Down => {
                self.ledger.delete(self.connection.as_mut(), id).await?;
                tracing::info!("Rolled back: {}", id);
            }
        }

        Ok(StepOutcome::Completed { affected_rows })
    }

    /// Scaffold a new migration directory with empty `up` and `down` scripts
    pub fn create(&self, name: &str) -> MigrateResult<CreatedMigration> {
        let migration = self.scanner().create(name, Utc::now().naive_utc())?;
        Ok(CreatedMigration::new(&migration, &self.project_root))
    }

    /// Id of the most recently ran migration
    pub async fn last(&mut self) -> MigrateResult<Option<String>> {
        let last = self.ledger.last(self.connection.as_mut()).await?;
        Ok(last.map(|entry| entry.migration))
    }

    /// Id of the migration after [`last`](Self::last).
    ///
    /// Fails when nothing has run yet, when the last id is not on disk, or
    /// when it is the newest migration.
    pub async fn next(&mut self) -> MigrateResult<String> {
        let all = self.list_all()?;
        let last = self
            .last()
            .await?
            .ok_or(MigrationError::NoNextMigration(None))?;
        if !all.contains(&last) {
            return Err(MigrationError::UnknownMigration(last));
        }
        listers::successor(&all, &last)
            .cloned()
            .ok_or(MigrationError::NoNextMigration(Some(last)))
    }

    /// Record `id` as ran without executing its script
    pub async fn mark_applied(&mut self, id: &str) -> MigrateResult<()> {
        let lock = self.acquire_lock().await?;
        let result = self.record_applied(id).await;
        self.release_lock(&lock).await;
        result
    }

    async fn record_applied(&mut self, id: &str) -> MigrateResult<()> {
        self.ensure_ledger().await?;
        let all = self.list_all()?;
        if !all.iter().any(|known| known == id) {
            return Err(MigrationError::UnknownMigration(id.to_string()));
        }
        let ran = self.ledger_snapshot().await?;
        if ran.iter().any(|entry| entry.migration == id) {
            return Err(MigrationError::NotPending(id.to_string()));
        }

        self.ledger
            .insert(self.connection.as_mut(), id, Utc::now().naive_utc())
            .await?;
        tracing::info!("Marked {} as applied", id);
        Ok(())
    }

    /// Remove `id` from the ledger without executing its script
    pub async fn mark_reverted(&mut self, id: &str) -> MigrateResult<()> {
        let lock = self.acquire_lock().await?;
        let result = self.record_reverted(id).await;
        self.release_lock(&lock).await;
        result
    }

    async fn record_reverted(&mut self, id: &str) -> MigrateResult<()> {
        self.ensure_ledger().await?;
        let ran = self.ledger_snapshot().await?;
        if !ran.iter().any(|entry| entry.migration == id) {
            return Err(MigrationError::NotRan(id.to_string()));
        }

        self.ledger.delete(self.connection.as_mut(), id).await?;
        tracing::info!("Marked {} as reverted", id);
        Ok(())
    }

    async fn acquire_lock(&mut self) -> MigrateResult<String> {
        let name = lock::lock_name(&self.database);
        lock::acquire(self.connection.as_mut(), &name, self.lock_timeout).await?;
        Ok(name)
    }

    async fn release_lock(&mut self, name: &str) {
        lock::release(self.connection.as_mut(), name).await;
    }

    pub async fn close(self) -> MigrateResult<()> {
        self.connection.close().await
    }
}
