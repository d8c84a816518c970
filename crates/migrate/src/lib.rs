//! # elif-migrate: SQL migration engine for elif.rs
//!
//! Tracks, applies and reverts ordered pairs of `up`/`down` SQL scripts
//! against MySQL, PostgreSQL or SQLite databases.
//!
//! Migrations live on disk as directories named `<YYYYMMDDHHMMSS>_<slug>`
//! under `<migrations-root>/<dialect>/<database>/`, each holding an `up` and a
//! `down` script. Applied migrations are recorded in the `__migrations`
//! ledger table inside the target database.
//!
//! ```rust,no_run
//! use elif_migrate::{MigrateConfig, Migrator};
//!
//! # async fn run() -> elif_migrate::MigrateResult<()> {
//! let config = MigrateConfig::load("migrate.yaml")?;
//! let mut migrator = Migrator::connect(&config, "app").await?;
//!
//! let report = migrator.up(None).await?;
//! println!("applied {} migration(s)", report.count());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod ledger;
pub mod listers;
pub mod lock;
pub mod migration;
pub mod migrator;
pub mod progress;
pub mod scanner;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, ConnectionSettings, DatabaseConfig, Endpoint, MigrateConfig};
pub use connection::{Connection, SqlParam};
pub use dialect::Dialect;
pub use drivers::Driver;
pub use error::{MigrateResult, MigrationError};
pub use ledger::{Ledger, LedgerEntry, LEDGER_TABLE};
pub use listers::{MigrationStatus, StatusEntry};
pub use migration::{Direction, Migration};
pub use migrator::{BatchReport, CreatedMigration, Migrator};
pub use progress::{Cancellation, NoProgress, Progress, StepOutcome};
pub use scanner::Scanner;
