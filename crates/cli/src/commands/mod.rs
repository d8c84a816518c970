pub mod db;
pub mod migrate;
pub mod repair;

use anyhow::{bail, Context as _};
use elif_migrate::{Cancellation, Driver, MigrateConfig, Migrator};
use std::path::Path;

use crate::progress::BarProgress;

/// Loaded configuration plus the database every command targets
pub struct Context {
    pub config: MigrateConfig,
    pub database: String,
}

impl Context {
    pub fn load(path: &Path, database: Option<&str>) -> anyhow::Result<Self> {
        let config = MigrateConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        let database = select_database(&config, database)?;
        Ok(Self { config, database })
    }

    pub fn driver(&self) -> anyhow::Result<Driver> {
        let settings = self.config.database(&self.database)?;
        Ok(Driver::new(&settings)?)
    }

    /// Connected migrator with a progress bar and Ctrl-C wired to cancellation
    pub async fn migrator(&self) -> anyhow::Result<Migrator> {
        let migrator = Migrator::connect(&self.config, &self.database)
            .await
            .with_context(|| format!("Failed to open database '{}'", self.database))?;

        let cancellation = Cancellation::new();
        let handle = cancellation.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; stopping after the current migration");
                handle.cancel();
            }
        });

        Ok(migrator
            .with_progress(Box::new(BarProgress::new()))
            .with_cancellation(cancellation))
    }
}

fn select_database(config: &MigrateConfig, requested: Option<&str>) -> anyhow::Result<String> {
    if let Some(name) = requested {
        return Ok(name.to_string());
    }

    let names: Vec<&str> = config.database_names().collect();
    match names.as_slice() {
        [only] => Ok(only.to_string()),
        [] => bail!("No databases configured; add one under `databases:`"),
        _ => bail!(
            "Several databases configured ({}); choose one with --database",
            names.join(", ")
        ),
    }
}
