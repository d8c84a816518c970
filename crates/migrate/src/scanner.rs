//! Migration directory scanner

use chrono::NaiveDateTime;
use std::path::PathBuf;

use crate::error::{MigrateResult, MigrationError};
use crate::migration::{is_migration_id, migration_dir, migration_id, Direction, Migration};

/// Discovers migrations under one dialect- and database-scoped directory.
///
/// Every call reads the filesystem again; nothing is cached.
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// All migration ids, ascending
    pub fn list_all(&self) -> MigrateResult<Vec<String>> {
        if !self.root.is_dir() {
            return Err(MigrationError::MissingDirectory(self.root.clone()));
        }

        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    tracing::warn!("Skipping non UTF-8 entry {:?} in {}", raw, self.root.display());
                    continue;
                }
            };

            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }

            if !is_migration_id(&name) {
                tracing::warn!(
                    "Skipping '{}' in {}: expected <YYYYMMDDHHMMSS>_<name>",
                    name,
                    self.root.display()
                );
                continue;
            }

            ids.push(name);
        }

        ids.sort();
        Ok(ids)
    }

    /// Resolve a migration by id
    pub fn load(&self, id: &str) -> MigrateResult<Migration> {
        let directory = migration_dir(&self.root, id);
        if !is_migration_id(id) || !directory.is_dir() {
            return Err(MigrationError::UnknownMigration(id.to_string()));
        }
        Ok(Migration::new(id, directory))
    }

    /// Create `<root>/<id>` with empty `up` and `down` scripts.
    ///
    /// The root is created when missing; an existing migration directory is
    /// an `AlreadyExists` error.
    pub fn create(&self, name: &str, at: NaiveDateTime) -> MigrateResult<Migration> {
        let id = migration_id(at, name)?;
        let directory = migration_dir(&self.root, &id);

        std::fs::create_dir_all(&self.root)?;
        match std::fs::create_dir(&directory) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(MigrationError::AlreadyExists(directory));
            }
            Err(e) => return Err(e.into()),
        }

        let migration = Migration::new(id, directory);
        std::fs::write(migration.script_path(Direction::Up), "")?;
        std::fs::write(migration.script_path(Direction::Down), "")?;

        tracing::info!("Created migration {}", migration.directory.display());
        Ok(migration)
    }
}
