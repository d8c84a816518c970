//! Migration units on disk
//!
//! A migration is a directory named `<YYYYMMDDHHMMSS>_<slug>` holding two
//! scripts, `up` and `down`.

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::dialect::Dialect;
use crate::error::{MigrateResult, MigrationError};

/// Timestamp format of the id prefix
pub const ID_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

static MIGRATION_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{14}_.+$").expect("valid migration id regex"));

static SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_-]+$").expect("valid slug regex"));

/// Which script of a migration to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    /// File name of the script for this direction
    pub fn script_name(&self) -> &'static str {
        self.as_str()
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A migration directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub id: String,
    pub directory: PathBuf,
}

impl Migration {
    pub fn new(id: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            directory: directory.into(),
        }
    }

    pub fn script_path(&self, direction: Direction) -> PathBuf {
        self.directory.join(direction.script_name())
    }

    /// Read one script; a missing file is a `MissingScript` error
    pub fn read_script(&self, direction: Direction) -> MigrateResult<String> {
        let path = self.script_path(direction);
        match std::fs::read_to_string(&path) {
            Ok(sql) => Ok(sql),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(MigrationError::MissingScript {
                    id: self.id.clone(),
                    direction,
                    path,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Whether a directory name looks like a migration id
pub fn is_migration_id(name: &str) -> bool {
    MIGRATION_ID.is_match(name)
}

/// Turn a human name into the slug part of a migration id
pub fn slugify(name: &str) -> MigrateResult<String> {
    let slug = name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase();

    if SLUG.is_match(&slug) {
        Ok(slug)
    } else {
        Err(MigrationError::InvalidName(name.to_string()))
    }
}

/// Build an id from a timestamp and a name
pub fn migration_id(at: NaiveDateTime, name: &str) -> MigrateResult<String> {
    Ok(format!("{}_{}", at.format(ID_TIMESTAMP_FORMAT), slugify(name)?))
}

/// `<migrations-root>/<dialect>/<database>`
pub fn migrations_directory(migrations_root: &Path, dialect: Dialect, database: &str) -> PathBuf {
    migrations_root.join(dialect.as_str()).join(database)
}

/// Directory of migration `id` under `root`
pub fn migration_dir(root: &Path, id: &str) -> PathBuf {
    root.join(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_is_migration_id() {
        assert!(is_migration_id("20240101000000_create_users"));
        assert!(!is_migration_id("2024010100000_short"));
        assert!(!is_migration_id("20240101000000_"));
        assert!(!is_migration_id("README"));
        assert!(!is_migration_id(".20240101000000_hidden"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Add Users").unwrap(), "add_users");
        assert_eq!(slugify("  add   users  table ").unwrap(), "add_users_table");
        assert_eq!(slugify("add-index").unwrap(), "add-index");
        assert!(slugify("").is_err());
        assert!(slugify("   ").is_err());
        assert!(slugify("../escape").is_err());
        assert!(slugify("a/b").is_err());
        assert!(slugify("a\\b").is_err());
    }

    #[test]
    fn test_migration_id_and_script_paths() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 7, 9)
            .unwrap();
        let id = migration_id(at, "add users").unwrap();
        assert_eq!(id, "20240305140709_add_users");

        let migration = Migration::new(&id, migration_dir(Path::new("/m"), &id));
        assert_eq!(
            migration.script_path(Direction::Down),
            PathBuf::from("/m/20240305140709_add_users/down")
        );
    }

    #[test]
    fn test_read_script_missing() {
        let dir = tempfile::tempdir().unwrap();
        let migration = Migration::new("20240101000000_a", dir.path());
        std::fs::write(dir.path().join("up"), "CREATE TABLE a (id INT);").unwrap();

        assert_eq!(
            migration.read_script(Direction::Up).unwrap(),
            "CREATE TABLE a (id INT);"
        );
        match migration.read_script(Direction::Down) {
            Err(MigrationError::MissingScript { id, direction, .. }) => {
                assert_eq!(id, "20240101000000_a");
                assert_eq!(direction, Direction::Down);
            }
            other => panic!("expected MissingScript, got {:?}", other),
        }
    }
}
