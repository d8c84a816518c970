//! SQL dialects supported by the migration engine

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};

/// Database dialect enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[serde(alias = "mariadb")]
    MySql,
    #[serde(alias = "postgresql", alias = "pgsql")]
    Postgres,
    #[serde(alias = "sqlite3")]
    Sqlite,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::MySql, Dialect::Postgres, Dialect::Sqlite];

    /// Name used for the dialect directory under the migrations root
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Parameter placeholder for the 1-based parameter `index`
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Quote an identifier for this dialect
    pub fn quote_identifier(&self, identifier: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", identifier.replace('`', "``")),
            Dialect::Postgres | Dialect::Sqlite => {
                format!("\"{}\"", identifier.replace('"', "\"\""))
            }
        }
    }

    /// Default TCP port for networked dialects
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Dialect::MySql => Some(3306),
            Dialect::Postgres => Some(5432),
            Dialect::Sqlite => None,
        }
    }

    /// Whether the dialect talks to a server rather than a local file
    pub fn is_networked(&self) -> bool {
        self.default_port().is_some()
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "postgres" | "postgresql" | "pgsql" => Ok(Dialect::Postgres),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            _ => Err(format!("Unsupported database dialect: {}", s)),
        }
    }
}

static DATABASE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_$-]{1,63}$").expect("valid database name regex"));

/// Check that a database name is safe to use as a directory and in DDL
pub fn validate_database_name(name: &str) -> MigrateResult<()> {
    if DATABASE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(MigrationError::InvalidDatabaseName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_parsing() {
        assert_eq!("postgresql".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("MySQL".parse::<Dialect>().unwrap(), Dialect::MySql);
        assert_eq!("sqlite3".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_dialect_serde_aliases() {
        let dialect: Dialect = serde_yaml::from_str("mariadb").unwrap();
        assert_eq!(dialect, Dialect::MySql);
        let dialect: Dialect = serde_yaml::from_str("postgres").unwrap();
        assert_eq!(dialect, Dialect::Postgres);
    }

    #[test]
    fn test_placeholders_and_quoting() {
        assert_eq!(Dialect::Postgres.placeholder(2), "$2");
        assert_eq!(Dialect::MySql.placeholder(2), "?");
        assert_eq!(Dialect::MySql.quote_identifier("__migrations"), "`__migrations`");
        assert_eq!(Dialect::Sqlite.quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_database_name_validation() {
        assert!(validate_database_name("app_db-2").is_ok());
        assert!(validate_database_name("tenant$1").is_ok());
        assert!(validate_database_name("").is_err());
        assert!(validate_database_name("app; DROP").is_err());
        assert!(validate_database_name("../etc").is_err());
        assert!(validate_database_name(&"a".repeat(64)).is_err());
    }
}
