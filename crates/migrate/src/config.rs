//! Engine configuration
//!
//! A `migrate.yaml` file names the migrations root and the databases the
//! engine can target. Relative paths resolve against the directory holding the
//! config file, never against the process working directory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::dialect::{validate_database_name, Dialect};
use crate::migration::migrations_directory;

pub const DEFAULT_CONFIG_FILE: &str = "migrate.yaml";
pub const DEFAULT_MIGRATIONS_ROOT: &str = "database/migrations";
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Unknown database '{name}'. Configured databases: {known}")]
    UnknownDatabase { name: String, known: String },

    #[error("Configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    /// Create a missing required field error
    pub fn missing_required(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequired {
            field: field.into(),
            hint: hint.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateConfig {
    #[serde(default = "default_migrations_root")]
    pub migrations_root: PathBuf,

    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,

    #[serde(default)]
    pub databases: BTreeMap<String, DatabaseConfig>,

    /// Directory relative paths resolve against
    #[serde(skip)]
    pub project_root: PathBuf,
}

fn default_migrations_root() -> PathBuf {
    PathBuf::from(DEFAULT_MIGRATIONS_ROOT)
}

fn default_lock_timeout() -> u64 {
    DEFAULT_LOCK_TIMEOUT_SECS
}

/// Connection parameters for one named database
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub dialect: Option<Dialect>,
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub path: Option<PathBuf>,
}

/// Where a resolved database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Network {
        host: String,
        port: u16,
        user: Option<String>,
        password: Option<String>,
    },
    File { path: PathBuf },
}

/// Fully resolved settings a driver connects with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub database: String,
    pub dialect: Dialect,
    pub endpoint: Endpoint,
}

impl MigrateConfig {
    /// Empty configuration rooted at `project_root`
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            migrations_root: default_migrations_root(),
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
            databases: BTreeMap::new(),
            project_root: project_root.into(),
        }
    }

    /// Add or replace a database entry
    pub fn with_database(mut self, name: impl Into<String>, database: DatabaseConfig) -> Self {
        self.databases.insert(name.into(), database);
        self
    }

    /// Load from a YAML file, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.project_root = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        config.apply_env()?;
        config.validate()?;
        tracing::debug!(
            "Loaded migration config from {} ({} database(s))",
            path.display(),
            config.databases.len()
        );
        Ok(config)
    }

    /// Parse YAML content without touching the environment
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: MigrateConfig = serde_yaml::from_str(content)?;
        config.project_root = PathBuf::from(".");
        Ok(config)
    }

    /// Apply `ELIF_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("ELIF_MIGRATIONS_ROOT") {
            self.migrations_root = PathBuf::from(root);
        }

        for (name, database) in self.databases.iter_mut() {
            let prefix = format!("ELIF_DB_{}", env_key(name));

            if let Some(host) = lookup(&format!("{}_HOST", prefix)) {
                database.host = Some(host);
            }
            if let Some(port) = lookup(&format!("{}_PORT", prefix)) {
                let key = format!("{}_PORT", prefix);
                database.port = Some(port.parse().map_err(|_| {
                    ConfigError::invalid_value(key, port.clone(), "port number (1-65535)")
                })?);
            }
            if let Some(user) = lookup(&format!("{}_USER", prefix)) {
                database.user = Some(user);
            }
            if let Some(password) = lookup(&format!("{}_PASSWORD", prefix)) {
                database.password = Some(password);
            }
            if let Some(path) = lookup(&format!("{}_PATH", prefix)) {
                database.path = Some(PathBuf::from(path));
            }
        }

        Ok(())
    }

    /// Validate every configured database
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.migrations_root.as_os_str().is_empty() {
            return Err(ConfigError::missing_required(
                "migrations_root",
                "Set migrations_root or ELIF_MIGRATIONS_ROOT",
            ));
        }
        if self.lock_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "lock_timeout_secs",
                "0",
                "a positive number of seconds",
            ));
        }
        for name in self.databases.keys() {
            self.database(name)?;
        }
        Ok(())
    }

    /// Absolute-or-project-relative migrations root
    pub fn migrations_root(&self) -> PathBuf {
        self.project_root.join(&self.migrations_root)
    }

    /// Migrations directory of database `name`, resolved without connecting
    pub fn migrations_directory(&self, name: &str) -> Result<PathBuf, ConfigError> {
        let settings = self.database(name)?;
        Ok(migrations_directory(
            &self.migrations_root(),
            settings.dialect,
            &settings.database,
        ))
    }

    /// Configured database names
    pub fn database_names(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }

    /// Resolve connection settings for database `name`
    pub fn database(&self, name: &str) -> Result<ConnectionSettings, ConfigError> {
        let database = self
            .databases
            .get(name)
            .ok_or_else(|| ConfigError::UnknownDatabase {
                name: name.to_string(),
                known: if self.databases.is_empty() {
                    "(none)".to_string()
                } else {
                    self.databases.keys().cloned().collect::<Vec<_>>().join(", ")
                },
            })?;

        if validate_database_name(name).is_err() {
            return Err(ConfigError::invalid_value(
                format!("databases.{}", name),
                name,
                "letters, digits, '_', '$' or '-' (at most 63 characters)",
            ));
        }

        database.resolve(name, &self.project_root)
    }
}

impl DatabaseConfig {
    pub fn postgres(host: impl Into<String>) -> Self {
        Self {
            dialect: Some(Dialect::Postgres),
            host: Some(host.into()),
            ..Default::default()
        }
    }

    pub fn mysql(host: impl Into<String>) -> Self {
        Self {
            dialect: Some(Dialect::MySql),
            host: Some(host.into()),
            ..Default::default()
        }
    }

    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            dialect: Some(Dialect::Sqlite),
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Resolve into connection settings; explicit fields win over the URL
    pub fn resolve(&self, name: &str, project_root: &Path) -> Result<ConnectionSettings, ConfigError> {
        let field = |suffix: &str| format!("databases.{}.{}", name, suffix);
        let (url_dialect, from_url) = match &self.url {
            Some(url) => {
                let (dialect, parts) = parse_database_url(url, &field("url"))?;
                (Some(dialect), Some(parts))
            }
            None => (None, None),
        };

        let dialect = self
            .dialect
            .or(url_dialect)
            .ok_or_else(|| {
                ConfigError::missing_required(field("dialect"), "Use one of: mysql, postgres, sqlite")
            })?;

        if let Some(url_dialect) = url_dialect {
            if url_dialect != dialect {
                return Err(ConfigError::invalid_value(
                    field("url"),
                    url_dialect.to_string(),
                    format!("a {} URL", dialect),
                ));
            }
        }

        let endpoint = if dialect.is_networked() {
            let url = from_url.unwrap_or_default();
            let host = self.host.clone().or(url.host).ok_or_else(|| {
                ConfigError::missing_required(
                    field("host"),
                    format!("Set host or ELIF_DB_{}_HOST", env_key(name)),
                )
            })?;
            Endpoint::Network {
                host,
                port: self
                    .port
                    .or(url.port)
                    .or_else(|| dialect.default_port())
                    .unwrap_or_default(),
                user: self.user.clone().or(url.user),
                password: self.password.clone().or(url.password),
            }
        } else {
            let path = self
                .path
                .clone()
                .or_else(|| from_url.and_then(|u| u.path))
                .ok_or_else(|| {
                    ConfigError::missing_required(
                        field("path"),
                        format!("Set path or ELIF_DB_{}_PATH", env_key(name)),
                    )
                })?;
            Endpoint::File {
                path: project_root.join(path),
            }
        };

        Ok(ConnectionSettings {
            database: name.to_string(),
            dialect,
            endpoint,
        })
    }
}

#[derive(Debug, Default)]
struct UrlParts {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    path: Option<PathBuf>,
}

fn parse_database_url(raw: &str, field: &str) -> Result<(Dialect, UrlParts), ConfigError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ConfigError::invalid_value(field, raw, format!("a database URL ({})", e)))?;

    let dialect: Dialect = parsed
        .scheme()
        .parse()
        .map_err(|_| ConfigError::invalid_value(field, parsed.scheme(), "mysql://, postgres:// or sqlite://"))?;

    if dialect == Dialect::Sqlite {
        // sqlite://relative/file.db keeps the host as the first path segment
        let mut path = String::new();
        if let Some(host) = parsed.host_str() {
            path.push_str(host);
        }
        path.push_str(parsed.path());
        return Ok((
            dialect,
            UrlParts {
                path: Some(PathBuf::from(path)),
                ..Default::default()
            },
        ));
    }

    // Url keeps userinfo percent-encoded; drivers need the literal credentials
    let decode = |part: &str, value: &str| {
        urlencoding::decode(value)
            .map(|decoded| decoded.into_owned())
            .map_err(|_| ConfigError::invalid_value(field, format!("<{}>", part), "UTF-8 after percent-decoding"))
    };

    let user = match parsed.username() {
        "" => None,
        encoded => Some(decode("user", encoded)?),
    };
    let password = parsed
        .password()
        .map(|encoded| decode("password", encoded))
        .transpose()?;

    Ok((
        dialect,
        UrlParts {
            host: parsed.host_str().map(str::to_string),
            port: parsed.port(),
            user,
            password,
            path: None,
        },
    ))
}

fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
migrations_root: db/migrations
lock_timeout_secs: 10
databases:
  app:
    dialect: postgres
    host: localhost
    user: app
    password: secret
  logs:
    dialect: mysql
    host: 10.0.0.5
    port: 3307
  cache:
    dialect: sqlite
    path: var/cache.sqlite
"#;

    #[test]
    fn test_parse_yaml() {
        let config = MigrateConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.migrations_root, PathBuf::from("db/migrations"));
        assert_eq!(config.lock_timeout_secs, 10);
        assert_eq!(config.database_names().collect::<Vec<_>>(), vec!["app", "cache", "logs"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_applied() {
        let config = MigrateConfig::from_yaml("databases: {}").unwrap();
        assert_eq!(config.migrations_root, PathBuf::from(DEFAULT_MIGRATIONS_ROOT));
        assert_eq!(config.lock_timeout_secs, DEFAULT_LOCK_TIMEOUT_SECS);
    }

    #[test]
    fn test_resolve_network_default_port() {
        let config = MigrateConfig::from_yaml(SAMPLE).unwrap();
        let settings = config.database("app").unwrap();
        assert_eq!(settings.dialect, Dialect::Postgres);
        assert_eq!(
            settings.endpoint,
            Endpoint::Network {
                host: "localhost".into(),
                port: 5432,
                user: Some("app".into()),
                password: Some("secret".into()),
            }
        );

        let logs = config.database("logs").unwrap();
        match logs.endpoint {
            Endpoint::Network { port, .. } => assert_eq!(port, 3307),
            other => panic!("unexpected endpoint {:?}", other),
        }
    }

    #[test]
    fn test_resolve_sqlite_relative_to_project_root() {
        let mut config = MigrateConfig::from_yaml(SAMPLE).unwrap();
        config.project_root = PathBuf::from("/srv/app");
        let settings = config.database("cache").unwrap();
        assert_eq!(
            settings.endpoint,
            Endpoint::File {
                path: PathBuf::from("/srv/app/var/cache.sqlite")
            }
        );
        assert_eq!(config.migrations_root(), PathBuf::from("/srv/app/db/migrations"));
        assert_eq!(
            config.migrations_directory("cache").unwrap(),
            PathBuf::from("/srv/app/db/migrations/sqlite/cache")
        );
    }

    #[test]
    fn test_unknown_database() {
        let config = MigrateConfig::from_yaml(SAMPLE).unwrap();
        let err = config.database("billing").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDatabase { .. }));
        assert!(err.to_string().contains("app, cache, logs"));
    }

    #[test]
    fn test_missing_host_is_reported() {
        let config = MigrateConfig::new(".").with_database(
            "app",
            DatabaseConfig {
                dialect: Some(Dialect::MySql),
                ..Default::default()
            },
        );
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref field, .. } if field == "databases.app.host"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = MigrateConfig::from_yaml(SAMPLE).unwrap();
        let vars: HashMap<&str, &str> = [
            ("ELIF_MIGRATIONS_ROOT", "/opt/migrations"),
            ("ELIF_DB_APP_HOST", "db.internal"),
            ("ELIF_DB_APP_PORT", "6432"),
            ("ELIF_DB_CACHE_PATH", "/tmp/cache.db"),
        ]
        .into_iter()
        .collect();

        config
            .apply_env_from(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.migrations_root, PathBuf::from("/opt/migrations"));
        match config.database("app").unwrap().endpoint {
            Endpoint::Network { host, port, .. } => {
                assert_eq!(host, "db.internal");
                assert_eq!(port, 6432);
            }
            other => panic!("unexpected endpoint {:?}", other),
        }
        assert_eq!(
            config.database("cache").unwrap().endpoint,
            Endpoint::File {
                path: PathBuf::from("/tmp/cache.db")
            }
        );
    }

    #[test]
    fn test_env_invalid_port() {
        let mut config = MigrateConfig::from_yaml(SAMPLE).unwrap();
        let err = config
            .apply_env_from(|key| (key == "ELIF_DB_APP_PORT").then(|| "abc".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_url_configuration() {
        let config = MigrateConfig::new(".").with_database(
            "app",
            DatabaseConfig {
                url: Some("postgres://admin:pw@db.example.com:5433/ignored".into()),
                ..Default::default()
            },
        );
        let settings = config.database("app").unwrap();
        assert_eq!(settings.dialect, Dialect::Postgres);
        assert_eq!(
            settings.endpoint,
            Endpoint::Network {
                host: "db.example.com".into(),
                port: 5433,
                user: Some("admin".into()),
                password: Some("pw".into()),
            }
        );
    }

    #[test]
    fn test_url_credentials_are_decoded() {
        let config = MigrateConfig::new(".").with_database(
            "app",
            DatabaseConfig {
                url: Some("postgres://ad%20min:p%40ss%3Aw%2Frd%25@db:5432/app".into()),
                ..Default::default()
            },
        );
        match config.database("app").unwrap().endpoint {
            Endpoint::Network { user, password, .. } => {
                assert_eq!(user.as_deref(), Some("ad min"));
                assert_eq!(password.as_deref(), Some("p@ss:w/rd%"));
            }
            other => panic!("unexpected endpoint {:?}", other),
        }
    }

    #[test]
    fn test_url_dialect_mismatch() {
        let config = MigrateConfig::new(".").with_database(
            "app",
            DatabaseConfig {
                dialect: Some(Dialect::MySql),
                url: Some("postgres://localhost/app".into()),
                ..Default::default()
            },
        );
        assert!(matches!(
            config.database("app"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migrate.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = MigrateConfig::load(&path).unwrap();
        assert_eq!(config.project_root, dir.path());

        let missing = MigrateConfig::load(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(missing, ConfigError::FileNotFound(_)));
    }
}
