//! Configuration file handling for protomig.
//!
//! Looks for `.config/protomig.toml` in the current directory or any parent
//! directory. The directory holding `.config/` is the project root: relative
//! paths in the file resolve against it.

use camino::{Utf8Path, Utf8PathBuf};
use protomig::DEFAULT_SCHEMA;
use serde::Deserialize;

const CONFIG_FILE: &str = ".config/protomig.toml";

/// The configuration file as written.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Treat unparseable declaration lines as errors.
    #[serde(default)]
    pub strict: bool,
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub name: String,
    pub schema: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    #[serde(default = "default_proto_dir")]
    pub proto_dir: String,
    #[serde(default = "default_sql_dir")]
    pub sql_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            proto_dir: default_proto_dir(),
            sql_dir: default_sql_dir(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_proto_dir() -> String {
    "proto".to_string()
}

fn default_sql_dir() -> String {
    "sql".to_string()
}

/// Everything a run needs, with paths made absolute.
#[derive(Debug, Clone)]
pub struct Settings {
    pub root: Utf8PathBuf,
    /// libpq connection string or URL.
    pub database_url: String,
    pub schema: String,
    pub proto_dir: Utf8PathBuf,
    pub sql_dir: Utf8PathBuf,
    pub strict: bool,
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no .config/protomig.toml found in current directory or any parent")]
    NotFound,

    #[error("failed to read {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Load configuration from `explicit`, or from `.config/protomig.toml`
/// searching up from the current directory.
///
/// `DATABASE_URL` in the environment takes precedence over `[database]`.
pub fn load(explicit: Option<&Utf8Path>) -> Result<Settings, ConfigError> {
    let config_path = match explicit {
        Some(path) => path.to_owned(),
        None => {
            let cwd = std::env::current_dir()
                .map_err(|source| ConfigError::Io {
                    path: Utf8PathBuf::from("."),
                    source,
                })
                .and_then(|cwd| {
                    Utf8PathBuf::try_from(cwd).map_err(|e| {
                        ConfigError::Invalid(format!("current directory is not UTF-8: {e}"))
                    })
                })?;
            find_config_file(&cwd)?
        }
    };

    let config = read_config(&config_path)?;
    let root = project_root(&config_path);
    let database_url = std::env::var("DATABASE_URL").ok();
    resolve(config, &root, database_url)
}

/// Find `.config/protomig.toml` by searching up the directory tree.
pub fn find_config_file(start: &Utf8Path) -> Result<Utf8PathBuf, ConfigError> {
    let mut current = Some(start);

    while let Some(dir) = current {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.is_file() {
            return Ok(config_path);
        }
        current = dir.parent();
    }

    Err(ConfigError::NotFound)
}

pub fn read_config(path: &Utf8Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}

/// The directory relative paths resolve against.
fn project_root(config_path: &Utf8Path) -> Utf8PathBuf {
    let dir = config_path.parent().unwrap_or(Utf8Path::new("."));
    match dir.file_name() {
        Some(".config") => dir.parent().unwrap_or(Utf8Path::new(".")).to_owned(),
        _ => dir.to_owned(),
    }
}

/// Combine the file with the environment.
pub fn resolve(
    config: Config,
    root: &Utf8Path,
    database_url: Option<String>,
) -> Result<Settings, ConfigError> {
    let schema = config
        .database
        .as_ref()
        .and_then(|db| db.schema.clone())
        .unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
    if schema.is_empty() {
        return Err(ConfigError::Invalid("database.schema is empty".to_string()));
    }

    let database_url = match (database_url.filter(|url| !url.is_empty()), &config.database) {
        (Some(url), _) => url,
        (None, Some(db)) => connection_string(db),
        (None, None) => {
            return Err(ConfigError::Invalid(
                "no [database] section and DATABASE_URL is not set".to_string(),
            ));
        }
    };

    Ok(Settings {
        root: root.to_owned(),
        database_url,
        schema,
        proto_dir: root.join(&config.paths.proto_dir),
        sql_dir: root.join(&config.paths.sql_dir),
        strict: config.strict,
    })
}

/// Key/value connection string for the `[database]` section.
fn connection_string(db: &DatabaseConfig) -> String {
    let mut parts = vec![
        format!("host={}", conn_value(&db.host)),
        format!("port={}", db.port),
        format!("user={}", conn_value(&db.user)),
        format!("dbname={}", conn_value(&db.name)),
    ];
    if let Some(password) = &db.password {
        parts.push(format!("password={}", conn_value(password)));
    }
    parts.join(" ")
}

fn conn_value(value: &str) -> String {
    if !value.is_empty() && !value.contains([' ', '\'', '\\', '=']) {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

/// Mask the password in a connection URL or key/value string for display.
pub fn mask_password(conn: &str) -> String {
    if let Some(start) = conn.find("://") {
        let rest = &conn[start + 3..];
        if let Some(at) = rest.rfind('@') {
            let credentials = &rest[..at];
            if let Some(colon) = credentials.find(':') {
                return format!(
                    "{}{}:***{}",
                    &conn[..start + 3],
                    &credentials[..colon],
                    &rest[at..]
                );
            }
        }
        return conn.to_string();
    }

    let mut masked = Vec::new();
    let mut in_password = false;
    for part in conn.split(' ') {
        if in_password {
            // Continuation of a quoted password containing spaces.
            if part.ends_with('\'') && !part.ends_with("\\'") {
                in_password = false;
            }
            continue;
        }
        match part.strip_prefix("password=") {
            Some(value) => {
                in_password = value.starts_with('\'') && (value.len() == 1 || !value.ends_with('\''));
                masked.push("password=***");
            }
            None => masked.push(part),
        }
    }
    masked.join(" ")
}
