//! Monitor configuration.
//!
//! The YAML document is loaded once per run into an immutable
//! [`GlobalSettings`] that is handed to the checker at construction.
//! Structural problems (unreadable file, bad YAML, missing globals) are fatal.
//! A bad database entry is not: it is kept as an invalid
//! [`MonitoredDatabase`] and reported when its turn in the batch comes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{CheckError, ConfigError};
use crate::lag::LagStrategy;

/// Default number of error-log lines attached to an alert.
pub const DEFAULT_LOG_TAIL_LINES: usize = 20;

/// Default MySQL port.
pub const DEFAULT_PORT: u16 = 3306;

#[derive(Debug, Clone)]
pub struct GlobalSettings {
    pub allowed_lag: Duration,
    pub server_name: String,
    pub notifications: NotificationSettings,
    pub databases: Vec<MonitoredDatabase>,
    pub log_tail_lines: usize,
    pub check_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationSettings {
    pub email: Option<EmailConfig>,
    pub sms: Option<SmsConfig>,
}

impl NotificationSettings {
    /// True when no channel is configured at all. Lag is then logged but
    /// never escalated.
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.sms.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub sender: String,
    #[serde(
        default,
        alias = "recepients",
        deserialize_with = "one_or_many"
    )]
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SmsConfig {
    pub sender: String,
    #[serde(alias = "recepient", deserialize_with = "string_or_number")]
    pub recipient: String,
    pub sms_gateway_domain: String,
}

/// One entry of the `databases` mapping, in document order.
#[derive(Debug, Clone)]
pub struct MonitoredDatabase {
    pub name: String,
    pub config: Result<DatabaseConfig, CheckError>,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub strategy: LagStrategy,
    pub error_log: Option<PathBuf>,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("strategy", &self.strategy)
            .field("error_log", &self.error_log)
            .finish()
    }
}

#[derive(Deserialize)]
struct RawSettings {
    allowed_lag: u64,
    server_name: String,
    #[serde(default)]
    email_configs: Option<EmailConfig>,
    #[serde(default)]
    sms_configs: Option<SmsConfig>,
    databases: serde_yaml::Mapping,
    #[serde(default = "default_log_tail_lines")]
    log_tail_lines: usize,
    #[serde(default)]
    check_timeout: Option<u64>,
}

#[derive(Deserialize)]
struct RawDatabase {
    host: String,
    user: String,
    #[serde(default)]
    password: String,
    database: String,
    #[serde(default = "default_port")]
    port: u16,
    strategy: Option<String>,
    heartbeat_table: Option<String>,
    heartbeat_column: Option<String>,
    heartbeat_timezone: Option<String>,
    error_log: Option<PathBuf>,
}

fn default_log_tail_lines() -> usize {
    DEFAULT_LOG_TAIL_LINES
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl GlobalSettings {
    /// Read and parse the YAML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let raw: RawSettings = serde_yaml::from_str(yaml)?;

        if raw.server_name.trim().is_empty() {
            return Err(ConfigError::invalid("server_name cannot be empty"));
        }
        if raw.sms_configs.is_some() && raw.email_configs.is_none() {
            return Err(ConfigError::invalid(
                "sms_configs requires email_configs: SMS is delivered through the SMTP endpoint",
            ));
        }
        if raw.check_timeout == Some(0) {
            return Err(ConfigError::invalid("check_timeout must be at least 1 second"));
        }

        let mut databases = Vec::with_capacity(raw.databases.len());
        for (key, value) in raw.databases {
            let name = database_name(&key)?;
            let config = parse_database(&name, value);
            databases.push(MonitoredDatabase { name, config });
        }

        Ok(Self {
            allowed_lag: Duration::from_secs(raw.allowed_lag),
            server_name: raw.server_name,
            notifications: NotificationSettings {
                email: raw.email_configs,
                sms: raw.sms_configs,
            },
            databases,
            log_tail_lines: raw.log_tail_lines,
            check_timeout: raw.check_timeout.map(Duration::from_secs),
        })
    }
}

fn database_name(key: &serde_yaml::Value) -> Result<String, ConfigError> {
    match key {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(ConfigError::invalid(format!(
            "database names must be strings, got {:?}",
            other
        ))),
    }
}

fn parse_database(name: &str, value: serde_yaml::Value) -> Result<DatabaseConfig, CheckError> {
    let raw: RawDatabase = serde_yaml::from_value(value)
        .map_err(|err| CheckError::config(format!("database '{}': {}", name, err)))?;

    let strategy = LagStrategy::from_config(
        raw.strategy.as_deref(),
        raw.heartbeat_table.as_deref(),
        raw.heartbeat_column.as_deref(),
        raw.heartbeat_timezone.as_deref(),
    )
    .map_err(|err| match err {
        CheckError::Config { message } => {
            CheckError::config(format!("database '{}': {}", name, message))
        }
        other => other,
    })?;

    Ok(DatabaseConfig {
        host: raw.host,
        port: raw.port,
        user: raw.user,
        password: raw.password,
        database: raw.database,
        strategy,
        error_log: raw.error_log,
    })
}

/// Accepts either a single address or a list of addresses.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(address) => vec![address],
        OneOrMany::Many(addresses) => addresses,
    })
}

/// Phone numbers are often written unquoted in YAML.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(u64),
    }

    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    })
}
