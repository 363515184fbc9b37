//! Error taxonomy for the replication monitor.
//!
//! Three layers fail independently:
//! - [`ConfigError`] aborts the whole run before any database is checked.
//! - [`CheckError`] is scoped to a single database check and never escapes
//!   the checker loop.
//! - [`DeliveryError`] is scoped to a single notification channel.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Fatal configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Failure of one database check.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CheckError {
    #[error("config error: {message}")]
    Config { message: String },

    #[error("connection error: {message}")]
    Connection { message: String },

    #[error("query error: {message}")]
    Query { message: String },

    #[error("parse error: {message}")]
    Parse { message: String },

    /// The server reports a NULL seconds-behind value. This is never
    /// treated as zero lag.
    #[error("replication is not running (seconds behind source is NULL)")]
    ReplicationStopped,

    #[error("{stage} timed out after {}s", .after.as_secs())]
    Timeout { stage: &'static str, after: Duration },
}

impl CheckError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Short machine-friendly label, used in the batch summary.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckError::Config { .. } => "config",
            CheckError::Connection { .. } => "connection",
            CheckError::Query { .. } => "query",
            CheckError::Parse { .. } => "parse",
            CheckError::ReplicationStopped => "replication_stopped",
            CheckError::Timeout { .. } => "timeout",
        }
    }
}

/// Failure to hand a message to a notification channel's transport.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("invalid address {address}: {message}")]
    Address { address: String, message: String },

    #[error("cannot build message: {message}")]
    Message { message: String },

    #[error("smtp transport failed: {message}")]
    Transport { message: String },
}

impl DeliveryError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}
