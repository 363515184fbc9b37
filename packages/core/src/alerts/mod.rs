//! Alert composition.
//!
//! Turns a lag reading (or a failed check) into a subject and body ready for
//! any notification channel, with the tail of the database's error log
//! appended for context.

pub mod log_tail;

use std::path::Path;

use crate::config::{DatabaseConfig, GlobalSettings};
use crate::error::CheckError;
use crate::lag::LagReading;

const RULE: &str = "======================================================";

/// A composed notification. Lives only for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct AlertComposer {
    tail_lines: usize,
}

impl AlertComposer {
    pub fn new(tail_lines: usize) -> Self {
        Self { tail_lines }
    }

    pub fn from_settings(settings: &GlobalSettings) -> Self {
        Self::new(settings.log_tail_lines)
    }

    /// Alert for a replica whose lag exceeds the allowed threshold.
    pub fn compose(
        &self,
        name: &str,
        db: &DatabaseConfig,
        settings: &GlobalSettings,
        reading: &LagReading,
    ) -> AlertMessage {
        let mut body = format!(
            "Replication on {}:{}/{} is lagging by {} seconds, which is more than the allowed limit of {} seconds.\n\
             Please check the replication server immediately.\n",
            db.host,
            db.port,
            db.database,
            reading.lag.as_secs(),
            settings.allowed_lag.as_secs(),
        );

        if let Some(error) = &reading.replication_error {
            body.push_str(&format!("\nLast replication error: {}\n", error));
        }

        body.push('\n');
        body.push_str(&self.error_log_section(db.error_log.as_deref()));

        AlertMessage {
            subject: format!(
                "Replication lag on {} for {}",
                settings.server_name, name
            ),
            body,
        }
    }

    /// Escalation for a check that could not complete.
    pub fn compose_failure(
        &self,
        name: &str,
        db: Option<&DatabaseConfig>,
        settings: &GlobalSettings,
        error: &CheckError,
    ) -> AlertMessage {
        let mut body = format!(
            "The replication check for {} could not complete.\n\nError  ==>  {}\n",
            name, error
        );

        if let Some(db) = db {
            body.push('\n');
            body.push_str(&self.error_log_section(db.error_log.as_deref()));
        }

        AlertMessage {
            subject: format!(
                "Replication check failed on {} for {}",
                settings.server_name, name
            ),
            body,
        }
    }

    fn error_log_section(&self, path: Option<&Path>) -> String {
        let Some(path) = path else {
            return "No MySQL error log configured for this database.\n".to_string();
        };

        let tail = match log_tail::tail_lines(path, self.tail_lines) {
            Ok(lines) => lines.join("\n"),
            Err(err) => {
                tracing::warn!("Cannot read error log {}: {}", path.display(), err);
                format!("(error log could not be read: {})", err)
            }
        };

        format!(
            "MYSQL ERROR OUTPUT (last {} lines of {})\n{}\n{}\n",
            self.tail_lines,
            path.display(),
            RULE,
            tail
        )
    }
}
