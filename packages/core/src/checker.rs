//! Replication check orchestration.
//!
//! For each configured database, in order:
//! 1. Connect
//! 2. Measure lag with the configured [`LagStrategy`](crate::lag::LagStrategy)
//! 3. Compare against `allowed_lag`
//! 4. Alert through every configured channel when the lag is exceeded
//! 5. Close the connection, whatever happened in 2-4
//!
//! A failure at any step is caught at the database boundary, escalated
//! through the same channels, and recorded in the [`BatchSummary`]. It never
//! stops the remaining databases from being checked.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::alerts::{AlertComposer, AlertMessage};
use crate::config::{DatabaseConfig, GlobalSettings, MonitoredDatabase};
use crate::db::Connector;
use crate::error::CheckError;
use crate::lag::{Clock, LagReading, SystemClock};
use crate::notify::{channels_from_settings, MailTransport, NotificationChannel};

/// Alert iff the lag, in whole seconds, is strictly greater than the
/// allowance. Matches the whole-second figure printed in alerts.
pub fn exceeds_threshold(lag: Duration, allowed: Duration) -> bool {
    lag.as_secs() > allowed.as_secs()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub channel: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    Healthy {
        #[serde(rename = "lag_seconds", serialize_with = "as_seconds")]
        lag: Duration,
    },
    Lagging {
        #[serde(rename = "lag_seconds", serialize_with = "as_seconds")]
        lag: Duration,
        deliveries: Vec<DeliveryReport>,
    },
    Failed {
        #[serde(serialize_with = "as_error")]
        error: CheckError,
        deliveries: Vec<DeliveryReport>,
    },
}

impl CheckOutcome {
    pub fn deliveries(&self) -> &[DeliveryReport] {
        match self {
            Self::Healthy { .. } => &[],
            Self::Lagging { deliveries, .. } | Self::Failed { deliveries, .. } => deliveries.as_slice(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: CheckOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub databases: Vec<DatabaseReport>,
}

impl BatchSummary {
    pub fn get(&self, name: &str) -> Option<&CheckOutcome> {
        self.databases
            .iter()
            .find(|report| report.name == name)
            .map(|report| &report.outcome)
    }

    pub fn healthy(&self) -> usize {
        self.count(|o| matches!(o, CheckOutcome::Healthy { .. }))
    }

    pub fn lagging(&self) -> usize {
        self.count(|o| matches!(o, CheckOutcome::Lagging { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, CheckOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&CheckOutcome) -> bool) -> usize {
        self.databases.iter().filter(|r| pred(&r.outcome)).count()
    }
}

pub struct ReplicationChecker {
    settings: GlobalSettings,
    connector: Arc<dyn Connector>,
    channels: Vec<NotificationChannel>,
    composer: AlertComposer,
    clock: Arc<dyn Clock>,
}

impl ReplicationChecker {
    pub fn new(
        settings: GlobalSettings,
        connector: Arc<dyn Connector>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        let channels = channels_from_settings(&settings.notifications, transport);
        let composer = AlertComposer::from_settings(&settings);

        Self {
            settings,
            connector,
            channels,
            composer,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Check every configured database once, sequentially.
    pub async fn run(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            databases: Vec::with_capacity(self.settings.databases.len()),
        };

        for database in &self.settings.databases {
            match &database.config {
                Ok(config) => tracing::info!(
                    "Checking replication status for {} ({})",
                    database.name,
                    config.strategy.name()
                ),
                Err(_) => tracing::info!("Checking replication status for {}", database.name),
            }
            let outcome = self.check_database(database).await;
            summary.databases.push(DatabaseReport {
                name: database.name.clone(),
                outcome,
            });
        }

        tracing::info!(
            "Replication check finished: {} ok, {} lagging, {} failed",
            summary.healthy(),
            summary.lagging(),
            summary.failed()
        );
        summary
    }

    pub async fn check_database(&self, database: &MonitoredDatabase) -> CheckOutcome {
        let config = match &database.config {
            Ok(config) => config,
            Err(err) => return self.escalate(&database.name, None, err.clone()).await,
        };

        match self.measure(config).await {
            Ok(reading) => self.evaluate(&database.name, config, reading).await,
            Err(err) => self.escalate(&database.name, Some(config), err).await,
        }
    }

    /// Connect, compute, release. The connection is closed on every path
    /// once it has been opened.
    async fn measure(&self, config: &DatabaseConfig) -> Result<LagReading, CheckError> {
        let mut conn = self
            .bounded("connect", self.connector.connect(config))
            .await?;

        let result = self
            .bounded(
                "measure",
                config.strategy.compute_lag(conn.as_mut(), self.clock.as_ref()),
            )
            .await;

        conn.close().await;
        result
    }

    async fn evaluate(
        &self,
        name: &str,
        config: &DatabaseConfig,
        reading: LagReading,
    ) -> CheckOutcome {
        let allowed = self.settings.allowed_lag;

        if !exceeds_threshold(reading.lag, allowed) {
            tracing::info!(
                "{}: replication lag {}s is within the allowed {}s",
                name,
                reading.lag.as_secs(),
                allowed.as_secs()
            );
            return CheckOutcome::Healthy { lag: reading.lag };
        }

        tracing::warn!(
            "{}: replication lag {}s exceeds the allowed {}s",
            name,
            reading.lag.as_secs(),
            allowed.as_secs()
        );

        let message = self
            .composer
            .compose(name, config, &self.settings, &reading);
        let deliveries = self.dispatch(&message).await;

        CheckOutcome::Lagging {
            lag: reading.lag,
            deliveries,
        }
    }

    async fn escalate(
        &self,
        name: &str,
        config: Option<&DatabaseConfig>,
        error: CheckError,
    ) -> CheckOutcome {
        tracing::error!("{}: Error  ==>  {}", name, error);

        // Delivery failures here are only logged by dispatch; there is no
        // second-level escalation.
        let message = self
            .composer
            .compose_failure(name, config, &self.settings, &error);
        let deliveries = self.dispatch(&message).await;

        CheckOutcome::Failed { error, deliveries }
    }

    /// Try every channel in turn. One channel failing never skips the next.
    async fn dispatch(&self, message: &AlertMessage) -> Vec<DeliveryReport> {
        if self.channels.is_empty() {
            tracing::warn!("No notification channels configured; \"{}\" not sent", message.subject);
            return Vec::new();
        }

        let mut reports = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            tracing::info!("Sending {} alert...", channel.name());

            let report = match channel.send(message).await {
                Ok(()) => DeliveryReport {
                    channel: channel.name().to_string(),
                    delivered: true,
                    error: None,
                },
                Err(err) => {
                    tracing::error!("{} alert delivery failed: {}", channel.name(), err);
                    DeliveryReport {
                        channel: channel.name().to_string(),
                        delivered: false,
                        error: Some(err.to_string()),
                    }
                }
            };
            reports.push(report);
        }
        reports
    }

    async fn bounded<T, F>(&self, stage: &'static str, fut: F) -> Result<T, CheckError>
    where
        F: Future<Output = Result<T, CheckError>>,
    {
        match self.settings.check_timeout {
            Some(after) => tokio::time::timeout(after, fut)
                .await
                .map_err(|_| CheckError::Timeout { stage, after })?,
            None => fut.await,
        }
    }
}

fn as_seconds<S: Serializer>(lag: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(lag.as_secs_f64())
}

fn as_error<S: Serializer>(error: &CheckError, serializer: S) -> Result<S::Ok, S::Error> {
    let mut state = serializer.serialize_struct("CheckError", 2)?;
    state.serialize_field("kind", error.kind())?;
    state.serialize_field("message", &error.to_string())?;
    state.end()
}
