//! In-memory doubles for the database and mail boundaries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::DatabaseConfig;
use crate::db::{Connector, ReplicaConnection, ResultRow};
use crate::error::{CheckError, DeliveryError};
use crate::lag::{Clock, LAST_ERRNO_COLUMN, SECONDS_BEHIND_COLUMN};
use crate::notify::{MailTransport, OutgoingMail};

pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    pub fn at(rfc3339: &str) -> Self {
        Self(
            DateTime::parse_from_rfc3339(rfc3339)
                .unwrap()
                .with_timezone(&Utc),
        )
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Queries issued and close calls observed on one connection.
#[derive(Clone, Default)]
pub struct ConnectionLog {
    queries: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

impl ConnectionLog {
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct ScriptedConnection {
    response: Result<Vec<ResultRow>, CheckError>,
    delay: Option<Duration>,
    log: ConnectionLog,
}

impl ScriptedConnection {
    pub fn with_rows(rows: Vec<ResultRow>) -> Self {
        Self {
            response: Ok(rows),
            delay: None,
            log: ConnectionLog::default(),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.log.queries()
    }
}

#[async_trait]
impl ReplicaConnection for ScriptedConnection {
    async fn query(&mut self, sql: &str) -> Result<Vec<ResultRow>, CheckError> {
        self.log.queries.lock().unwrap().push(sql.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.clone()
    }

    async fn close(self: Box<Self>) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// A `SHOW SLAVE STATUS` row reporting `seconds` behind.
pub fn status_row(seconds: Option<u64>) -> ResultRow {
    let width = SECONDS_BEHIND_COLUMN + 8;
    let mut values: Vec<Option<String>> = (0..width).map(|_| Some("Yes".to_string())).collect();
    values[LAST_ERRNO_COLUMN] = Some("0".to_string());
    values[SECONDS_BEHIND_COLUMN] = seconds.map(|s| s.to_string());
    ResultRow::new(values)
}

#[derive(Clone)]
pub enum Behaviour {
    Refuse(CheckError),
    Respond(Result<Vec<ResultRow>, CheckError>),
    /// Connects, then every query hangs for the given time.
    Stall(Duration),
    /// The connect call itself hangs for the given time.
    StallConnect(Duration),
}

/// Hands out scripted connections keyed by `DatabaseConfig::host`.
#[derive(Default)]
pub struct ScriptedConnector {
    behaviours: HashMap<String, Behaviour>,
    logs: Mutex<HashMap<String, ConnectionLog>>,
    connects: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(host.to_string(), behaviour);
        self
    }

    pub fn log(&self, host: &str) -> ConnectionLog {
        self.logs
            .lock()
            .unwrap()
            .get(host)
            .cloned()
            .unwrap_or_default()
    }

    pub fn connects(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        config: &DatabaseConfig,
    ) -> Result<Box<dyn ReplicaConnection>, CheckError> {
        self.connects.lock().unwrap().push(config.host.clone());

        let behaviour = self
            .behaviours
            .get(&config.host)
            .cloned()
            .unwrap_or_else(|| Behaviour::Refuse(CheckError::connection("unknown host")));

        let (response, delay) = match behaviour {
            Behaviour::Refuse(err) => return Err(err),
            Behaviour::Respond(response) => (response, None),
            Behaviour::Stall(delay) => (Ok(Vec::new()), Some(delay)),
            Behaviour::StallConnect(delay) => {
                tokio::time::sleep(delay).await;
                (Ok(Vec::new()), None)
            }
        };

        let log = ConnectionLog::default();
        self.logs
            .lock()
            .unwrap()
            .insert(config.host.clone(), log.clone());

        Ok(Box::new(ScriptedConnection {
            response,
            delay,
            log,
        }))
    }
}

/// Records every mail; fails those addressed to a blocked recipient.
#[derive(Default)]
pub struct RecordingTransport {
    blocked: Vec<String>,
    attempts: Mutex<Vec<OutgoingMail>>,
    sent: Mutex<Vec<OutgoingMail>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(recipient: &str) -> Self {
        Self {
            blocked: vec![recipient.to_string()],
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> Vec<OutgoingMail> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError> {
        self.attempts.lock().unwrap().push(mail.clone());
        if mail.to.iter().any(|to| self.blocked.contains(to)) {
            return Err(DeliveryError::transport("connection refused"));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}
