//! Database boundary.
//!
//! The checker only needs three things from a database: open a connection,
//! run a raw query and read back rows, and close. [`Connector`] and
//! [`ReplicaConnection`] capture exactly that so the lag strategies can be
//! exercised against in-memory fakes. [`MySqlConnector`] is the production
//! implementation on top of `sqlx`.

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{ConnectOptions, Connection, Executor, Row};

use crate::config::DatabaseConfig;
use crate::error::CheckError;

/// One result row with every cell rendered as text. `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRow {
    pub values: Vec<Option<String>>,
}

impl ResultRow {
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self { values }
    }

    /// Cell at `index`. Outer `None` means the row has no such column,
    /// inner `None` means the cell is NULL.
    pub fn get(&self, index: usize) -> Option<Option<&str>> {
        self.values.get(index).map(|cell| cell.as_deref())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Opens connections to monitored databases.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        config: &DatabaseConfig,
    ) -> Result<Box<dyn ReplicaConnection>, CheckError>;
}

/// A live connection to one replica.
///
/// `close` consumes the connection, so it can be released at most once.
#[async_trait]
pub trait ReplicaConnection: Send {
    async fn query(&mut self, sql: &str) -> Result<Vec<ResultRow>, CheckError>;

    async fn close(self: Box<Self>);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

impl MySqlConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(
        &self,
        config: &DatabaseConfig,
    ) -> Result<Box<dyn ReplicaConnection>, CheckError> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database)
            .disable_statement_logging();

        let conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(|err| {
                CheckError::connection(format!(
                    "{}@{}:{}/{}: {}",
                    config.user, config.host, config.port, config.database, err
                ))
            })?;

        Ok(Box::new(MySqlReplica { conn }))
    }
}

struct MySqlReplica {
    conn: MySqlConnection,
}

#[async_trait]
impl ReplicaConnection for MySqlReplica {
    async fn query(&mut self, sql: &str) -> Result<Vec<ResultRow>, CheckError> {
        // A bare &str runs over the text protocol, so every cell decodes as text.
        let rows = (&mut self.conn)
            .fetch_all(sql)
            .await
            .map_err(|err| CheckError::query(format!("`{}`: {}", sql, err)))?;

        rows.iter().map(text_row).collect()
    }

    async fn close(self: Box<Self>) {
        let MySqlReplica { conn } = *self;
        if let Err(err) = conn.close().await {
            tracing::warn!("Error while closing database connection: {}", err);
        }
    }
}

fn text_row(row: &MySqlRow) -> Result<ResultRow, CheckError> {
    let mut values = Vec::with_capacity(row.len());
    for index in 0..row.len() {
        let value: Option<String> = row
            .try_get_unchecked(index)
            .map_err(|err| CheckError::parse(format!("column {}: {}", index, err)))?;
        values.push(value);
    }

    Ok(ResultRow::new(values))
}
