//! Replication lag measurement.
//!
//! [`LagStrategy`] is chosen once per database when the configuration is
//! loaded. Both variants run a single query over a [`ReplicaConnection`]
//! and turn the returned row into a [`LagReading`].

use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};

use crate::db::{ReplicaConnection, ResultRow};
use crate::error::CheckError;

/// Position of `Seconds_Behind_Master` in a `SHOW SLAVE STATUS` row.
pub const SECONDS_BEHIND_COLUMN: usize = 32;
/// Position of `Last_Errno` in a `SHOW SLAVE STATUS` row.
pub const LAST_ERRNO_COLUMN: usize = 18;
/// Position of `Last_Error` in a `SHOW SLAVE STATUS` row.
pub const LAST_ERROR_COLUMN: usize = 19;

pub const DEFAULT_HEARTBEAT_COLUMN: &str = "ts";

/// How far a heartbeat may run ahead of the local clock before the reading
/// is rejected instead of clamped to zero.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(5);

const REPLICA_STATUS_QUERY: &str = "SHOW SLAVE STATUS";

/// Source of "now" for heartbeat comparisons.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Zone used to read heartbeat timestamps that carry no offset of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeartbeatZone {
    /// The monitor host's zone.
    #[default]
    Local,
    Utc,
    Offset(FixedOffset),
}

impl HeartbeatZone {
    /// Accepts `local`, `utc` or an offset such as `+10:00` / `-0330`.
    pub fn parse(raw: &str) -> Result<Self, CheckError> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        if raw.eq_ignore_ascii_case("utc") || raw == "Z" {
            return Ok(Self::Utc);
        }
        parse_offset(raw).map(Self::Offset).ok_or_else(|| {
            CheckError::config(format!(
                "heartbeat_timezone '{}' is not 'local', 'utc' or an offset like +10:00",
                raw
            ))
        })
    }

    fn resolve(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            Self::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|ts| ts.with_timezone(&Utc)),
            Self::Utc => Some(naive.and_utc()),
            Self::Offset(offset) => offset
                .from_local_datetime(&naive)
                .single()
                .map(|ts| ts.with_timezone(&Utc)),
        }
    }
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    if !raw.is_ascii() {
        return None;
    }
    let sign = match raw.chars().next()? {
        '+' => 1,
        '-' => -1,
        _ => return None,
    };
    let digits = &raw[1..];
    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h, m),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "00"),
    };
    if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LagStrategy {
    /// Compare the newest timestamp in a heartbeat table to the local clock.
    Heartbeat {
        table: String,
        column: String,
        zone: HeartbeatZone,
    },
    /// Read the server-reported seconds-behind value.
    ReplicaStatus,
}

/// Outcome of one measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct LagReading {
    pub lag: Duration,
    /// Last replication error reported by the server, if any.
    pub replication_error: Option<String>,
}

impl LagStrategy {
    /// Map a configured strategy identifier to a variant.
    pub fn from_config(
        strategy: Option<&str>,
        heartbeat_table: Option<&str>,
        heartbeat_column: Option<&str>,
        heartbeat_timezone: Option<&str>,
    ) -> Result<Self, CheckError> {
        match strategy.map(str::trim) {
            Some("heartbeat") => {
                let table = heartbeat_table
                    .ok_or_else(|| CheckError::config("heartbeat strategy requires heartbeat_table"))?;
                let column = heartbeat_column.unwrap_or(DEFAULT_HEARTBEAT_COLUMN);

                if !is_plain_identifier(table) {
                    return Err(CheckError::config(format!(
                        "heartbeat_table '{}' is not a plain table name",
                        table
                    )));
                }
                if !is_plain_identifier(column) || column.contains('.') {
                    return Err(CheckError::config(format!(
                        "heartbeat_column '{}' is not a plain column name",
                        column
                    )));
                }

                let zone = match heartbeat_timezone {
                    Some(raw) => HeartbeatZone::parse(raw)?,
                    None => HeartbeatZone::default(),
                };

                Ok(Self::Heartbeat {
                    table: table.to_string(),
                    column: column.to_string(),
                    zone,
                })
            }
            Some("slave_status") | Some("replica_status") => Ok(Self::ReplicaStatus),
            Some(other) => Err(CheckError::config(format!(
                "unknown lag strategy '{}'",
                other
            ))),
            None => Err(CheckError::config("no lag strategy configured")),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Heartbeat { .. } => "heartbeat",
            Self::ReplicaStatus => "slave_status",
        }
    }

    pub async fn compute_lag(
        &self,
        conn: &mut dyn ReplicaConnection,
        clock: &dyn Clock,
    ) -> Result<LagReading, CheckError> {
        match self {
            Self::Heartbeat {
                table,
                column,
                zone,
            } => {
                let sql = format!(
                    "SELECT {column} FROM {table} ORDER BY {column} DESC LIMIT 1",
                    column = column,
                    table = table
                );
                let rows = conn.query(&sql).await?;
                let row = rows
                    .first()
                    .ok_or_else(|| CheckError::query(format!("heartbeat table {} is empty", table)))?;
                heartbeat_lag(row, *zone, clock.now())
            }
            Self::ReplicaStatus => {
                let rows = conn.query(REPLICA_STATUS_QUERY).await?;
                let row = rows
                    .first()
                    .ok_or_else(|| CheckError::query("server is not configured as a replica"))?;
                status_lag(row)
            }
        }
    }
}

fn heartbeat_lag(
    row: &ResultRow,
    zone: HeartbeatZone,
    now: DateTime<Utc>,
) -> Result<LagReading, CheckError> {
    let raw = match row.get(0) {
        Some(Some(value)) => value,
        Some(None) => return Err(CheckError::parse("heartbeat timestamp is NULL")),
        None => return Err(CheckError::parse("heartbeat row has no columns")),
    };

    let beat = parse_timestamp(raw, zone)?;
    let lag = match (now - beat).to_std() {
        Ok(lag) => lag,
        Err(_) => {
            let ahead = (beat - now).to_std().unwrap_or_default();
            if ahead > MAX_CLOCK_SKEW {
                return Err(CheckError::parse(format!(
                    "heartbeat {} is {}s ahead of local clock {}; check heartbeat_timezone",
                    beat,
                    ahead.as_secs(),
                    now
                )));
            }
            tracing::warn!(
                "Heartbeat {} is ahead of local clock {}; check time sync",
                beat,
                now
            );
            Duration::ZERO
        }
    };

    Ok(LagReading {
        lag,
        replication_error: None,
    })
}

fn status_lag(row: &ResultRow) -> Result<LagReading, CheckError> {
    let seconds = match row.get(SECONDS_BEHIND_COLUMN) {
        Some(Some(value)) => value.trim().parse::<u64>().map_err(|_| {
            CheckError::parse(format!("seconds behind source '{}' is not an integer", value))
        })?,
        Some(None) => return Err(CheckError::ReplicationStopped),
        None => {
            return Err(CheckError::parse(format!(
                "replica status row has {} columns, expected at least {}",
                row.len(),
                SECONDS_BEHIND_COLUMN + 1
            )))
        }
    };

    Ok(LagReading {
        lag: Duration::from_secs(seconds),
        replication_error: replication_error(row),
    })
}

fn replication_error(row: &ResultRow) -> Option<String> {
    let errno = row.get(LAST_ERRNO_COLUMN).flatten().map(str::trim)?;
    if errno.is_empty() || errno == "0" {
        return None;
    }
    let message = row.get(LAST_ERROR_COLUMN).flatten().unwrap_or("").trim();
    Some(format!("{}: {}", errno, message))
}

fn parse_timestamp(raw: &str, zone: HeartbeatZone) -> Result<DateTime<Utc>, CheckError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return zone.resolve(naive).ok_or_else(|| {
                CheckError::parse(format!(
                    "'{}' does not exist in heartbeat zone {:?}",
                    raw, zone
                ))
            });
        }
    }
    Err(CheckError::parse(format!("'{}' is not a timestamp", raw)))
}

/// `name` or `schema.name`, ASCII alphanumerics, `_` and `$` only.
fn is_plain_identifier(name: &str) -> bool {
    let mut parts = 0;
    for part in name.split('.') {
        parts += 1;
        if part.is_empty()
            || !part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        {
            return false;
        }
    }
    parts <= 2
}
