//! Query builder for the measurement time series.
//!
//! [`MeasurementQuery`] follows the builder pattern. Every query joins the
//! devices table, so rows come back with the device name and rows whose
//! device was removed are never returned.
//!
//! # Example
//!
//! ```
//! use airq_store::{MeasurementQuery, Store};
//! use time::OffsetDateTime;
//!
//! let store = Store::open_in_memory()?;
//!
//! // Last 24 hours for device 1, oldest first
//! let query = MeasurementQuery::window(24, OffsetDateTime::now_utc())?.device(1);
//! let rows = store.query_measurements(&query)?;
//! assert!(rows.is_empty());
//! # Ok::<(), airq_store::Error>(())
//! ```

use time::{Duration, OffsetDateTime};

use crate::error::{Error, Result};
use crate::models::format_db_timestamp;

/// Fluent query builder for stored measurements.
///
/// Use this to construct queries for
/// [`Store::query_measurements`](crate::Store::query_measurements).
/// By default results are ordered newest first. Rows sharing a timestamp
/// are ordered by row id in the same direction, so the highest id wins ties.
#[derive(Debug, Default, Clone)]
pub struct MeasurementQuery {
    /// Filter by device ID.
    pub device_id: Option<i64>,
    /// Include only rows strictly after this instant.
    pub after: Option<OffsetDateTime>,
    /// Include only rows at or before this instant.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Order by timestamp descending (newest first).
    pub newest_first: bool,
}

impl MeasurementQuery {
    /// Create a new query: all devices, no time bounds, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// The windowed-history query: rows with `timestamp > now - hours`,
    /// oldest first. Fails if the window start precedes the calendar.
    pub fn window(hours: u32, now: OffsetDateTime) -> Result<Self> {
        let start = now
            .checked_sub(Duration::hours(i64::from(hours)))
            .ok_or_else(|| Error::InvalidTimestamp(format!("{hours} hours before {now}")))?;
        Ok(Self::new().after(start).oldest_first())
    }

    /// Filter by device ID.
    pub fn device(mut self, device_id: i64) -> Self {
        self.device_id = Some(device_id);
        self
    }

    /// Filter to rows strictly after this instant.
    pub fn after(mut self, time: OffsetDateTime) -> Self {
        self.after = Some(time);
        self
    }

    /// Filter to rows at or before this instant.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Order results chronologically.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    ///
    /// Time bounds are compared as stored text, which sorts chronologically
    /// because every stored timestamp has the same UTC layout.
    pub(crate) fn build_where(&self) -> Result<(String, Vec<Box<dyn rusqlite::ToSql>>)> {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(device_id) = self.device_id {
            conditions.push("m.device_id = ?");
            params.push(Box::new(device_id));
        }

        if let Some(after) = self.after {
            conditions.push("m.timestamp > ?");
            params.push(Box::new(format_db_timestamp(after)?));
        }

        if let Some(until) = self.until {
            conditions.push("m.timestamp <= ?");
            params.push(Box::new(format_db_timestamp(until)?));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        Ok((where_clause, params))
    }

    /// Build the full SQL query around a WHERE clause from [`Self::build_where`].
    pub(crate) fn build_sql(&self, where_clause: &str) -> String {
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT m.id, m.device_id, m.timestamp, m.pm1, m.pm2, m.pm10, m.co2, \
             m.temperature, m.humidity, m.nox, m.tvoc, d.name \
             FROM measurements m JOIN devices d ON m.device_id = d.id \
             {} ORDER BY m.timestamp {}, m.id {}",
            where_clause, order, order
        );

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        sql
    }
}
