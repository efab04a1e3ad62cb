//! Main store implementation.

use std::path::Path;
use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use time::OffsetDateTime;
use tracing::{debug, info};

use airq_types::{Device, Measurement, ProviderConfig};

use crate::error::{Error, Result};
use crate::models::{NewDevice, StoredMeasurement, format_db_timestamp, parse_db_timestamp};
use crate::queries::MeasurementQuery;
use crate::schema;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const DEVICE_COLUMNS: &str = "id, name, provider, config, active, created_at";

/// SQLite-based store for the device registry and measurement time series.
///
/// A `Store` wraps one connection. Open one per concurrent caller: the
/// database runs in WAL mode, so one writer and many readers can proceed
/// side by side.
pub struct Store {
    conn: Connection,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        // Foreign keys stay off: device existence is checked on append and
        // removing a device leaves its measurement rows in place.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn device_from_row(row: &Row<'_>) -> rusqlite::Result<Device> {
    let config = match row.get::<_, Option<String>>(3)? {
        Some(raw) if !raw.trim().is_empty() => {
            serde_json::from_str::<ProviderConfig>(&raw).map_err(|e| conversion_error(3, e))?
        }
        _ => ProviderConfig::new(),
    };
    let created_at = row
        .get::<_, Option<String>>(5)?
        .and_then(|raw| parse_db_timestamp(&raw).ok());

    Ok(Device {
        id: row.get(0)?,
        name: row.get(1)?,
        provider: row.get(2)?,
        config,
        active: row.get::<_, Option<bool>>(4)?.unwrap_or(true),
        created_at,
    })
}

fn measurement_from_row(row: &Row<'_>) -> rusqlite::Result<StoredMeasurement> {
    let raw: String = row.get(2)?;
    let timestamp = parse_db_timestamp(&raw).map_err(|e| conversion_error(2, e))?;

    Ok(StoredMeasurement {
        id: row.get(0)?,
        device_id: row.get(1)?,
        timestamp,
        pm1: row.get(3)?,
        pm2: row.get(4)?,
        pm10: row.get(5)?,
        co2: row.get(6)?,
        temperature: row.get(7)?,
        humidity: row.get(8)?,
        nox: row.get(9)?,
        tvoc: row.get(10)?,
        device_name: row.get(11)?,
    })
}

// Device operations
impl Store {
    /// Register a device under the next free id.
    ///
    /// The id is computed inside the insert statement, so two adds never
    /// collide even across connections.
    pub fn add_device(&self, device: &NewDevice) -> Result<Device> {
        let config = serde_json::to_string(&device.config)?;

        self.conn.execute(
            "INSERT INTO devices (id, name, provider, config, active)
             VALUES ((SELECT COALESCE(MAX(id), 0) + 1 FROM devices), ?1, ?2, ?3, 1)",
            rusqlite::params![device.name, device.provider, config],
        )?;

        let id = self.conn.last_insert_rowid();
        info!(id, name = %device.name, provider = %device.provider, "Device added");

        self.get_device(id)?.ok_or(Error::DeviceNotFound(id))
    }

    /// The id the next [`Store::add_device`] call would assign.
    pub fn next_device_id(&self) -> Result<i64> {
        let id = self.conn.query_row(
            "SELECT COALESCE(MAX(id), 0) + 1 FROM devices",
            [],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Get a device by ID, active or not.
    pub fn get_device(&self, device_id: i64) -> Result<Option<Device>> {
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?");
        let device = self
            .conn
            .query_row(&sql, [device_id], device_from_row)
            .optional()?;
        Ok(device)
    }

    /// List devices by id. With `include_inactive`, active devices come first.
    pub fn list_devices(&self, include_inactive: bool) -> Result<Vec<Device>> {
        let sql = if include_inactive {
            format!("SELECT {DEVICE_COLUMNS} FROM devices ORDER BY active DESC, id")
        } else {
            format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE active = 1 ORDER BY id")
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let devices = stmt
            .query_map([], device_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(devices)
    }

    /// The active devices ordered by id, read fresh on every call.
    pub fn list_active_devices(&self) -> Result<Vec<Device>> {
        self.list_devices(false)
    }

    /// Whether `device_id` names an existing, active device.
    pub fn is_active_device(&self, device_id: i64) -> Result<bool> {
        let active = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM devices WHERE id = ? AND active = 1",
            [device_id],
            |row| row.get(0),
        )?;
        Ok(active)
    }

    /// Flip a device's `active` flag.
    pub fn set_device_active(&self, device_id: i64, active: bool) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE devices SET active = ?1 WHERE id = ?2",
            rusqlite::params![active, device_id],
        )?;
        if changed == 0 {
            return Err(Error::DeviceNotFound(device_id));
        }

        info!(id = device_id, active, "Device state changed");
        Ok(())
    }

    /// Delete a device row. Its measurements remain but are no longer returned.
    pub fn remove_device(&self, device_id: i64) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM devices WHERE id = ?", [device_id])?;
        if changed == 0 {
            return Err(Error::DeviceNotFound(device_id));
        }

        info!(id = device_id, "Device removed");
        Ok(())
    }
}

// Measurement operations
impl Store {
    /// Append one measurement and return its row id.
    ///
    /// The provider timestamp is stored as UTC wall-clock time with whole
    /// seconds; a reading without one is stamped with the current UTC time.
    pub fn append_measurement(&self, measurement: &Measurement) -> Result<i64> {
        if self.get_device(measurement.device_id)?.is_none() {
            return Err(Error::DeviceNotFound(measurement.device_id));
        }

        let timestamp = format_db_timestamp(
            measurement
                .timestamp
                .unwrap_or_else(OffsetDateTime::now_utc),
        )?;

        self.conn.execute(
            "INSERT INTO measurements (device_id, timestamp, pm1, pm2, pm10, co2,
             temperature, humidity, nox, tvoc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                measurement.device_id,
                timestamp,
                measurement.pm1,
                measurement.pm2,
                measurement.pm10,
                measurement.co2,
                measurement.temperature,
                measurement.humidity,
                measurement.nox,
                measurement.tvoc,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!(id, device_id = measurement.device_id, %timestamp, "Measurement stored");
        Ok(id)
    }

    /// Query measurements with filters.
    pub fn query_measurements(&self, query: &MeasurementQuery) -> Result<Vec<StoredMeasurement>> {
        let (where_clause, params) = query.build_where()?;
        let sql = query.build_sql(&where_clause);

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), measurement_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// The most recent measurement, for one device or across all devices.
    pub fn latest_measurement(&self, device_id: Option<i64>) -> Result<Option<StoredMeasurement>> {
        let mut query = MeasurementQuery::new().limit(1);
        if let Some(id) = device_id {
            query = query.device(id);
        }
        Ok(self.query_measurements(&query)?.pop())
    }

    /// Measurements newer than `hours` ago, oldest first.
    pub fn measurement_window(
        &self,
        hours: u32,
        device_id: Option<i64>,
    ) -> Result<Vec<StoredMeasurement>> {
        let mut query = MeasurementQuery::window(hours, OffsetDateTime::now_utc())?;
        if let Some(id) = device_id {
            query = query.device(id);
        }
        self.query_measurements(&query)
    }

    /// The `limit` most recent measurements across all devices.
    pub fn recent_measurements(&self, limit: u32) -> Result<Vec<StoredMeasurement>> {
        self.query_measurements(&MeasurementQuery::new().limit(limit))
    }

    /// Count stored measurement rows, including those of removed devices.
    pub fn count_measurements(&self, device_id: Option<i64>) -> Result<u64> {
        let count: i64 = match device_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM measurements WHERE device_id = ?",
                [id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM measurements", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn airgradient(name: &str) -> NewDevice {
        let mut config = ProviderConfig::new();
        config.insert("api_token".to_string(), "secret".to_string());
        config.insert("location_id".to_string(), "42".to_string());
        NewDevice::new(name, "airgradient", config)
    }

    fn reading(device_id: i64, ts: OffsetDateTime, co2: i64) -> Measurement {
        Measurement {
            co2: Some(co2),
            pm2: Some(5.0),
            ..Measurement::new(device_id).with_timestamp(ts)
        }
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.list_devices(true).unwrap().is_empty());
        assert_eq!(store.next_device_id().unwrap(), 1);
    }

    #[test]
    fn test_add_device_assigns_sequential_ids() {
        let store = Store::open_in_memory().unwrap();

        let first = store.add_device(&airgradient("Office")).unwrap();
        let second = store.add_device(&airgradient("Bedroom")).unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert!(second.active);
        assert!(second.created_at.is_some());
        assert_eq!(second.config.get("location_id").map(String::as_str), Some("42"));

        // Gaps are not reused; the next id follows the maximum.
        store.remove_device(1).unwrap();
        assert_eq!(store.next_device_id().unwrap(), 3);
        assert_eq!(store.add_device(&airgradient("Hall")).unwrap().id, 3);
    }

    #[test]
    fn test_add_after_removing_highest_reuses_id() {
        let store = Store::open_in_memory().unwrap();
        store.add_device(&airgradient("A")).unwrap();
        store.add_device(&airgradient("B")).unwrap();
        store.remove_device(2).unwrap();
        assert_eq!(store.add_device(&airgradient("C")).unwrap().id, 2);
    }

    #[test]
    fn test_active_listing() {
        let store = Store::open_in_memory().unwrap();
        store.add_device(&airgradient("One")).unwrap();
        store.add_device(&airgradient("Two")).unwrap();
        store.add_device(&airgradient("Three")).unwrap();
        store.set_device_active(1, false).unwrap();

        let active: Vec<i64> = store
            .list_active_devices()
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(active, vec![2, 3]);

        let all: Vec<i64> = store
            .list_devices(true)
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(all, vec![2, 3, 1]);

        assert!(!store.is_active_device(1).unwrap());
        assert!(store.is_active_device(2).unwrap());
        assert!(!store.is_active_device(99).unwrap());
    }

    #[test]
    fn test_mutating_unknown_device() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.set_device_active(7, true),
            Err(Error::DeviceNotFound(7))
        ));
        assert!(matches!(store.remove_device(7), Err(Error::DeviceNotFound(7))));
        assert!(store.get_device(7).unwrap().is_none());
    }

    #[test]
    fn test_append_requires_device() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .append_measurement(&Measurement::new(5))
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(5)));
        assert_eq!(store.count_measurements(None).unwrap(), 0);
    }

    #[test]
    fn test_append_normalizes_to_utc() {
        let store = Store::open_in_memory().unwrap();
        store.add_device(&airgradient("Office")).unwrap();

        let ts = airq_types::parse_timestamp("2024-01-01T00:00:00Z").unwrap();
        store.append_measurement(&reading(1, ts, 700)).unwrap();
        let ts = datetime!(2024-01-01 03:30:00.900 +02:00);
        store.append_measurement(&reading(1, ts, 710)).unwrap();

        let raw: Vec<String> = store
            .conn
            .prepare("SELECT timestamp FROM measurements ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(raw, vec!["2024-01-01 00:00:00", "2024-01-01 01:30:00"]);

        let latest = store.latest_measurement(Some(1)).unwrap().unwrap();
        assert_eq!(latest.timestamp, datetime!(2024-01-01 01:30:00 UTC));
        assert_eq!(latest.device_name, "Office");
    }

    #[test]
    fn test_append_rejects_unrepresentable_timestamp() {
        let store = Store::open_in_memory().unwrap();
        store.add_device(&airgradient("Office")).unwrap();

        let ts = datetime!(9999-12-31 23:59:59 -1);
        let err = store.append_measurement(&reading(1, ts, 700)).unwrap_err();
        assert!(matches!(err, Error::InvalidTimestamp(_)));
        assert_eq!(store.count_measurements(Some(1)).unwrap(), 0);
    }

    #[test]
    fn test_append_without_timestamp_uses_now() {
        let store = Store::open_in_memory().unwrap();
        store.add_device(&airgradient("Office")).unwrap();

        let before = OffsetDateTime::now_utc().replace_nanosecond(0).unwrap();
        store.append_measurement(&Measurement::new(1)).unwrap();
        let after = OffsetDateTime::now_utc();

        let row = store.latest_measurement(None).unwrap().unwrap();
        assert!(row.timestamp >= before && row.timestamp <= after);
        assert_eq!(row.co2, None);
    }

    #[test]
    fn test_latest_across_devices_and_ties() {
        let store = Store::open_in_memory().unwrap();
        store.add_device(&airgradient("A")).unwrap();
        store.add_device(&airgradient("B")).unwrap();

        let t0 = datetime!(2024-01-01 00:00:00 UTC);
        let t1 = datetime!(2024-01-01 00:01:00 UTC);
        store.append_measurement(&reading(2, t1, 500)).unwrap();
        store.append_measurement(&reading(1, t0, 400)).unwrap();

        let latest = store.latest_measurement(None).unwrap().unwrap();
        assert_eq!(latest.device_id, 2);
        assert_eq!(latest.device_name, "B");

        // Same timestamp: highest id wins.
        let tie = store.append_measurement(&reading(1, t1, 401)).unwrap();
        let latest = store.latest_measurement(None).unwrap().unwrap();
        assert_eq!(latest.id, tie);
        assert_eq!(latest.co2, Some(401));

        assert_eq!(
            store.latest_measurement(Some(1)).unwrap().unwrap().co2,
            Some(401)
        );
    }

    #[test]
    fn test_window_is_strict_and_ascending() {
        let store = Store::open_in_memory().unwrap();
        store.add_device(&airgradient("A")).unwrap();
        store.add_device(&airgradient("B")).unwrap();

        let now = datetime!(2024-01-02 12:00:00 UTC);
        store
            .append_measurement(&reading(1, datetime!(2024-01-02 11:00:00 UTC), 3))
            .unwrap();
        // Exactly on the boundary: excluded.
        store
            .append_measurement(&reading(1, datetime!(2024-01-01 12:00:00 UTC), 1))
            .unwrap();
        store
            .append_measurement(&reading(2, datetime!(2024-01-01 12:00:01 UTC), 2))
            .unwrap();
        store
            .append_measurement(&reading(1, datetime!(2023-12-31 00:00:00 UTC), 0))
            .unwrap();

        let rows = store
            .query_measurements(&MeasurementQuery::window(24, now).unwrap())
            .unwrap();
        let co2: Vec<_> = rows.iter().filter_map(|r| r.co2).collect();
        assert_eq!(co2, vec![2, 3]);
        assert!(rows.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let rows = store
            .query_measurements(&MeasurementQuery::window(24, now).unwrap().device(1))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].co2, Some(3));
    }

    #[test]
    fn test_measurement_window_uses_current_time() {
        let store = Store::open_in_memory().unwrap();
        store.add_device(&airgradient("A")).unwrap();
        let now = OffsetDateTime::now_utc();
        store
            .append_measurement(&reading(1, now - time::Duration::minutes(30), 1))
            .unwrap();
        store
            .append_measurement(&reading(1, now - time::Duration::hours(2), 2))
            .unwrap();

        assert_eq!(store.measurement_window(1, None).unwrap().len(), 1);
        assert_eq!(store.measurement_window(3, Some(1)).unwrap().len(), 2);
        assert!(store.measurement_window(3, Some(2)).unwrap().is_empty());
        assert!(matches!(
            store.measurement_window(u32::MAX, None),
            Err(Error::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_removed_device_rows_hidden_but_kept() {
        let store = Store::open_in_memory().unwrap();
        store.add_device(&airgradient("A")).unwrap();
        store
            .append_measurement(&reading(1, datetime!(2024-01-01 00:00:00 UTC), 1))
            .unwrap();

        store.remove_device(1).unwrap();
        assert!(store.latest_measurement(None).unwrap().is_none());
        assert!(store.recent_measurements(5).unwrap().is_empty());
        assert_eq!(store.count_measurements(Some(1)).unwrap(), 1);
    }

    #[test]
    fn test_recent_measurements() {
        let store = Store::open_in_memory().unwrap();
        store.add_device(&airgradient("A")).unwrap();
        let base = datetime!(2024-01-01 00:00:00 UTC);
        for i in 0..7 {
            store
                .append_measurement(&reading(1, base + time::Duration::minutes(i), i))
                .unwrap();
        }

        let recent = store.recent_measurements(5).unwrap();
        let co2: Vec<_> = recent.iter().filter_map(|r| r.co2).collect();
        assert_eq!(co2, vec![6, 5, 4, 3, 2]);
    }

    #[test]
    fn test_wal_concurrent_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("airq.db");

        let writer = Store::open(&path).unwrap();
        let reader = Store::open(&path).unwrap();

        let mode: String = writer
            .conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        writer.add_device(&airgradient("Office")).unwrap();
        assert!(reader.is_active_device(1).unwrap());

        // Both connections may add; ids are still unique.
        let from_reader = reader.add_device(&airgradient("Hall")).unwrap();
        assert_eq!(from_reader.id, 2);

        writer
            .append_measurement(&reading(2, datetime!(2024-01-01 00:00:00 UTC), 9))
            .unwrap();
        let seen = reader.latest_measurement(Some(2)).unwrap().unwrap();
        assert_eq!(seen.co2, Some(9));
        assert_eq!(seen.device_name, "Hall");
    }

    #[test]
    fn test_config_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let device = store.add_device(&airgradient("Office")).unwrap();
        let raw: String = store
            .conn
            .query_row("SELECT config FROM devices WHERE id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["api_token"], "secret");
        assert_eq!(store.get_device(1).unwrap().unwrap(), device);
    }
}
