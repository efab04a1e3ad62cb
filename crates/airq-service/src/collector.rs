//! Background poller.
//!
//! One task drives every active device through a fetch-and-store cycle,
//! sleeps for the configured interval, and starts over. Ticks never overlap:
//! the sleep only begins once the previous tick has attempted every device.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use airq_core::AdapterFactory;
use airq_store::Store;
use airq_types::Device;

use crate::state::AppState;

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Active devices attempted this tick.
    pub devices: usize,
    /// Fetches that returned a reading.
    pub fetched: usize,
    /// Readings appended to the store.
    pub stored: usize,
    /// Devices whose reading was not stored.
    pub failed: usize,
}

/// Polls every active device once per tick.
pub struct Poller {
    store: Mutex<Store>,
    factory: Arc<AdapterFactory>,
    interval: Duration,
}

impl Poller {
    /// Create a poller over its own store connection.
    pub fn new(store: Store, factory: Arc<AdapterFactory>, interval: Duration) -> Self {
        Self {
            store: Mutex::new(store),
            factory,
            interval,
        }
    }

    /// Run one tick: read the active devices afresh and attempt each once.
    ///
    /// A failure for one device (adapter construction, fetch, append) is
    /// logged and counted; the remaining devices are still attempted. If
    /// the device list itself cannot be read the tick ends early.
    pub async fn run_tick(&self) -> TickReport {
        let devices = {
            let store = self.store.lock().await;
            store.list_active_devices()
        };
        let devices = match devices {
            Ok(devices) => devices,
            Err(e) => {
                error!("Failed to load active devices, skipping tick: {}", e);
                return TickReport::default();
            }
        };

        if devices.is_empty() {
            warn!("No devices configured. Use 'airq device add' to add devices.");
            return TickReport::default();
        }

        let mut report = TickReport {
            devices: devices.len(),
            ..Default::default()
        };
        for device in &devices {
            match self.poll_device(device).await {
                PollOutcome::Stored => {
                    report.fetched += 1;
                    report.stored += 1;
                }
                PollOutcome::StoreFailed => {
                    report.fetched += 1;
                    report.failed += 1;
                }
                PollOutcome::NoData => report.failed += 1,
            }
        }

        info!(
            devices = report.devices,
            fetched = report.fetched,
            stored = report.stored,
            failed = report.failed,
            "Poll tick complete"
        );
        report
    }

    async fn poll_device(&self, device: &Device) -> PollOutcome {
        let adapter = match self.factory.create(device) {
            Ok(adapter) => adapter,
            Err(e) => {
                error!(
                    device_id = device.id,
                    "Cannot build adapter for {}: {}", device.name, e
                );
                return PollOutcome::NoData;
            }
        };

        let Some(mut measurement) = adapter.fetch_data().await else {
            return PollOutcome::NoData;
        };
        measurement.device_id = device.id;

        let result = {
            let store = self.store.lock().await;
            store.append_measurement(&measurement)
        };
        match result {
            Ok(_) => {
                info!(device_id = device.id, "Stored data for {}: {}", device.name, measurement);
                PollOutcome::Stored
            }
            Err(e) => {
                error!(
                    device_id = device.id,
                    "Failed to store data for {}: {}", device.name, e
                );
                PollOutcome::StoreFailed
            }
        }
    }

    /// Tick forever, sleeping for the interval after each tick.
    ///
    /// Each tick runs in its own task. A tick that panics is logged and
    /// counts as finished; the next one starts after the usual interval.
    pub async fn run(self) {
        info!(
            "Poller started (interval: {}s)",
            self.interval.as_secs()
        );
        let poller = Arc::new(self);
        loop {
            let ticker = Arc::clone(&poller);
            if let Err(e) = tokio::spawn(async move { ticker.run_tick().await }).await {
                if e.is_panic() {
                    error!("Poll tick panicked, continuing with the next tick: {}", e);
                } else {
                    error!("Poll tick was cancelled: {}", e);
                }
            }
            tokio::time::sleep(poller.interval).await;
        }
    }
}

enum PollOutcome {
    Stored,
    StoreFailed,
    NoData,
}

/// Start the background poller unless it is already running.
///
/// Safe to call from any number of entry points: only the first call in a
/// process spawns the task. Returns whether this call started it.
///
/// The poller opens its own connection to `config.storage.path`. If that
/// fails the task logs the error and tries again after one interval.
pub fn ensure_started(state: &AppState) -> bool {
    state.collector.start_once(|| {
        let path = state.config.storage.path.clone();
        let factory = Arc::clone(&state.factory);
        let interval = state.config.collector.interval();
        tokio::spawn(supervise(path, factory, interval));
    })
}

async fn supervise(path: PathBuf, factory: Arc<AdapterFactory>, interval: Duration) {
    loop {
        match Store::open(&path) {
            Ok(store) => Poller::new(store, Arc::clone(&factory), interval).run().await,
            Err(e) => {
                error!("Poller cannot open database at {}: {}", path.display(), e);
                tokio::time::sleep(interval).await;
            }
        }
    }
}
