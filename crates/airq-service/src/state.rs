//! Application state shared across handlers.
//!
//! Request handlers share one [`Store`] connection behind a mutex. The
//! background poller opens its own connection to the same database, so
//! ingestion and queries never queue behind each other; SQLite's WAL mode
//! arbitrates between them.

use std::sync::{Arc, OnceLock};

use time::OffsetDateTime;
use tokio::sync::Mutex;

use airq_core::{AdapterFactory, AdapterOptions};
use airq_store::Store;

use crate::config::Config;

/// Shared application state.
pub struct AppState {
    /// The request-side store connection.
    pub store: Mutex<Store>,
    /// Configuration, fixed for the life of the process.
    pub config: Config,
    /// Adapter constructors keyed by provider name.
    pub factory: Arc<AdapterFactory>,
    /// Background poller start guard.
    pub collector: CollectorState,
}

impl AppState {
    /// Create application state with the built-in providers.
    ///
    /// Adapters use the fetch timeout from `config.collector`.
    pub fn new(store: Store, config: Config) -> Arc<Self> {
        let options = AdapterOptions::with_timeout(config.collector.fetch_timeout());
        Self::with_factory(store, config, AdapterFactory::with_builtin(options))
    }

    /// Create application state with a custom adapter factory.
    pub fn with_factory(store: Store, config: Config, factory: AdapterFactory) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(store),
            config,
            factory: Arc::new(factory),
            collector: CollectorState::new(),
        })
    }
}

/// Records whether, and when, the background poller was started.
///
/// The guard is set exactly once per process; see
/// [`ensure_started`](crate::collector::ensure_started).
#[derive(Debug, Default)]
pub struct CollectorState {
    started: OnceLock<OffsetDateTime>,
}

impl CollectorState {
    /// Create a guard in the not-started state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the poller has been started.
    pub fn is_running(&self) -> bool {
        self.started.get().is_some()
    }

    /// When the poller was started.
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        self.started.get().copied()
    }

    /// Run `start` if and only if no earlier call did. Returns whether this
    /// call ran it.
    pub(crate) fn start_once(&self, start: impl FnOnce()) -> bool {
        let mut ran = false;
        self.started.get_or_init(|| {
            start();
            ran = true;
            OffsetDateTime::now_utc()
        });
        ran
    }
}
