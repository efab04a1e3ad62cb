//! airq - environmental sensor poller, query API and device manager.
//!
//! Run with: `cargo run -p airq-service -- run`

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};
use axum::Router;
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use airq_core::{AdapterFactory, AdapterOptions};
use airq_service::devices::{self, StateChange, Validation};
use airq_service::{AppState, Config, ConfigOverrides, api, default_config_path, ensure_started};
use airq_store::{NewDevice, Store};

const DEFAULT_LOG_FILTER: &str = "airq_service=info,airq_core=info,airq_store=info,tower_http=debug";

/// airq - poll air-quality sensors and serve their readings.
#[derive(Parser, Debug)]
#[command(name = "airq")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long, global = true, env = "DATABASE_PATH")]
    database: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true, env = "AIRQ_BIND")]
    bind: Option<String>,

    /// Process secret; `run` refuses to start without it.
    #[arg(long, global = true, env = "SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Disable the background poller (API only mode).
    #[arg(long, global = true)]
    no_collector: bool,

    /// Enable verbose output.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and the background poller (default behavior).
    Run,

    /// Create the database schema.
    InitDb,

    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Manage registered devices.
    Device {
        #[command(subcommand)]
        action: DeviceAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum DeviceAction {
    /// Add a new device.
    Add {
        /// Provider name (e.g. airgradient).
        provider: String,
        /// Device name.
        name: String,
        /// API token (required for airgradient).
        #[arg(long)]
        token: Option<String>,
        /// Location ID (required for airgradient).
        #[arg(long)]
        location: Option<String>,
        /// Extra provider config as key=value (repeatable).
        #[arg(long = "config", value_name = "KEY=VALUE")]
        entries: Vec<String>,
        /// Validate the connection before adding.
        #[arg(long)]
        validate: bool,
        /// Add the device even if validation fails.
        #[arg(long)]
        force: bool,
    },

    /// List devices.
    List {
        /// Show inactive devices as well.
        #[arg(long)]
        all: bool,
    },

    /// Remove a device.
    Remove {
        device_id: i64,
        /// Skip confirmation.
        #[arg(long)]
        force: bool,
    },

    /// Deactivate a device (stops polling, keeps history).
    Deactivate {
        device_id: i64,
        /// Skip confirmation.
        #[arg(long)]
        force: bool,
    },

    /// Activate a previously deactivated device.
    Activate { device_id: i64 },

    /// Fetch one reading from an active device.
    Test { device_id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;

    match args.command {
        Some(Command::Run) | None => run_server(args).await,
        Some(Command::InitDb) => {
            let config = load_config(&args)?;
            println!("Initializing database...");
            Store::open(&config.storage.path)?;
            println!("✓ Database initialized successfully");
            Ok(())
        }
        Some(Command::Config {
            action: ConfigAction::Init { force },
        }) => init_config(args.config.clone(), force),
        Some(Command::Device { ref action }) => {
            let config = load_config(&args)?;
            handle_device_action(action, &config).await
        }
    }
}

fn init_tracing(args: &Args) -> anyhow::Result<()> {
    let filter = if args.quiet {
        EnvFilter::new("warn")
    } else if args.verbose {
        EnvFilter::new("debug")
    } else {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(DEFAULT_LOG_FILTER)?,
        }
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Load the config file and apply command-line and environment overrides.
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = Config::load_or_default(args.config.as_deref())?;

    ConfigOverrides {
        bind: args.bind.clone(),
        database: args.database.clone(),
        disable_collector: args.no_collector,
    }
    .apply(&mut config);

    config.validate()?;
    Ok(config)
}

fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(default_config_path);
    if path.exists() && !force {
        bail!(
            "Config file {} already exists. Use --force to overwrite.",
            path.display()
        );
    }

    Config::default().save(&path)?;
    println!("✓ Wrote default configuration to {}", path.display());
    Ok(())
}

fn adapter_factory(config: &Config) -> AdapterFactory {
    AdapterFactory::with_builtin(AdapterOptions::with_timeout(
        config.collector.fetch_timeout(),
    ))
}

fn confirm(prompt: String, force: bool) -> anyhow::Result<bool> {
    if force {
        return Ok(true);
    }
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("Cannot prompt for confirmation; use --force in non-interactive mode")
}

async fn handle_device_action(action: &DeviceAction, config: &Config) -> anyhow::Result<()> {
    let store = Store::open(&config.storage.path)?;

    match action {
        DeviceAction::Add {
            provider,
            name,
            token,
            location,
            entries,
            validate,
            force,
        } => {
            let entries = entries
                .iter()
                .map(|raw| devices::parse_config_entry(raw))
                .collect::<Result<Vec<_>, _>>()?;
            let request = NewDevice::new(
                name.as_str(),
                provider.as_str(),
                devices::build_config(token.clone(), location.clone(), entries),
            );

            if *validate {
                println!("Validating device connection...");
            }
            let added = devices::add_device(
                &store,
                &adapter_factory(config),
                request,
                *validate,
                *force,
            )
            .await?;

            match added.validation {
                Validation::Passed(_) => println!("✓ Connection validation successful!"),
                Validation::FailedForced => {
                    println!("✗ Connection validation failed - no data received")
                }
                Validation::Skipped => {}
            }
            println!(
                "✓ Device '{}' added successfully (ID: {})",
                added.device.name, added.device.id
            );
        }
        DeviceAction::List { all } => {
            let list = store.list_devices(*all)?;
            if list.is_empty() {
                println!("{}", devices::empty_list_message(*all));
            } else {
                println!("{}", devices::render_device_table(&list));
            }
        }
        DeviceAction::Remove { device_id, force } => {
            let device = devices::find_device(&store, *device_id)?;
            let prompt = format!("Remove device '{}' (ID: {})?", device.name, device.id);
            if !confirm(prompt, *force)? {
                println!("Cancelled.");
                return Ok(());
            }
            let removed = devices::remove_device(&store, *device_id)?;
            println!("✓ Device '{}' removed successfully", removed.name);
        }
        DeviceAction::Deactivate { device_id, force } => {
            let device = devices::find_device(&store, *device_id)?;
            if !device.active {
                println!(
                    "Device '{}' (ID: {}) is already inactive",
                    device.name, device.id
                );
                return Ok(());
            }
            let prompt = format!(
                "Deactivate device '{}' (ID: {})? Data collection will stop but history will be preserved.",
                device.name, device.id
            );
            if !confirm(prompt, *force)? {
                println!("Cancelled.");
                return Ok(());
            }
            report_state_change(devices::set_active(&store, *device_id, false)?);
        }
        DeviceAction::Activate { device_id } => {
            report_state_change(devices::set_active(&store, *device_id, true)?);
        }
        DeviceAction::Test { device_id } => {
            let device = devices::find_active_device(&store, *device_id)?;
            println!(
                "Testing device '{}' (Provider: {})...",
                device.name, device.provider
            );
            match devices::test_device(&adapter_factory(config), &device).await? {
                Some(reading) => {
                    println!("✓ Connection successful!");
                    println!("Sample data: {}", reading);
                }
                None => println!("✗ Connection failed - no data received"),
            }
        }
    }

    Ok(())
}

fn report_state_change(change: StateChange) {
    match change {
        StateChange::Changed(device) if device.active => {
            println!("✓ Device '{}' activated successfully", device.name);
            println!("  Data collection will resume.");
        }
        StateChange::Changed(device) => {
            println!("✓ Device '{}' deactivated successfully", device.name);
            println!("  Data collection stopped. Historical data preserved.");
        }
        StateChange::Unchanged(device) => {
            let state = if device.active { "active" } else { "inactive" };
            println!(
                "Device '{}' (ID: {}) is already {}",
                device.name, device.id, state
            );
        }
    }
}

async fn run_server(args: Args) -> anyhow::Result<()> {
    if args
        .secret_key
        .as_deref()
        .is_none_or(|key| key.trim().is_empty())
    {
        bail!("SECRET_KEY environment variable must be set");
    }

    let config = load_config(&args)?;

    let store = Store::open(&config.storage.path)?;
    let state = AppState::new(store, config.clone());

    if config.collector.enabled {
        ensure_started(&state);
    } else {
        info!("Background poller disabled");
    }

    let app = Router::new()
        .merge(api::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr: SocketAddr = config.server.bind.parse()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
