//! vhal-emulator entry point.
//!
//! Loads the configuration, builds the property store and the transport
//! channels, and runs the hardware gateway until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! vhal-emulator [OPTIONS]
//!
//! Options:
//!   --config      <PATH>   Config file [default: platform config dir]
//!   --port        <PORT>   Socket channel port
//!   --bind        <ADDR>   Socket channel bind address
//!   --mode        <MODE>   host | virtualized-guest
//!   --pipe-device <PATH>   Pipe device opened in virtualized-guest mode
//! ```
//!
//! Every option can also be given through the environment variable listed in
//! `--help`. Options override the config file.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ InMemoryPropertyStore   -- built-in catalogue + configured initial values
//!  └─ ChannelSet
//!       ├─ SocketChannel      (tokio listener, host tooling)
//!       └─ PipeChannel        (reader thread, virtualized guest only)
//!  └─ HardwareGateway         -- owns the ProtocolServer, starts the channels
//!       └─ InProcessBus       (vehicle bus listener, fed by replay_events)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use vhal_core::PropertyValue;
use vhal_emulator::application::debug_dump::PropertyDumper;
use vhal_emulator::application::hardware_gateway::{HardwareGateway, PropertyEventSink};
use vhal_emulator::application::write_policy::RuntimeMode;
use vhal_emulator::infrastructure::bus::InProcessBus;
use vhal_emulator::infrastructure::channel::pipe::PipeChannel;
use vhal_emulator::infrastructure::channel::socket::SocketChannel;
use vhal_emulator::infrastructure::channel::{ChannelSet, TransportChannel};
use vhal_emulator::infrastructure::storage::config::{self, AppConfig};
use vhal_emulator::infrastructure::store::InMemoryPropertyStore;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Vehicle HAL emulator.
///
/// Serves the emulator protocol to host tooling over TCP and, in a
/// virtualized guest, to the co-located console over a pipe device.
#[derive(Debug, Parser)]
#[command(
    name = "vhal-emulator",
    about = "Vehicle HAL hardware gateway and emulator protocol server",
    version
)]
struct Cli {
    /// Configuration file. Defaults to `config.toml` in the platform config
    /// directory; a missing file means built-in defaults.
    #[arg(long, env = "VHAL_EMULATOR_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port of the socket channel.
    #[arg(long, env = "VHAL_EMULATOR_PORT")]
    port: Option<u16>,

    /// IP address the socket channel binds to.
    #[arg(long, env = "VHAL_EMULATOR_BIND")]
    bind: Option<String>,

    /// Runtime mode: `host` or `virtualized-guest`.
    #[arg(long, env = "VHAL_EMULATOR_MODE")]
    mode: Option<RuntimeMode>,

    /// Pipe device opened in virtualized-guest mode.
    #[arg(long, env = "VHAL_EMULATOR_PIPE")]
    pipe_device: Option<PathBuf>,
}

impl Cli {
    /// Loads the config file and applies the command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    fn into_app_config(self) -> anyhow::Result<AppConfig> {
        let mut cfg = match &self.config {
            Some(path) => config::load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => config::load_config().context("failed to load config")?,
        };

        if let Some(port) = self.port {
            cfg.socket.port = port;
        }
        if let Some(bind) = self.bind {
            cfg.socket.bind_address = bind;
        }
        if let Some(mode) = self.mode {
            cfg.emulator.runtime_mode = mode;
        }
        if let Some(device) = self.pipe_device {
            cfg.pipe.device_path = device;
        }
        Ok(cfg)
    }
}

/// Logs vehicle-side property changes in place of a HAL client.
struct LoggingEventSink;

impl PropertyEventSink for LoggingEventSink {
    fn on_property_event(&self, values: &[PropertyValue]) {
        for value in values {
            debug!(
                "property event {:#010x} area {}: {:?}",
                value.prop_id, value.area_id, value.payload
            );
        }
    }
}

/// Builds the channels enabled by `cfg`. Nothing is opened until the gateway
/// starts them.
fn build_channels(cfg: &AppConfig, runtime: tokio::runtime::Handle) -> anyhow::Result<ChannelSet> {
    let socket = if cfg.socket.enabled {
        let addr = cfg.socket.socket_addr().with_context(|| {
            format!(
                "invalid socket bind address: '{}:{}'",
                cfg.socket.bind_address, cfg.socket.port
            )
        })?;
        Some(Arc::new(SocketChannel::new(addr, runtime)) as Arc<dyn TransportChannel>)
    } else {
        info!("socket channel disabled");
        None
    };

    let pipe = match cfg.emulator.runtime_mode {
        RuntimeMode::VirtualizedGuest => {
            Some(Arc::new(PipeChannel::open(&cfg.pipe.device_path)) as Arc<dyn TransportChannel>)
        }
        RuntimeMode::Host => None,
    };

    Ok(ChannelSet::new(socket, pipe))
}

/// Publishes `events` on `bus` in order. Returns how many reached at least
/// one subscriber.
fn replay_events(bus: &InProcessBus, events: &[PropertyValue]) -> usize {
    events
        .iter()
        .filter(|value| bus.publish((*value).clone()) > 0)
        .count()
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Cli::parse().into_app_config()?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.emulator.log_level)),
        )
        .init();

    info!("vhal-emulator starting in {} mode", cfg.emulator.runtime_mode);

    let store = Arc::new(InMemoryPropertyStore::with_defaults());
    let seeded = store.seed(cfg.initial_values.iter().cloned());
    if !cfg.initial_values.is_empty() {
        info!("applied {seeded} of {} configured initial values", cfg.initial_values.len());
    }

    let channels = build_channels(&cfg, tokio::runtime::Handle::current())?;
    let gateway = HardwareGateway::new(
        store.clone(),
        channels,
        cfg.write_policy(),
        Arc::new(PropertyDumper::new(store)),
    )
    .context("failed to start hardware gateway")?;
    gateway.set_event_sink(Arc::new(LoggingEventSink));

    // Configured replay events are the only publisher on the in-process bus.
    let bus = Arc::new(InProcessBus::new());
    gateway.attach_listener(bus.clone());
    if !cfg.replay_events.is_empty() {
        let delivered = replay_events(&bus, &cfg.replay_events);
        info!("replayed {delivered} of {} vehicle bus events", cfg.replay_events.len());
    }

    info!("vhal-emulator ready. Press Ctrl-C to exit.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("shutdown signal received");
    drop(gateway);
    info!("vhal-emulator stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
