//! TOML configuration for the emulator process.
//!
//! Read from `--config <path>` or from the platform config directory:
//! - Linux:    `$XDG_CONFIG_HOME/vhal-emulator/config.toml` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/vhal-emulator/config.toml`
//! - Windows:  `%APPDATA%\vhal-emulator\config.toml`
//!
//! ```toml
//! [emulator]
//! log_level = "info"
//! runtime_mode = "host"          # or "virtualized-guest"
//!
//! [socket]
//! enabled = true
//! bind_address = "127.0.0.1"
//! port = 33452
//!
//! [pipe]
//! device_path = "/dev/vhal-emulator-pipe"
//!
//! [policy]
//! suppressed_properties = [0x11400A01]
//! suppress_in = ["virtualized-guest"]
//!
//! [[initial_values]]
//! prop_id = 0x11400400
//! payload = { int32 = [8] }
//!
//! [[replay_events]]
//! prop_id = 0x11200402
//! payload = { int32 = [1] }
//! ```
//!
//! Every field has a default, so a missing file or a missing section yields a
//! working configuration.

use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vhal_core::domain::property::{id_serde, ids};
use vhal_core::PropertyValue;

use crate::application::write_policy::{RuntimeMode, SuppressionPolicy, WritePolicy};
use crate::infrastructure::channel::pipe::DEFAULT_DEVICE_PATH;
use crate::infrastructure::channel::socket::DEFAULT_PORT;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level emulator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub emulator: EmulatorConfig,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub pipe: PipeConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Values applied on top of the built-in catalogue at startup.
    #[serde(default)]
    pub initial_values: Vec<PropertyValue>,
    /// Vehicle bus updates published once the gateway is listening. Unlike
    /// initial values they reach the event sink and every channel.
    #[serde(default)]
    pub replay_events: Vec<PropertyValue>,
}

/// Process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmulatorConfig {
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub runtime_mode: RuntimeMode,
}

/// TCP channel for host tooling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SocketConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Pipe channel; only opened in a virtualized guest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipeConfig {
    #[serde(default = "default_device_path")]
    pub device_path: PathBuf,
}

/// Which HAL-client writes are acknowledged without being applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyConfig {
    #[serde(
        default = "default_suppressed_properties",
        deserialize_with = "id_serde::deserialize_list"
    )]
    pub suppressed_properties: Vec<i32>,
    #[serde(default = "default_suppress_in")]
    pub suppress_in: Vec<RuntimeMode>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_device_path() -> PathBuf {
    PathBuf::from(DEFAULT_DEVICE_PATH)
}
fn default_suppressed_properties() -> Vec<i32> {
    vec![ids::DISPLAY_BRIGHTNESS]
}
fn default_suppress_in() -> Vec<RuntimeMode> {
    vec![RuntimeMode::VirtualizedGuest]
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            runtime_mode: RuntimeMode::default(),
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            device_path: default_device_path(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            suppressed_properties: default_suppressed_properties(),
            suppress_in: default_suppress_in(),
        }
    }
}

impl SocketConfig {
    /// The address the socket channel listens on.
    ///
    /// # Errors
    ///
    /// Returns [`AddrParseError`] if `bind_address` is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        let ip: IpAddr = self.bind_address.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl AppConfig {
    /// Builds the write policy for the configured runtime mode.
    pub fn write_policy(&self) -> WritePolicy {
        WritePolicy::new(
            self.emulator.runtime_mode,
            SuppressionPolicy::new(
                self.policy.suppressed_properties.iter().copied(),
                self.policy.suppress_in.iter().copied(),
            ),
        )
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the default location, returning
/// `AppConfig::default()` if the file does not exist.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("vhal-emulator"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("vhal-emulator"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("vhal-emulator")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
