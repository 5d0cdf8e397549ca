//! Configuration management
//!
//! Layers, lowest precedence first: built-in defaults, the TOML config file,
//! `MRB_*` environment variables (`__` separates sections, e.g.
//! `MRB_MQTT__URI`), then command-line flags.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::adapters::mpd::DEFAULT_ADDRESS as DEFAULT_MPD_ADDRESS;
use crate::adapters::mqtt::{
    MqttSettings, DEFAULT_CLIENT_ID, DEFAULT_CONTROL_TOPIC, DEFAULT_URI as DEFAULT_MQTT_URI,
};
use crate::adapters::system::{HostCommand, DEFAULT_POWEROFF_COMMAND};
use crate::dispatcher::ToggleBehavior;
use crate::player::WatcherSettings;
use crate::status::DEFAULT_STATUS_TOPIC;

const APP_DIR_NAME: &str = "mpd-remote-bridge";
const ENV_PREFIX: &str = "MRB";

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting '{field}'")]
    Missing { field: &'static str },

    #[error("invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("config file {} not found", .0.display())]
    FileNotFound(PathBuf),

    #[error(transparent)]
    Load(#[from] ::config::ConfigError),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub mpd: MpdConfig,
    pub input: InputConfig,
    pub watcher: WatcherConfig,
    pub player: PlayerConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub uri: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub control_topic: String,
    pub status_topic: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_MQTT_URI.to_string(),
            username: None,
            password: None,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            control_topic: DEFAULT_CONTROL_TOPIC.to_string(),
            status_topic: DEFAULT_STATUS_TOPIC.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MpdConfig {
    pub address: String,
    pub password: Option<String>,
}

impl Default for MpdConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_MPD_ADDRESS.to_string(),
            password: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Event device of the remote, e.g. `/dev/input/event3`
    pub device: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub reconnect_backoff_ms: u64,
    pub keepalive_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        let defaults = WatcherSettings::default();
        Self {
            reconnect_backoff_ms: defaults.reconnect_backoff.as_millis() as u64,
            keepalive_secs: defaults.keepalive_interval.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub toggle: ToggleBehavior,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub poweroff_command: Vec<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            poweroff_command: DEFAULT_POWEROFF_COMMAND
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Values supplied on the command line; `None` leaves lower layers alone
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_file: Option<PathBuf>,
    pub mqtt_uri: Option<String>,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mpd_address: Option<String>,
    pub mpd_password: Option<String>,
    pub input_device: Option<PathBuf>,
    pub true_toggle: bool,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.input.device {
            None => return Err(ConfigError::Missing { field: "input.device" }),
            Some(device) if device.as_os_str().is_empty() => {
                return Err(ConfigError::Missing { field: "input.device" })
            }
            Some(_) => {}
        }

        for (field, value) in [
            ("mqtt.uri", &self.mqtt.uri),
            ("mqtt.client_id", &self.mqtt.client_id),
            ("mqtt.control_topic", &self.mqtt.control_topic),
            ("mqtt.status_topic", &self.mqtt.status_topic),
            ("mpd.address", &self.mpd.address),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing { field });
            }
        }

        crate::adapters::mqtt::parse_broker_uri(&self.mqtt.uri).map_err(|e| {
            ConfigError::Invalid {
                field: "mqtt.uri",
                reason: e.to_string(),
            }
        })?;

        if self.watcher.reconnect_backoff_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "watcher.reconnect_backoff_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.watcher.keepalive_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "watcher.keepalive_secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        HostCommand::from_argv(&self.system.poweroff_command).map_err(|e| {
            ConfigError::Invalid {
                field: "system.poweroff_command",
                reason: e.to_string(),
            }
        })?;

        Ok(())
    }

    pub fn input_device(&self) -> Option<&Path> {
        self.input.device.as_deref()
    }

    pub fn mqtt_settings(&self) -> MqttSettings {
        MqttSettings {
            uri: self.mqtt.uri.clone(),
            client_id: self.mqtt.client_id.clone(),
            username: non_empty(&self.mqtt.username),
            password: non_empty(&self.mqtt.password),
            control_topic: self.mqtt.control_topic.clone(),
        }
    }

    pub fn mpd_password(&self) -> Option<String> {
        non_empty(&self.mpd.password)
    }

    pub fn watcher_settings(&self) -> WatcherSettings {
        WatcherSettings {
            reconnect_backoff: Duration::from_millis(self.watcher.reconnect_backoff_ms),
            keepalive_interval: Duration::from_secs(self.watcher.keepalive_secs),
        }
    }

    pub fn poweroff_command(&self) -> anyhow::Result<HostCommand> {
        HostCommand::from_argv(&self.system.poweroff_command)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.is_empty())
}

/// Get config directory (`MRB_CONFIG_DIR`, XDG or `~/.config`)
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MRB_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join(APP_DIR_NAME);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join(APP_DIR_NAME);
    }

    // Fallback to current directory
    PathBuf::from(".")
}

/// Build and validate the effective configuration
pub fn load_config(overrides: &Overrides) -> Result<Config, ConfigError> {
    let file_source = match &overrides.config_file {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            ::config::File::from(path.as_path()).required(true)
        }
        None => {
            let default_path = get_config_dir().join("config");
            ::config::File::with_name(&default_path.to_string_lossy()).required(false)
        }
    };

    let mut builder = ::config::Config::builder()
        .add_source(file_source)
        // MRB_MQTT__URI, MRB_INPUT__DEVICE, ...
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(" ")
                .with_list_parse_key("system.poweroff_command"),
        );

    if let Some(uri) = &overrides.mqtt_uri {
        builder = builder.set_override("mqtt.uri", uri.as_str())?;
    }
    if let Some(user) = &overrides.mqtt_username {
        builder = builder.set_override("mqtt.username", user.as_str())?;
    }
    if let Some(pass) = &overrides.mqtt_password {
        builder = builder.set_override("mqtt.password", pass.as_str())?;
    }
    if let Some(address) = &overrides.mpd_address {
        builder = builder.set_override("mpd.address", address.as_str())?;
    }
    if let Some(pass) = &overrides.mpd_password {
        builder = builder.set_override("mpd.password", pass.as_str())?;
    }
    if let Some(device) = &overrides.input_device {
        builder = builder.set_override("input.device", device.to_string_lossy().into_owned())?;
    }
    if overrides.true_toggle {
        builder = builder.set_override("player.toggle", "toggle")?;
    }

    let config: Config = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}
