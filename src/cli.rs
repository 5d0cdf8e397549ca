//! Command-line flags. Every flag is optional and overrides the config file
//! and `MRB_*` environment.

use clap::Parser;
use std::path::PathBuf;

use crate::config::Overrides;

#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "mpd-remote-bridge",
    version,
    about = "Control MPD from an IR remote and MQTT, and mirror its state to MQTT"
)]
pub struct Cli {
    /// Config file (TOML); defaults to <config dir>/config.toml
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// MQTT server URI, e.g. tcp://localhost:1883
    #[arg(long = "mqtt-server", value_name = "URI")]
    pub mqtt_server: Option<String>,

    /// MQTT username (optional)
    #[arg(long = "mqtt-user")]
    pub mqtt_user: Option<String>,

    /// MQTT password (optional)
    #[arg(long = "mqtt-pass")]
    pub mqtt_pass: Option<String>,

    /// MPD address as host:port
    #[arg(long, value_name = "HOST:PORT")]
    pub mpd: Option<String>,

    /// MPD password (optional)
    #[arg(long = "mpd-password")]
    pub mpd_password: Option<String>,

    /// Input device of the remote, e.g. /dev/input/event3
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Make the play/pause key flip between playing and paused instead of
    /// always resuming
    #[arg(long = "true-toggle")]
    pub true_toggle: bool,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            config_file: self.config.clone(),
            mqtt_uri: self.mqtt_server.clone(),
            mqtt_username: self.mqtt_user.clone(),
            mqtt_password: self.mqtt_pass.clone(),
            mpd_address: self.mpd.clone(),
            mpd_password: self.mpd_password.clone(),
            input_device: self.input.clone(),
            true_toggle: self.true_toggle,
        }
    }
}
