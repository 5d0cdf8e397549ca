//! Control surfaces (remote input, MQTT), the MPD protocol client and host actions

pub mod input;
pub mod mpd;
pub mod mqtt;
pub mod system;
pub mod traits;

pub use traits::{
    PlayerConnector, PlayerControl, PlayerWatch, Startable, StatusSink, SystemAction,
};
