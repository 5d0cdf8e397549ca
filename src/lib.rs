//! MPD Remote Bridge
//!
//! Home-automation bridge for a music player daemon:
//! - IR remote key presses (Linux evdev) and MQTT commands are normalized
//!   into one control vocabulary and dispatched to MPD
//! - MPD state changes are mirrored to MQTT as a retained JSON status
//! - the MPD connections reconnect on their own when the daemon restarts

pub mod adapters;
pub mod bus;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod player;
pub mod status;
