//! Player state model, the shared command connection and the state watcher.

pub mod connection;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{PlayerConnectionManager, PlayerGuard, ProbeOutcome};
pub use watcher::{StateWatcher, WatchState, WatcherSettings};

/// Snapshot of the player's `status` response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerStatus {
    /// "play", "pause" or "stop"
    pub state: String,
    /// "elapsed:total" in whole seconds; empty when nothing is loaded
    pub time: String,
    pub elapsed: Option<f64>,
    pub duration: Option<f64>,
    pub volume: Option<i32>,
    pub song_id: Option<u32>,
}

impl PlayerStatus {
    /// Build from protocol `key: value` pairs; unknown keys are ignored
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut status = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "state" => status.state = value.clone(),
                "time" => status.time = value.clone(),
                "elapsed" => status.elapsed = value.parse().ok(),
                "duration" => status.duration = value.parse().ok(),
                "volume" => status.volume = value.parse().ok(),
                "songid" => status.song_id = value.parse().ok(),
                _ => {}
            }
        }
        status
    }
}

/// Snapshot of the player's `currentsong` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Library-relative path or stream URL, useful when tags are missing
    pub file: String,
}

impl TrackInfo {
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut track = Self::default();
        for (key, value) in pairs {
            // Multi-valued tags repeat the key; keep the first value
            let slot = match key.as_str() {
                "Title" => &mut track.title,
                "Artist" => &mut track.artist,
                "Album" => &mut track.album,
                "file" => &mut track.file,
                _ => continue,
            };
            if slot.is_empty() {
                *slot = value.clone();
            }
        }
        track
    }

    pub fn is_empty(&self) -> bool {
        self.file.is_empty()
    }
}
