//! Status Publisher
//!
//! Mirrors the player's state onto MQTT as a flat JSON object, published with
//! the retain flag so late subscribers immediately see the last known state.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::adapters::traits::StatusSink;
use crate::player::{PlayerStatus, TrackInfo};

pub const DEFAULT_STATUS_TOPIC: &str = "home/media/status";

/// Wire payload on the status topic. Every field is a string; missing values
/// are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    /// play, pause or stop
    pub state: String,
    /// "elapsed:total" seconds
    pub time: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub file: String,
}

impl StatusPayload {
    pub fn from_snapshot(status: &PlayerStatus, track: &TrackInfo) -> Self {
        Self {
            state: status.state.clone(),
            time: status.time.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            file: track.file.clone(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Serializes snapshots and hands them to the transport
#[derive(Clone)]
pub struct StatusPublisher {
    sink: Arc<dyn StatusSink>,
    topic: String,
}

impl StatusPublisher {
    pub fn new(sink: Arc<dyn StatusSink>, topic: impl Into<String>) -> Self {
        Self {
            sink,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish one snapshot. Failures are logged and dropped: the next change
    /// supersedes this one anyway.
    pub async fn publish(&self, status: &PlayerStatus, track: &TrackInfo) -> bool {
        let payload = StatusPayload::from_snapshot(status, track);
        let bytes = match payload.to_json() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Status encode error: {}", e);
                return false;
            }
        };

        match self.sink.publish_retained(&self.topic, bytes).await {
            Ok(()) => {
                tracing::debug!(
                    "Published status: {} {:?} ({})",
                    payload.state,
                    payload.title,
                    payload.time
                );
                true
            }
            Err(e) => {
                tracing::warn!("Status publish to {} failed: {}", self.topic, e);
                false
            }
        }
    }
}
