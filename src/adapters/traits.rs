use anyhow::Result;
use async_trait::async_trait;

use crate::player::{PlayerStatus, TrackInfo};

// =============================================================================
// Startable - Uniform adapter lifecycle trait
// =============================================================================

/// Trait for adapters that can be started/stopped uniformly.
/// `main` starts every producer through this and aborts on the first error,
/// since a producer that cannot start is a configuration problem.
#[async_trait]
pub trait Startable: Send + Sync {
    /// Adapter name (e.g., "input", "mqtt")
    fn name(&self) -> &'static str;

    /// Start the adapter's background loop.
    async fn start(&self) -> Result<()>;

    /// Stop the adapter gracefully.
    async fn stop(&self);
}

/// Macro to implement Startable trait with minimal boilerplate.
///
/// Adapters must implement:
/// - `async fn start_internal(&self) -> Result<()>`
/// - `async fn stop_internal(&self)`
///
/// Usage:
/// ```ignore
/// impl_startable!(InputAdapter, "input");
/// ```
#[macro_export]
macro_rules! impl_startable {
    ($adapter:ty, $name:literal) => {
        #[async_trait::async_trait]
        impl $crate::adapters::Startable for $adapter {
            fn name(&self) -> &'static str {
                $name
            }

            async fn start(&self) -> anyhow::Result<()> {
                self.start_internal().await
            }

            async fn stop(&self) {
                self.stop_internal().await
            }
        }
    };
}

// =============================================================================
// Player capabilities
// =============================================================================

/// Command connection to the media player.
///
/// Implementations record transport failures internally; once
/// [`PlayerControl::is_broken`] returns true the connection is never reused.
#[async_trait]
pub trait PlayerControl: Send + 'static {
    /// Start or resume playback at the current position
    async fn play(&mut self) -> Result<()>;
    async fn pause(&mut self) -> Result<()>;
    /// Leave the paused state (no-op when already playing)
    async fn resume(&mut self) -> Result<()>;
    /// Flip between paused and playing
    async fn toggle_pause(&mut self) -> Result<()>;
    async fn stop(&mut self) -> Result<()>;
    async fn next(&mut self) -> Result<()>;
    async fn previous(&mut self) -> Result<()>;
    /// Seek within the current track, relative to the current position
    async fn seek_relative(&mut self, seconds: i32) -> Result<()>;
    /// Lightweight health probe
    async fn ping(&mut self) -> Result<()>;
    async fn status(&mut self) -> Result<PlayerStatus>;
    async fn current_track(&mut self) -> Result<TrackInfo>;
    fn is_broken(&self) -> bool;
    async fn close(&mut self);
}

/// Dedicated connection that blocks until the player reports a change.
#[async_trait]
pub trait PlayerWatch: Send + 'static {
    /// Wait for the next change; returns the changed subsystems
    async fn wait_for_change(&mut self) -> Result<Vec<String>>;
    async fn close(&mut self);
}

/// Opens connections to one player endpoint.
#[async_trait]
pub trait PlayerConnector: Send + Sync + 'static {
    type Connection: PlayerControl;
    type Watch: PlayerWatch;

    /// Human readable endpoint for log lines
    fn endpoint(&self) -> String;

    async fn connect(&self) -> Result<Self::Connection>;

    async fn open_watch(&self) -> Result<Self::Watch>;
}

// =============================================================================
// Outbound capabilities
// =============================================================================

/// Transport for retained status messages
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish_retained(&self, topic: &str, payload: Vec<u8>) -> Result<()>;
}

/// Host-level side effects requested through the control vocabulary
#[async_trait]
pub trait SystemAction: Send + Sync {
    /// Ask the host to power off. Returns once the request is issued.
    async fn poweroff(&self) -> Result<()>;
}
