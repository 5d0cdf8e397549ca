//! State Watcher
//!
//! Keeps a dedicated watch session open against the player and republishes
//! the status whenever the player reports a change. The watch session is
//! never shared with the command connection; status reads go through the
//! [`PlayerConnectionManager`] like every other command.
//!
//! A sibling keepalive task probes the shared command connection on a fixed
//! interval so a silently dead connection is noticed even when nothing is
//! being dispatched.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::adapters::traits::{PlayerConnector, PlayerControl, PlayerWatch};
use crate::player::connection::{PlayerConnectionManager, ProbeOutcome};
use crate::player::{PlayerStatus, TrackInfo};
use crate::status::StatusPublisher;

pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(2);
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Connecting,
    Watching,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherSettings {
    /// Pause between a failed watch session and the next attempt
    pub reconnect_backoff: Duration,
    /// Interval of the command connection health probe
    pub keepalive_interval: Duration,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }
}

pub struct StateWatcher<C: PlayerConnector> {
    manager: Arc<PlayerConnectionManager<C>>,
    publisher: StatusPublisher,
    settings: WatcherSettings,
    span: Span,
    state: watch::Sender<WatchState>,
    /// (state, file) of the last published snapshot, for change logging
    last_seen: Option<(String, String)>,
}

impl<C: PlayerConnector> StateWatcher<C> {
    pub fn new(
        manager: Arc<PlayerConnectionManager<C>>,
        publisher: StatusPublisher,
        settings: WatcherSettings,
    ) -> Self {
        let (state, _) = watch::channel(WatchState::Connecting);
        Self {
            manager,
            publisher,
            settings,
            span: info_span!("watcher"),
            state,
            last_seen: None,
        }
    }

    /// Run the watcher and its keepalive inside `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Observe state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<WatchState> {
        self.state.subscribe()
    }

    /// Run until `shutdown` fires. Never returns early on player errors.
    pub async fn run(self, shutdown: CancellationToken) {
        let span = self.span.clone();
        self.run_loop(shutdown).instrument(span).await
    }

    async fn run_loop(mut self, shutdown: CancellationToken) {
        let keepalive = tokio::spawn(
            keepalive_loop(
                self.manager.clone(),
                self.settings.keepalive_interval,
                shutdown.clone(),
            )
            .instrument(info_span!(parent: &self.span, "keepalive")),
        );

        let endpoint = self.manager.connector().endpoint();
        loop {
            self.transition(WatchState::Connecting);
            let opened = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.manager.connector().open_watch() => result,
            };

            match opened {
                Ok(mut session) => {
                    self.transition(WatchState::Watching);
                    info!("Watching player at {}", endpoint);
                    let result = self.watch(&mut session, &shutdown).await;
                    session.close().await;
                    match result {
                        Ok(()) => break,
                        Err(e) => warn!("Watch session to {} lost: {}", endpoint, e),
                    }
                }
                Err(e) => warn!("Watch connection to {} failed: {}", endpoint, e),
            }

            self.transition(WatchState::Degraded);
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.reconnect_backoff) => {}
            }
        }

        if let Err(e) = keepalive.await {
            warn!("Keepalive task ended abnormally: {}", e);
        }
        info!("State watcher stopped");
    }

    /// Returns `Ok` on shutdown, `Err` when the session fails
    async fn watch(&mut self, session: &mut C::Watch, shutdown: &CancellationToken) -> Result<()> {
        // Refresh the retained status on every (re)connect
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = self.refresh() => {}
        }

        loop {
            let changed = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                result = session.wait_for_change() => result?,
            };
            debug!("Player changed: {}", changed.join(", "));
            // A reconnect to a hung player must not hold up shutdown
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = self.refresh() => {}
            }
        }
    }

    /// Read a fresh snapshot and publish it. Returns whether a publish happened.
    async fn refresh(&mut self) -> bool {
        match self.manager.ensure_connected().await {
            Ok(true) => info!("Reconnected to player for status refresh"),
            Ok(false) => {}
            Err(e) => {
                warn!("Player unavailable for status refresh: {}", e);
                return false;
            }
        }

        let snapshot = {
            let Some(mut conn) = self.manager.get().await else {
                warn!("Player connection gone before status refresh");
                return false;
            };
            fetch_snapshot(&mut *conn).await
        };

        match snapshot {
            Ok((status, track)) => {
                self.log_change(&status, &track);
                self.publisher.publish(&status, &track).await
            }
            Err(e) => {
                warn!("Status read failed: {}", e);
                false
            }
        }
    }

    fn log_change(&mut self, status: &PlayerStatus, track: &TrackInfo) {
        let current = (status.state.clone(), track.file.clone());
        if self.last_seen.as_ref() == Some(&current) {
            debug!("Player still {} ({})", status.state, status.time);
            return;
        }

        if track.is_empty() {
            info!("Player {}", status.state);
        } else if track.title.is_empty() {
            info!("Player {}: {}", status.state, track.file);
        } else {
            info!(
                "Player {}: {} - {} [{}]",
                status.state, track.artist, track.title, track.album
            );
        }
        self.last_seen = Some(current);
    }

    fn transition(&self, next: WatchState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("Watcher {:?} -> {:?}", previous, next);
        }
    }
}

async fn fetch_snapshot<P: PlayerControl>(conn: &mut P) -> Result<(PlayerStatus, TrackInfo)> {
    let status = conn.status().await?;
    let track = conn.current_track().await?;
    Ok((status, track))
}

async fn keepalive_tick<C: PlayerConnector>(manager: &PlayerConnectionManager<C>) {
    match manager.probe().await {
        ProbeOutcome::Healthy => {}
        // Cleared by the manager; next user reconnects lazily
        ProbeOutcome::Failed => {}
        ProbeOutcome::Absent => {
            info!(
                "No player connection, reconnecting to {}",
                manager.connector().endpoint()
            );
            if let Err(e) = manager.ensure_connected().await {
                warn!("Keepalive reconnect failed: {}", e);
            }
        }
    }
}

async fn keepalive_loop<C: PlayerConnector>(
    manager: Arc<PlayerConnectionManager<C>>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = keepalive_tick(&manager) => {}
        }
    }
    debug!("Keepalive stopped");
}
