//! Dispatcher
//!
//! Single consumer of the event bus. Translates each [`ControlEvent`] into one
//! player command (or a host action) and executes it through the shared
//! connection manager. Events are never retried or queued: when the player is
//! not connected the event is dropped with a warning.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::adapters::traits::{PlayerConnector, PlayerControl, SystemAction};
use crate::bus::{Action, ControlEvent, EventReceiver};
use crate::player::PlayerConnectionManager;

/// What the `toggle` action sends to the player
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleBehavior {
    /// Always leave pause (`pause 0`); the remote's play/pause key resumes
    #[default]
    Resume,
    /// Flip paused/playing (`pause`)
    Toggle,
}

/// Result of handling a single event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Command sent and acknowledged by the player
    Dispatched,
    /// No player connection; event discarded
    Dropped,
    /// Unrecognized action
    Ignored,
    /// The player rejected the command or the connection failed
    Failed,
    /// Host-level action issued
    System,
}

pub struct Dispatcher<C: PlayerConnector> {
    manager: Arc<PlayerConnectionManager<C>>,
    system: Arc<dyn SystemAction>,
    toggle: ToggleBehavior,
    span: Span,
}

impl<C: PlayerConnector> Dispatcher<C> {
    pub fn new(manager: Arc<PlayerConnectionManager<C>>, system: Arc<dyn SystemAction>) -> Self {
        Self {
            manager,
            system,
            toggle: ToggleBehavior::default(),
            span: info_span!("dispatcher"),
        }
    }

    pub fn with_toggle(mut self, toggle: ToggleBehavior) -> Self {
        self.toggle = toggle;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Consume events until shutdown or until every producer is gone.
    /// An event already taken off the bus is always handled to completion.
    pub async fn run(&self, mut events: EventReceiver, shutdown: CancellationToken) -> u64 {
        let span = self.span.clone();
        async move {
            let mut handled = 0u64;
            loop {
                let event = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        debug!("Shutdown requested");
                        break;
                    }
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => {
                            info!("All event producers closed");
                            break;
                        }
                    },
                };

                self.dispatch(&event).await;
                handled += 1;
            }
            events.close();
            info!("Dispatcher stopped after {} events", handled);
            handled
        }
        .instrument(span)
        .await
    }

    pub async fn dispatch(&self, event: &ControlEvent) -> DispatchOutcome {
        info!("Event {}", event);

        match event.action() {
            Action::Poweroff => {
                match self.system.poweroff().await {
                    Ok(()) => info!("Poweroff requested by {}", event.source()),
                    Err(e) => error!("Poweroff failed: {}", e),
                }
                DispatchOutcome::System
            }
            Action::Unknown(raw) => {
                warn!("Unknown action {:?} from {}, ignoring", raw, event.source());
                DispatchOutcome::Ignored
            }
            action => {
                let Some(mut conn) = self.manager.get().await else {
                    warn!("Player not connected, dropping {}", event);
                    return DispatchOutcome::Dropped;
                };

                match self.execute(&mut *conn, action, event.value()).await {
                    Ok(()) => DispatchOutcome::Dispatched,
                    Err(e) => {
                        error!("{} failed: {}", event, e);
                        DispatchOutcome::Failed
                    }
                }
            }
        }
    }

    async fn execute<P: PlayerControl>(&self, conn: &mut P, action: &Action, value: i32) -> Result<()> {
        match action {
            Action::Play => conn.play().await,
            Action::Pause => conn.pause().await,
            Action::Toggle => match self.toggle {
                ToggleBehavior::Resume => conn.resume().await,
                ToggleBehavior::Toggle => conn.toggle_pause().await,
            },
            Action::Stop => conn.stop().await,
            Action::Next => conn.next().await,
            Action::Prev => conn.previous().await,
            Action::Seek => conn.seek_relative(value).await,
            Action::Poweroff | Action::Unknown(_) => Ok(()),
        }
    }
}
