//! Player Connection Manager
//!
//! Owns the one command connection to the player. Every user (dispatcher,
//! watcher, keepalive) goes through the manager and holds the connection only
//! for the duration of a single guard, never across calls.
//!
//! The mutex is held for whole request/response exchanges: the protocol is
//! strictly sequential. Connecting happens outside the lock and only the
//! finished connection is swapped in, so no reader ever sees a half-built one
//! and no reader waits on a reconnect.

use anyhow::Result;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::adapters::traits::{PlayerConnector, PlayerControl};

/// Exclusive access to the live connection; released on drop
pub type PlayerGuard<'a, T> = MappedMutexGuard<'a, T>;

/// Result of a keepalive probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The connection answered
    Healthy,
    /// The connection failed and has been cleared
    Failed,
    /// There was no connection to probe
    Absent,
}

pub struct PlayerConnectionManager<C: PlayerConnector> {
    connector: C,
    slot: Mutex<Option<C::Connection>>,
}

impl<C: PlayerConnector> PlayerConnectionManager<C> {
    /// Create a manager in the absent state
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            slot: Mutex::new(None),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Current connection, or `None` when absent. Never reconnects.
    ///
    /// A connection that recorded a transport failure is closed and cleared
    /// here, so callers cannot reuse a stale one.
    pub async fn get(&self) -> Option<PlayerGuard<'_, C::Connection>> {
        let mut slot = self.slot.lock().await;
        discard_if_broken(&mut slot, &self.connector).await;
        MutexGuard::try_map(slot, |conn| conn.as_mut()).ok()
    }

    /// Replace the held connection, closing the previous one
    pub async fn set(&self, connection: Option<C::Connection>) {
        let previous = {
            let mut slot = self.slot.lock().await;
            std::mem::replace(&mut *slot, connection)
        };
        if let Some(mut previous) = previous {
            previous.close().await;
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.slot
            .lock()
            .await
            .as_ref()
            .is_some_and(|conn| !conn.is_broken())
    }

    /// Connect if absent. Returns `Ok(true)` when a new connection was made.
    ///
    /// The connect itself runs without the lock so `get()` keeps answering
    /// absent while the player is slow or unreachable. If another task
    /// installed a connection meanwhile, ours is closed and theirs is kept.
    pub async fn ensure_connected(&self) -> Result<bool> {
        {
            let mut slot = self.slot.lock().await;
            discard_if_broken(&mut slot, &self.connector).await;
            if slot.is_some() {
                return Ok(false);
            }
        }

        info!("Connecting to player at {}", self.connector.endpoint());
        let connection = self.connector.connect().await?;

        let extra = {
            let mut slot = self.slot.lock().await;
            discard_if_broken(&mut slot, &self.connector).await;
            if slot.is_some() {
                Some(connection)
            } else {
                *slot = Some(connection);
                None
            }
        };

        if let Some(mut extra) = extra {
            debug!("Player already reconnected elsewhere, closing duplicate");
            extra.close().await;
            return Ok(false);
        }
        info!("Player connected at {}", self.connector.endpoint());
        Ok(true)
    }

    /// Keepalive: ping the held connection, clearing it on failure.
    /// An absent connection is reported, not reconnected.
    pub async fn probe(&self) -> ProbeOutcome {
        let mut slot = self.slot.lock().await;
        discard_if_broken(&mut slot, &self.connector).await;

        let Some(conn) = slot.as_mut() else {
            return ProbeOutcome::Absent;
        };

        match conn.ping().await {
            Ok(()) => {
                debug!("Player keepalive ok");
                ProbeOutcome::Healthy
            }
            Err(e) => {
                warn!(
                    "Player keepalive to {} failed: {}",
                    self.connector.endpoint(),
                    e
                );
                if let Some(mut conn) = slot.take() {
                    conn.close().await;
                }
                ProbeOutcome::Failed
            }
        }
    }

    /// Close and clear the connection (shutdown path)
    pub async fn close(&self) {
        self.set(None).await;
    }
}

async fn discard_if_broken<C: PlayerConnector>(
    slot: &mut Option<C::Connection>,
    connector: &C,
) {
    if slot.as_ref().is_some_and(|conn| conn.is_broken()) {
        warn!("Player connection to {} lost", connector.endpoint());
        if let Some(mut conn) = slot.take() {
            conn.close().await;
        }
    }
}
