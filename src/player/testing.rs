//! In-memory player used by unit tests

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::adapters::traits::{PlayerConnector, PlayerControl, PlayerWatch, StatusSink};
use crate::player::{PlayerStatus, TrackInfo};

type WatchItem = Result<Vec<String>, String>;

#[derive(Default)]
struct StubState {
    calls: Vec<String>,
    connects: usize,
    watch_opens: usize,
    closes: usize,
    fail_connect: bool,
    hang_connect: bool,
    fail_watch_open: bool,
    fail_commands: bool,
    status: PlayerStatus,
    track: TrackInfo,
    watch_sender: Option<mpsc::Sender<WatchItem>>,
}

/// Shared handle to a fake player; connections made through
/// [`StubPlayer::connector`] all record into the same state.
#[derive(Clone, Default)]
pub struct StubPlayer {
    state: Arc<Mutex<StubState>>,
}

impl StubPlayer {
    fn with<R>(&self, f: impl FnOnce(&mut StubState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn connector(&self) -> StubConnector {
        StubConnector {
            player: self.clone(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn connects(&self) -> usize {
        self.with(|s| s.connects)
    }

    pub fn watch_opens(&self) -> usize {
        self.with(|s| s.watch_opens)
    }

    pub fn closes(&self) -> usize {
        self.with(|s| s.closes)
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.with(|s| s.fail_connect = fail);
    }

    /// Hold every `connect` until released, like a server that never greets
    pub fn set_hang_connect(&self, hang: bool) {
        self.with(|s| s.hang_connect = hang);
    }

    pub fn set_fail_watch_open(&self, fail: bool) {
        self.with(|s| s.fail_watch_open = fail);
    }

    pub fn set_fail_commands(&self, fail: bool) {
        self.with(|s| s.fail_commands = fail);
    }

    pub fn set_now_playing(&self, status: PlayerStatus, track: TrackInfo) {
        self.with(|s| {
            s.status = status;
            s.track = track;
        });
    }

    /// Wake the open watch session with a change notification
    pub async fn notify(&self, subsystem: &str) {
        let sender = self.with(|s| s.watch_sender.clone());
        if let Some(sender) = sender {
            let _ = sender.send(Ok(vec![subsystem.to_string()])).await;
        }
    }

    /// Make the open watch session fail
    pub async fn fail_watch(&self) {
        let sender = self.with(|s| s.watch_sender.take());
        if let Some(sender) = sender {
            let _ = sender.send(Err("connection reset".to_string())).await;
        }
    }
}

pub struct StubConnector {
    player: StubPlayer,
}

#[async_trait]
impl PlayerConnector for StubConnector {
    type Connection = StubConnection;
    type Watch = StubWatch;

    fn endpoint(&self) -> String {
        "stub:6600".to_string()
    }

    async fn connect(&self) -> Result<StubConnection> {
        while self.player.with(|s| s.hang_connect) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.player.with(|s| {
            if s.fail_connect {
                return Err(anyhow!("connection refused"));
            }
            s.connects += 1;
            Ok(())
        })?;
        Ok(StubConnection {
            player: self.player.clone(),
            broken: false,
        })
    }

    async fn open_watch(&self) -> Result<StubWatch> {
        let (tx, rx) = mpsc::channel(16);
        self.player.with(|s| {
            if s.fail_watch_open {
                return Err(anyhow!("connection refused"));
            }
            s.watch_opens += 1;
            s.watch_sender = Some(tx);
            Ok(())
        })?;
        Ok(StubWatch { changes: rx })
    }
}

pub struct StubConnection {
    player: StubPlayer,
    broken: bool,
}

impl StubConnection {
    fn record(&mut self, call: String) -> Result<()> {
        if self.broken {
            return Err(anyhow!("connection already failed"));
        }
        let fail = self.player.with(|s| {
            s.calls.push(call);
            s.fail_commands
        });
        if fail {
            self.broken = true;
            return Err(anyhow!("broken pipe"));
        }
        Ok(())
    }
}

#[async_trait]
impl PlayerControl for StubConnection {
    async fn play(&mut self) -> Result<()> {
        self.record("play".into())
    }

    async fn pause(&mut self) -> Result<()> {
        self.record("pause".into())
    }

    async fn resume(&mut self) -> Result<()> {
        self.record("resume".into())
    }

    async fn toggle_pause(&mut self) -> Result<()> {
        self.record("toggle_pause".into())
    }

    async fn stop(&mut self) -> Result<()> {
        self.record("stop".into())
    }

    async fn next(&mut self) -> Result<()> {
        self.record("next".into())
    }

    async fn previous(&mut self) -> Result<()> {
        self.record("previous".into())
    }

    async fn seek_relative(&mut self, seconds: i32) -> Result<()> {
        self.record(format!("seek {:+}", seconds))
    }

    async fn ping(&mut self) -> Result<()> {
        self.record("ping".into())
    }

    async fn status(&mut self) -> Result<PlayerStatus> {
        self.record("status".into())?;
        Ok(self.player.with(|s| s.status.clone()))
    }

    async fn current_track(&mut self) -> Result<TrackInfo> {
        self.record("currentsong".into())?;
        Ok(self.player.with(|s| s.track.clone()))
    }

    fn is_broken(&self) -> bool {
        self.broken
    }

    async fn close(&mut self) {
        self.broken = true;
        self.player.with(|s| s.closes += 1);
    }
}

pub struct StubWatch {
    changes: mpsc::Receiver<WatchItem>,
}

#[async_trait]
impl PlayerWatch for StubWatch {
    async fn wait_for_change(&mut self) -> Result<Vec<String>> {
        match self.changes.recv().await {
            Some(Ok(changed)) => Ok(changed),
            Some(Err(e)) => Err(anyhow!(e)),
            None => Err(anyhow!("watch connection closed")),
        }
    }

    async fn close(&mut self) {
        self.changes.close();
    }
}

/// Status sink that keeps every published message
#[derive(Clone, Default)]
pub struct RecordingSink {
    published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingSink {
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn publish_retained(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if *self.fail.lock().unwrap() {
            return Err(anyhow!("not connected"));
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }
}
