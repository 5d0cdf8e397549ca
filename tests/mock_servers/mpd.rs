#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Mock MPD for testing
//!
//! Speaks the line protocol: greeting, `key: value` responses terminated by
//! `OK`, `ACK` errors and a blocking `idle` that returns when the test calls
//! [`MockMpdServer::notify`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

pub const MOCK_VERSION: &str = "0.23.5";

/// Mock MPD state
#[derive(Debug, Clone)]
pub struct MockMpdState {
    pub state: String,
    pub elapsed: u32,
    pub duration: u32,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub file: String,
    pub password: Option<String>,
    /// Every command line received, in order
    pub commands: Vec<String>,
}

impl Default for MockMpdState {
    fn default() -> Self {
        Self {
            state: "stop".to_string(),
            elapsed: 0,
            duration: 0,
            title: String::new(),
            artist: String::new(),
            album: String::new(),
            file: String::new(),
            password: None,
            commands: Vec::new(),
        }
    }
}

struct Shared {
    state: RwLock<MockMpdState>,
    changes: broadcast::Sender<String>,
    kill: broadcast::Sender<()>,
    refuse: AtomicBool,
    accepted: AtomicUsize,
    open: AtomicUsize,
}

/// Mock MPD server
pub struct MockMpdServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    handle: JoinHandle<()>,
}

impl MockMpdServer {
    /// Start a mock MPD on a random port
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (changes, _) = broadcast::channel(16);
        let (kill, _) = broadcast::channel(4);
        let shared = Arc::new(Shared {
            state: RwLock::new(MockMpdState::default()),
            changes,
            kill,
            refuse: AtomicBool::new(false),
            accepted: AtomicUsize::new(0),
            open: AtomicUsize::new(0),
        });

        let shared_clone = shared.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        if shared_clone.refuse.load(Ordering::SeqCst) {
                            drop(stream);
                            continue;
                        }
                        let shared = shared_clone.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, shared).await;
                        });
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            addr,
            shared,
            handle,
        }
    }

    /// Get the server address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `host:port` string for the client
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub async fn set_password(&self, password: &str) {
        self.shared.state.write().await.password = Some(password.to_string());
    }

    /// Set now playing info
    pub async fn set_now_playing(&self, title: &str, artist: &str, album: &str, duration: u32) {
        let mut state = self.shared.state.write().await;
        state.state = "play".to_string();
        state.title = title.to_string();
        state.artist = artist.to_string();
        state.album = album.to_string();
        state.file = format!("{}/{}.flac", artist, title);
        state.elapsed = 0;
        state.duration = duration;
    }

    /// Commands received so far, across all connections
    pub async fn commands(&self) -> Vec<String> {
        self.shared.state.read().await.commands.clone()
    }

    pub async fn playback_state(&self) -> String {
        self.shared.state.read().await.state.clone()
    }

    /// Wake every connection blocked in `idle`
    pub fn notify(&self, subsystem: &str) {
        let _ = self.shared.changes.send(subsystem.to_string());
    }

    /// Drop every open connection, as a daemon restart would
    pub fn drop_connections(&self) {
        let _ = self.shared.kill.send(());
    }

    /// Close new connections right after accepting them
    pub fn set_refuse(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Connections that completed the greeting
    pub fn accepted(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    /// Connections currently open
    pub fn open_connections(&self) -> usize {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Stop the mock server
    pub async fn stop(self) {
        self.drop_connections();
        self.handle.abort();
    }
}

/// Handle a single TCP connection
async fn handle_connection(stream: TcpStream, shared: Arc<Shared>) {
    let mut changes = shared.changes.subscribe();
    let mut kill = shared.kill.subscribe();
    shared.open.fetch_add(1, Ordering::SeqCst);

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let greeting = format!("OK MPD {}\n", MOCK_VERSION);
    if writer.write_all(greeting.as_bytes()).await.is_ok() {
        shared.accepted.fetch_add(1, Ordering::SeqCst);
        serve(&mut reader, &mut writer, &shared, &mut changes, &mut kill).await;
    }

    shared.open.fetch_sub(1, Ordering::SeqCst);
}

async fn serve(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    shared: &Shared,
    changes: &mut broadcast::Receiver<String>,
    kill: &mut broadcast::Receiver<()>,
) {
    let mut authenticated = shared.state.read().await.password.is_none();
    let mut line = String::new();

    loop {
        line.clear();
        let read = tokio::select! {
            _ = kill.recv() => return,
            read = reader.read_line(&mut line) => read,
        };
        match read {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        let command = line.trim().to_string();
        shared.state.write().await.commands.push(command.clone());
        let name = command.split_whitespace().next().unwrap_or("").to_string();

        let response = if name == "close" {
            return;
        } else if name == "password" {
            let expected = shared.state.read().await.password.clone();
            let given = command
                .strip_prefix("password ")
                .map(|p| p.trim_matches('"').to_string());
            if expected.is_none() || expected == given {
                authenticated = true;
                "OK\n".to_string()
            } else {
                "ACK [3@0] {password} incorrect password\n".to_string()
            }
        } else if !authenticated {
            format!("ACK [4@0] {{{}}} you don't have permission for \"{}\"\n", name, name)
        } else if name == "idle" {
            let mut interrupt = String::new();
            let changed = tokio::select! {
                _ = kill.recv() => return,
                change = changes.recv() => match change {
                    Ok(subsystem) => subsystem,
                    Err(_) => "player".to_string(),
                },
                _ = reader.read_line(&mut interrupt) => {
                    // noidle or anything else ends the idle without changes;
                    // real MPD drops the connection for other commands
                    "OK\n".to_string()
                }
            };
            if changed == "OK\n" {
                changed
            } else {
                format!("changed: {}\nOK\n", changed)
            }
        } else {
            respond(&name, &command, shared).await
        };

        if writer.write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}

async fn respond(name: &str, command: &str, shared: &Shared) -> String {
    let mut state = shared.state.write().await;
    match name {
        "ping" => "OK\n".to_string(),
        "status" => {
            let mut out = format!("volume: 80\nrepeat: 0\nrandom: 0\nstate: {}\n", state.state);
            if state.state != "stop" {
                out.push_str(&format!(
                    "time: {}:{}\nelapsed: {}.000\nduration: {}.000\n",
                    state.elapsed, state.duration, state.elapsed, state.duration
                ));
            }
            out.push_str("OK\n");
            out
        }
        "currentsong" => {
            if state.file.is_empty() {
                "OK\n".to_string()
            } else {
                format!(
                    "file: {}\nArtist: {}\nTitle: {}\nAlbum: {}\nPos: 0\nId: 1\nOK\n",
                    state.file, state.artist, state.title, state.album
                )
            }
        }
        "play" => {
            state.state = "play".to_string();
            "OK\n".to_string()
        }
        "pause" => {
            state.state = match command.split_whitespace().nth(1) {
                Some("1") => "pause".to_string(),
                Some("0") => "play".to_string(),
                _ if state.state == "play" => "pause".to_string(),
                _ => "play".to_string(),
            };
            "OK\n".to_string()
        }
        "stop" => {
            state.state = "stop".to_string();
            "OK\n".to_string()
        }
        "next" | "previous" => "OK\n".to_string(),
        "seekcur" => {
            let arg = command.split_whitespace().nth(1).unwrap_or("");
            match arg.parse::<i64>() {
                Ok(offset) if arg.starts_with('+') || arg.starts_with('-') => {
                    state.elapsed = (state.elapsed as i64 + offset).max(0) as u32;
                    "OK\n".to_string()
                }
                Ok(position) => {
                    state.elapsed = position.max(0) as u32;
                    "OK\n".to_string()
                }
                Err(_) => "ACK [2@0] {seekcur} Number expected\n".to_string(),
            }
        }
        _ => format!("ACK [5@0] {{}} unknown command \"{}\"\n", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_mpd_starts_and_stops() {
        let server = MockMpdServer::start().await;
        assert!(server.addr().port() > 0);
        server.stop().await;
    }

    #[tokio::test]
    async fn mock_mpd_sends_greeting() {
        let server = MockMpdServer::start().await;
        let stream = TcpStream::connect(server.addr()).await.unwrap();
        let mut reader = BufReader::new(stream);
        let mut greeting = String::new();
        reader.read_line(&mut greeting).await.unwrap();
        assert_eq!(greeting, "OK MPD 0.23.5\n");
        server.stop().await;
    }
}
