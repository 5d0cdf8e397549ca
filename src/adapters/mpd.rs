//! MPD (Music Player Daemon) protocol client
//!
//! Implements the line-based TCP protocol (default port 6600).
//! Documentation: https://mpd.readthedocs.io/en/latest/protocol.html
//!
//! A response is a run of `key: value` lines closed by `OK`, or a single
//! `ACK [error@command_listNum] {command} message` line. The same client type
//! serves both the command connection and the blocking `idle` watch session;
//! the two are always separate sockets.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::adapters::traits::{PlayerConnector, PlayerControl, PlayerWatch};
use crate::player::{PlayerStatus, TrackInfo};

pub const DEFAULT_ADDRESS: &str = "localhost:6600";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);
const GREETING_PREFIX: &str = "OK MPD ";
/// Subsystems the watch session waits on
pub const WATCH_SUBSYSTEMS: &[&str] = &["player", "playlist"];

/// MPD client errors
#[derive(Debug, thiserror::Error)]
pub enum MpdError {
    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection closed by server")]
    Closed,

    /// The server rejected a command; the connection itself is still usable
    #[error("server error {code} in {{{command}}}: {message}")]
    Ack {
        code: u32,
        command: String,
        message: String,
    },

    #[error("connection already failed")]
    Broken,
}

impl MpdError {
    /// Whether the error leaves the socket in an unknown state
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::Ack { .. })
    }
}

/// Parse the remainder of an `ACK ` line: `[50@0] {play} No such song`
pub fn parse_ack(rest: &str) -> MpdError {
    let malformed = || MpdError::Protocol(format!("malformed ACK: {}", rest));

    let Some(rest) = rest.strip_prefix('[') else {
        return malformed();
    };
    let Some((code_part, rest)) = rest.split_once(']') else {
        return malformed();
    };
    let code = code_part
        .split('@')
        .next()
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);

    let rest = rest.trim_start();
    let (command, message) = match rest.strip_prefix('{').and_then(|r| r.split_once('}')) {
        Some((command, message)) => (command.to_string(), message.trim().to_string()),
        None => (String::new(), rest.to_string()),
    };

    MpdError::Ack {
        code,
        command,
        message,
    }
}

/// Quote a command argument when it contains whitespace or quotes
pub fn quote_arg(arg: &str) -> String {
    if !arg.is_empty()
        && !arg
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\\' || c == '\'')
    {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// One MPD protocol connection
pub struct MpdClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    version: String,
    broken: bool,
}

impl MpdClient {
    /// Connect, read the greeting and authenticate when a password is given
    pub async fn connect(addr: &str, password: Option<&str>) -> Result<Self, MpdError> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| MpdError::Timeout("connect"))?
            .map_err(|source| MpdError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            version: String::new(),
            broken: false,
        };

        let greeting = client.read_line(Some(RESPONSE_TIMEOUT)).await?;
        client.version = greeting
            .strip_prefix(GREETING_PREFIX)
            .ok_or_else(|| MpdError::Protocol(format!("unexpected greeting: {}", greeting)))?
            .to_string();

        if let Some(password) = password {
            client
                .command(&format!("password {}", quote_arg(password)))
                .await?;
        }

        tracing::debug!("Connected to MPD {} at {}", client.version, addr);
        Ok(client)
    }

    /// Protocol version announced in the greeting
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Send a command and collect its `key: value` response
    pub async fn command(&mut self, command: &str) -> Result<Vec<(String, String)>, MpdError> {
        self.exchange(command, Some(RESPONSE_TIMEOUT)).await
    }

    /// Block until one of the subsystems changes. No timeout: the server
    /// answers only when something happens.
    pub async fn idle(&mut self, subsystems: &[&str]) -> Result<Vec<String>, MpdError> {
        let command = if subsystems.is_empty() {
            "idle".to_string()
        } else {
            format!("idle {}", subsystems.join(" "))
        };

        let pairs = self.exchange(&command, None).await?;
        Ok(pairs
            .into_iter()
            .filter(|(key, _)| key == "changed")
            .map(|(_, value)| value)
            .collect())
    }

    /// Say goodbye and shut the socket. The client is unusable afterwards.
    pub async fn close(&mut self) {
        if !self.broken {
            let _ = self.writer.write_all(b"close\n").await;
        }
        let _ = self.writer.shutdown().await;
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    async fn exchange(
        &mut self,
        command: &str,
        limit: Option<Duration>,
    ) -> Result<Vec<(String, String)>, MpdError> {
        if self.broken {
            return Err(MpdError::Broken);
        }

        let result = self.exchange_inner(command, limit).await;
        if let Err(ref e) = result {
            if e.is_transport() {
                self.broken = true;
            }
        }
        result
    }

    async fn exchange_inner(
        &mut self,
        command: &str,
        limit: Option<Duration>,
    ) -> Result<Vec<(String, String)>, MpdError> {
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        let mut pairs = Vec::new();
        loop {
            let line = self.read_line(limit).await?;
            if line == "OK" {
                return Ok(pairs);
            }
            if let Some(rest) = line.strip_prefix("ACK ") {
                return Err(parse_ack(rest));
            }
            match line.split_once(": ") {
                Some((key, value)) => pairs.push((key.to_string(), value.to_string())),
                None => return Err(MpdError::Protocol(format!("malformed line: {}", line))),
            }
        }
    }

    async fn read_line(&mut self, limit: Option<Duration>) -> Result<String, MpdError> {
        let mut line = String::new();
        let read = match limit {
            Some(limit) => timeout(limit, self.reader.read_line(&mut line))
                .await
                .map_err(|_| MpdError::Timeout("response"))??,
            None => self.reader.read_line(&mut line).await?,
        };

        if read == 0 {
            return Err(MpdError::Closed);
        }
        Ok(line.trim_end_matches(|c: char| c == '\r' || c == '\n').to_string())
    }

    async fn run(&mut self, command: &str) -> Result<()> {
        self.command(command).await?;
        Ok(())
    }
}

#[async_trait]
impl PlayerControl for MpdClient {
    async fn play(&mut self) -> Result<()> {
        self.run("play").await
    }

    async fn pause(&mut self) -> Result<()> {
        self.run("pause 1").await
    }

    async fn resume(&mut self) -> Result<()> {
        self.run("pause 0").await
    }

    async fn toggle_pause(&mut self) -> Result<()> {
        self.run("pause").await
    }

    async fn stop(&mut self) -> Result<()> {
        self.run("stop").await
    }

    async fn next(&mut self) -> Result<()> {
        self.run("next").await
    }

    async fn previous(&mut self) -> Result<()> {
        self.run("previous").await
    }

    async fn seek_relative(&mut self, seconds: i32) -> Result<()> {
        // A leading sign makes seekcur relative to the current position
        self.run(&format!("seekcur {:+}", seconds)).await
    }

    async fn ping(&mut self) -> Result<()> {
        self.run("ping").await
    }

    async fn status(&mut self) -> Result<PlayerStatus> {
        let pairs = self.command("status").await?;
        Ok(PlayerStatus::from_pairs(&pairs))
    }

    async fn current_track(&mut self) -> Result<TrackInfo> {
        let pairs = self.command("currentsong").await?;
        Ok(TrackInfo::from_pairs(&pairs))
    }

    fn is_broken(&self) -> bool {
        self.broken
    }

    async fn close(&mut self) {
        MpdClient::close(self).await
    }
}

#[async_trait]
impl PlayerWatch for MpdClient {
    async fn wait_for_change(&mut self) -> Result<Vec<String>> {
        Ok(self.idle(WATCH_SUBSYSTEMS).await?)
    }

    async fn close(&mut self) {
        MpdClient::close(self).await
    }
}

/// Opens command and watch connections to one MPD instance
#[derive(Debug, Clone)]
pub struct MpdConnector {
    address: String,
    password: Option<String>,
}

impl MpdConnector {
    pub fn new(address: impl Into<String>, password: Option<String>) -> Self {
        Self {
            address: address.into(),
            password,
        }
    }
}

#[async_trait]
impl PlayerConnector for MpdConnector {
    type Connection = MpdClient;
    type Watch = MpdClient;

    fn endpoint(&self) -> String {
        self.address.clone()
    }

    async fn connect(&self) -> Result<MpdClient> {
        Ok(MpdClient::connect(&self.address, self.password.as_deref()).await?)
    }

    async fn open_watch(&self) -> Result<MpdClient> {
        Ok(MpdClient::connect(&self.address, self.password.as_deref()).await?)
    }
}
