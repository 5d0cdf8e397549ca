//! Remote Input Adapter
//!
//! Reads raw `struct input_event` frames from a Linux event device
//! (`/dev/input/eventN`) and turns media key presses into [`ControlEvent`]s.
//!
//! Frame layout (native endianness):
//! ```text
//! struct timeval time;   // 2 x c_long
//! __u16 type;
//! __u16 code;
//! __s32 value;           // 0 release, 1 press, 2 autorepeat
//! ```

use anyhow::{Context, Result};
use std::ffi::c_long;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{self, ready, Poll};
use std::time::Duration;
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::bus::{Action, ControlEvent, EventBus, SEEK_STEP_SECS};

const TIMEVAL_SIZE: usize = 2 * std::mem::size_of::<c_long>();

/// Size of one `input_event`: 24 bytes on 64-bit targets, 16 on 32-bit
pub const FRAME_SIZE: usize = TIMEVAL_SIZE + 8;

pub const EV_KEY: u16 = 0x01;
pub const KEY_PRESS: i32 = 1;

// linux/input-event-codes.h
pub const KEY_FORWARD: u16 = 159;
pub const KEY_NEXTSONG: u16 = 163;
pub const KEY_PLAYPAUSE: u16 = 164;
pub const KEY_PREVIOUSSONG: u16 = 165;
pub const KEY_STOPCD: u16 = 166;
pub const KEY_REWIND: u16 = 168;
pub const KEY_PLAYCD: u16 = 200;
pub const KEY_PAUSECD: u16 = 201;
pub const KEY_FASTFORWARD: u16 = 208;

/// Pause after a failed read before trying again
const READ_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// One decoded `input_event` (timestamp dropped)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInputEvent {
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl RawInputEvent {
    pub fn decode(frame: &[u8; FRAME_SIZE]) -> Self {
        let at = TIMEVAL_SIZE;
        Self {
            kind: u16::from_ne_bytes([frame[at], frame[at + 1]]),
            code: u16::from_ne_bytes([frame[at + 2], frame[at + 3]]),
            value: i32::from_ne_bytes([
                frame[at + 4],
                frame[at + 5],
                frame[at + 6],
                frame[at + 7],
            ]),
        }
    }

    #[cfg(test)]
    pub(crate) fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut frame = [0u8; FRAME_SIZE];
        let at = TIMEVAL_SIZE;
        frame[at..at + 2].copy_from_slice(&self.kind.to_ne_bytes());
        frame[at + 2..at + 4].copy_from_slice(&self.code.to_ne_bytes());
        frame[at + 4..at + 8].copy_from_slice(&self.value.to_ne_bytes());
        frame
    }
}

/// Action and value bound to a remote key, `None` for keys we don't handle
pub fn map_key(code: u16) -> Option<(Action, i32)> {
    let mapped = match code {
        KEY_NEXTSONG => (Action::Next, 0),
        KEY_PREVIOUSSONG => (Action::Prev, 0),
        KEY_PLAYPAUSE => (Action::Toggle, 0),
        KEY_STOPCD => (Action::Stop, 0),
        KEY_PLAYCD => (Action::Play, 0),
        KEY_PAUSECD => (Action::Pause, 0),
        KEY_REWIND => (Action::Seek, -SEEK_STEP_SECS),
        KEY_FORWARD | KEY_FASTFORWARD => (Action::Seek, SEEK_STEP_SECS),
        _ => return None,
    };
    Some(mapped)
}

/// Only key press edges produce events; releases and autorepeat are dropped
pub fn translate(raw: &RawInputEvent) -> Option<ControlEvent> {
    if raw.kind != EV_KEY || raw.value != KEY_PRESS {
        return None;
    }
    map_key(raw.code).map(|(action, value)| ControlEvent::input(action, value))
}

/// Event device opened non-blocking and driven by the reactor.
///
/// Reads are readiness based, so dropping a pending read (on shutdown) leaves
/// nothing running in the blocking pool.
pub struct EventDevice {
    fd: AsyncFd<File>,
}

impl EventDevice {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(path)
            .with_context(|| format!("Failed to open input device {}", path.display()))?;
        let fd = AsyncFd::new(file)
            .with_context(|| format!("Failed to poll input device {}", path.display()))?;
        Ok(Self { fd })
    }
}

impl AsyncRead for EventDevice {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.fd.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|fd| fd.get_ref().read(unfilled)) {
                Ok(Ok(read)) => {
                    buf.advance(read);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                // Spurious readiness, wait again
                Err(_would_block) => continue,
            }
        }
    }
}

/// Remote control input adapter
pub struct InputAdapter {
    device: PathBuf,
    bus: EventBus,
    shutdown: CancellationToken,
    span: Span,
}

impl InputAdapter {
    pub fn new(device: impl Into<PathBuf>, bus: EventBus) -> Self {
        Self {
            device: device.into(),
            bus,
            shutdown: CancellationToken::new(),
            span: info_span!("input"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    async fn start_internal(&self) -> Result<()> {
        let device = EventDevice::open(&self.device)?;

        info!(parent: &self.span, "Listening on input device: {}", self.device.display());

        tokio::spawn(
            read_loop(
                device,
                self.bus.clone(),
                self.shutdown.clone(),
                READ_ERROR_PAUSE,
            )
            .instrument(self.span.clone()),
        );
        Ok(())
    }

    async fn stop_internal(&self) {
        self.shutdown.cancel();
        info!(parent: &self.span, "Input adapter stopped");
    }
}

crate::impl_startable!(InputAdapter, "input");

/// Read frames until shutdown or until the dispatcher is gone.
///
/// Read errors, including end of file when the device is unplugged, are
/// logged and retried after `error_pause`.
pub async fn read_loop<R>(
    mut reader: R,
    bus: EventBus,
    shutdown: CancellationToken,
    error_pause: Duration,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut frame = [0u8; FRAME_SIZE];

    loop {
        let read = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = reader.read_exact(&mut frame) => result,
        };

        match read {
            Ok(_) => {
                let raw = RawInputEvent::decode(&frame);
                let Some(event) = translate(&raw) else {
                    continue;
                };
                debug!("Key {} -> {}", raw.code, event);

                let sent = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    sent = bus.publish(event) => sent,
                };
                if let Err(e) = sent {
                    warn!("{}", e);
                    break;
                }
            }
            Err(e) => {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    warn!("Input device returned end of file");
                } else {
                    warn!("Error reading input: {}", e);
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(error_pause) => {}
                }
            }
        }
    }
    debug!("Input read loop stopped");
}
