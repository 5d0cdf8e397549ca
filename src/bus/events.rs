//! Normalized control events shared by every input surface.
//!
//! Adapters translate their native input (remote key codes, MQTT payloads)
//! into a [`ControlEvent`], and the dispatcher is the only consumer.

use std::fmt;

/// Seek step carried by the remote's rewind/forward keys, in seconds.
pub const SEEK_STEP_SECS: i32 = 10;

// =============================================================================
// EventSource
// =============================================================================

/// Which surface produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    Input,
    Bus,
    System,
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Bus => write!(f, "bus"),
            Self::System => write!(f, "system"),
        }
    }
}

// =============================================================================
// Action
// =============================================================================

/// The closed command vocabulary.
///
/// `Unknown` keeps the raw text it was parsed from so that an action built
/// from a bus payload always renders back to exactly that payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Play,
    Pause,
    Toggle,
    Stop,
    Next,
    Prev,
    Seek,
    Poweroff,
    Unknown(String),
}

impl Action {
    /// Parse an action name. Matching is exact: the bus is a curated API,
    /// so `"Play"` or `"play\n"` are unknown rather than normalized.
    pub fn parse(name: &str) -> Self {
        match name {
            "play" => Self::Play,
            "pause" => Self::Pause,
            "toggle" => Self::Toggle,
            "stop" => Self::Stop,
            "next" => Self::Next,
            "prev" => Self::Prev,
            "seek" => Self::Seek,
            "poweroff" => Self::Poweroff,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Toggle => "toggle",
            Self::Stop => "stop",
            Self::Next => "next",
            Self::Prev => "prev",
            Self::Seek => "seek",
            Self::Poweroff => "poweroff",
            Self::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ControlEvent
// =============================================================================

/// A single normalized control request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEvent {
    source: EventSource,
    action: Action,
    /// Seek offset in seconds for [`Action::Seek`], zero otherwise
    value: i32,
}

impl ControlEvent {
    pub fn new(source: EventSource, action: Action, value: i32) -> Self {
        Self {
            source,
            action,
            value,
        }
    }

    /// Event from the remote-control input device
    pub fn input(action: Action, value: i32) -> Self {
        Self::new(EventSource::Input, action, value)
    }

    /// Event from an MQTT payload, taken verbatim as the action name
    pub fn bus(payload: &str) -> Self {
        Self::new(EventSource::Bus, Action::parse(payload), 0)
    }

    pub fn source(&self) -> EventSource {
        self.source
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn value(&self) -> i32 {
        self.value
    }
}

impl fmt::Display for ControlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.action == Action::Seek {
            write!(f, "{}:{} {:+}", self.source, self.action, self.value)
        } else {
            write!(f, "{}:{}", self.source, self.action)
        }
    }
}
