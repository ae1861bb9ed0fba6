use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// OS-visible identifier of a serial device (e.g. `/dev/ttyUSB0`, `COM3`).
///
/// Recreated on every enumeration; two descriptors are the same port when
/// their names are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortDescriptor {
    pub name: String,
}

impl PortDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Baud rates offered by the baud selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BaudRate {
    #[default]
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl BaudRate {
    /// All supported rates, in selector order
    pub const ALL: [BaudRate; 5] = [
        BaudRate::B9600,
        BaudRate::B19200,
        BaudRate::B38400,
        BaudRate::B57600,
        BaudRate::B115200,
    ];

    pub fn as_u32(self) -> u32 {
        match self {
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
        }
    }

    /// Position of this rate in [`BaudRate::ALL`] (the selector index)
    pub fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|b| *b == self)
            .unwrap_or_default()
    }

    /// Rate at a selector index, if the index is in range
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = InvalidBaudRate;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|b| b.as_u32() == value)
            .ok_or_else(|| InvalidBaudRate(value.to_string()))
    }
}

impl From<BaudRate> for u32 {
    fn from(baud: BaudRate) -> Self {
        baud.as_u32()
    }
}

impl FromStr for BaudRate {
    type Err = InvalidBaudRate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map_err(|_| InvalidBaudRate(s.to_string()))
            .and_then(BaudRate::try_from)
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// A baud rate outside the supported set
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported baud rate: {0}")]
pub struct InvalidBaudRate(pub String);

/// Device and baud rate for one link session. Fixed once the session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub port: String,
    pub baud_rate: BaudRate,
}

impl LinkConfig {
    pub fn new(port: impl Into<String>, baud_rate: BaudRate) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }
}

impl fmt::Display for LinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} baud", self.port, self.baud_rate)
    }
}

/// The binary indicator shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
}

impl ConnectionStatus {
    pub fn is_connected(self) -> bool {
        self == ConnectionStatus::Connected
    }

    pub fn label(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "Status: Connected",
            ConnectionStatus::Disconnected => "Status: Disconnected",
        }
    }
}

/// Per-session lifecycle. `Disconnected` is terminal; reconnecting needs a new session.
///
/// `Idle -> Connecting -> Connected -> Disconnected`, or `Connecting -> Disconnected`
/// when the open fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

impl LinkState {
    /// The state after moving to `next`, or `None` if the move is not allowed.
    ///
    /// Disconnecting is allowed from any state, including `Disconnected` itself.
    pub fn advance(self, next: LinkState) -> Option<LinkState> {
        use LinkState::*;
        match (self, next) {
            (Idle, Connecting) | (Connecting, Connected) | (_, Disconnected) => Some(next),
            _ => None,
        }
    }
}

/// Identifies which session produced a [`LinkEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Event emitted by a link session towards the shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    pub session: SessionId,
    pub kind: LinkEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEventKind {
    Connected,
    LineReceived(String),
    Disconnected,
}

impl LinkEvent {
    pub fn connected(session: SessionId) -> Self {
        Self {
            session,
            kind: LinkEventKind::Connected,
        }
    }

    pub fn line(session: SessionId, text: String) -> Self {
        Self {
            session,
            kind: LinkEventKind::LineReceived(text),
        }
    }

    pub fn disconnected(session: SessionId) -> Self {
        Self {
            session,
            kind: LinkEventKind::Disconnected,
        }
    }
}
