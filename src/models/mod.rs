//! Data models for the serial monitor.
//!
//! - [`AppState`]: selector contents, connection indicator and transcript
//! - [`link`]: port descriptors, baud rates, link configuration and the events a session emits
//! - [`MonitorSettings`]: user settings loaded from `settings.yaml`
//!
//! State updates go through [`StateManager`](crate::state::StateManager) so the GUI is notified.

pub mod app_state;
pub mod config;
pub mod link;

pub use app_state::AppState;
pub use config::{LinkTiming, MonitorSettings};
pub use link::{
    BaudRate, ConnectionStatus, InvalidBaudRate, LinkConfig, LinkEvent, LinkEventKind, LinkState,
    PortDescriptor, SessionId,
};
