// Serial Monitor - stream line-delimited text from a serial port and send lines back
//
// This is the library crate containing the link logic, state and GUI wiring.
// The binary crate (main.rs) provides the entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{AppState, BaudRate, ConnectionStatus, LinkConfig, MonitorSettings};
pub use services::{LinkError, LinkSession, MonitorShell, SystemPorts};
pub use state::{StateChange, StateManager, TranscriptCursor};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
