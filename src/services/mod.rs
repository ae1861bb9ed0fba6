//! Services module - serial link logic with no dependency on the UI layer.
//!
//! # Components
//!
//! - [`ports`]: the [`PortRegistry`] seam and [`SystemPorts`], which enumerates and
//!   opens the host's devices through the `serialport` crate
//! - [`framing`]: [`LineFramer`], newline framing and UTF-8 decoding of inbound bytes
//! - [`link`]: [`LinkSession`], one open port plus the reader thread that owns its
//!   handle. Reads and writes both happen on that thread.
//! - [`shell`]: [`MonitorShell`], the connect/disconnect, send and clear operations
//!   behind the window's buttons
//!
//! # Threading
//!
//! Each session runs one dedicated blocking reader thread. It reports to the shell
//! over a `std::sync::mpsc` channel of [`LinkEvent`](crate::models::LinkEvent)s; the
//! GUI drains that channel and hands every event to the shell on the Slint thread.
//! The reader checks its running flag once per poll, and `stop()` joins it.
//!
//! # Usage Example
//!
//! ```ignore
//! use serial_monitor::services::{MonitorShell, SystemPorts};
//!
//! let ports = Arc::new(SystemPorts);
//! let (shell, events) = MonitorShell::new(state, ports.clone(), ports, timing, metrics);
//!
//! shell.refresh_ports();
//! shell.toggle_connection()?;
//! for event in events.iter() {
//!     shell.handle_link_event(event);
//! }
//! ```

pub mod framing;
pub mod link;
pub mod ports;
pub mod shell;

pub use framing::{LINE_TERMINATOR, LineFramer};
pub use link::{LinkContext, LinkError, LinkSession, LinkWriter, PortOpener, SerialIo};
pub use ports::{PortRegistry, SystemPorts};
pub use shell::MonitorShell;
