use super::link::BaudRate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Floor for `write_timeout_ms`; a write waits at least this long for the reader thread
const MIN_WRITE_TIMEOUT_MS: u64 = 50;

/// User settings from `settings.yaml`
///
/// Every key is optional; missing keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Baud rate preselected in the selector
    #[serde(default = "default_baud")]
    pub default_baud: u32,

    /// Read timeout handed to the OS driver when a port is opened
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Sleep between polls when no bytes are waiting
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a send waits for the reader thread to perform the write
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    #[serde(default)]
    pub debug_mode: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            default_baud: default_baud(),
            read_timeout_ms: default_read_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            debug_mode: false,
            log_dir: default_log_dir(),
        }
    }
}

impl MonitorSettings {
    /// Configured default baud rate, falling back to 9600 when unsupported
    pub fn baud_rate(&self) -> BaudRate {
        BaudRate::try_from(self.default_baud).unwrap_or_else(|e| {
            tracing::warn!("{} in settings, falling back to {}", e, BaudRate::default());
            BaudRate::default()
        })
    }

    /// Timing knobs for link sessions.
    ///
    /// The poll interval is at least 1 ms. The write timeout is at least
    /// 50 ms and two poll intervals, since a queued write waits up to one poll
    /// before the reader thread services it.
    pub fn link_timing(&self) -> LinkTiming {
        let poll_ms = self.poll_interval_ms.max(1);
        let write_ms = self
            .write_timeout_ms
            .max(MIN_WRITE_TIMEOUT_MS)
            .max(poll_ms.saturating_mul(2));

        LinkTiming {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            poll_interval: Duration::from_millis(poll_ms),
            write_timeout: Duration::from_millis(write_ms),
        }
    }
}

/// Timing used by a link session's reader thread and writers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTiming {
    pub read_timeout: Duration,
    pub poll_interval: Duration,
    pub write_timeout: Duration,
}

impl Default for LinkTiming {
    fn default() -> Self {
        MonitorSettings::default().link_timing()
    }
}

fn default_baud() -> u32 {
    9600
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_write_timeout_ms() -> u64 {
    1000
}

fn default_log_dir() -> String {
    "logs".to_string()
}
