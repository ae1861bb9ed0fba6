// Session metrics
//
// Lightweight counters for link activity, logged at shutdown

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Link and UI counters
///
/// Uses atomic operations so the reader thread, the UI thread and send tasks
/// can record without locks.
#[derive(Debug)]
pub struct Metrics {
    /// Sessions whose port opened successfully
    pub sessions_opened: AtomicU64,

    /// Connect attempts that failed to open the port
    pub open_failures: AtomicU64,

    /// Complete lines delivered to the shell
    pub lines_received: AtomicU64,

    /// Raw bytes read from ports
    pub bytes_received: AtomicU64,

    /// Lines written to ports
    pub lines_sent: AtomicU64,

    /// Writes that failed or timed out
    pub write_failures: AtomicU64,

    /// Sessions ended by non UTF-8 input
    pub decode_failures: AtomicU64,

    /// UI updates dropped because the bridge channel was full
    pub ui_updates_dropped: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            sessions_opened: AtomicU64::new(0),
            open_failures: AtomicU64::new(0),
            lines_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            lines_sent: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            ui_updates_dropped: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_open_failure(&self) {
        self.open_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_received(&self, count: usize) {
        self.bytes_received
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_line_received(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_line_sent(&self) {
        self.lines_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ui_update_dropped(&self) {
        self.ui_updates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Session Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Sessions: {} opened, {} failed to open",
            self.sessions_opened.load(Ordering::Relaxed),
            self.open_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Received: {} lines ({} bytes), {} decode failures",
            self.lines_received.load(Ordering::Relaxed),
            self.bytes_received.load(Ordering::Relaxed),
            self.decode_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Sent: {} lines, {} write failures",
            self.lines_sent.load(Ordering::Relaxed),
            self.write_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "UI updates dropped: {}",
            self.ui_updates_dropped.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
