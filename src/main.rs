//! Serial Monitor - desktop serial port monitor
//!
//! Main entry point for the GUI application.
//!
//! # Overview
//!
//! Opens a single window that lists the host's serial ports, connects to one at a
//! chosen baud rate, streams received lines into a scrolling transcript and sends
//! typed lines back over the same port.
//!
//! The application uses a hybrid threading model:
//! - **Main thread**: Runs the Slint event loop (blocking, synchronous)
//! - **Reader thread**: One per connected session; owns the port handle
//! - **Tokio workers**: Run sends so the window never waits on the port
//! - **Pump / subscription threads**: Marshal link events and state changes onto the Slint thread
//!
//! # Execution Flow
//!
//! 1. Load `Serial Monitor Data/settings.yaml` (defaults written if missing)
//! 2. Initialize logging -> `<log_dir>/serial-monitor.<date>`
//! 3. Create tokio runtime with 2 worker threads
//! 4. Create StateManager, MonitorShell and GuiController
//! 5. Run Slint event loop (blocks until window closed)
//! 6. Close any live session, log metrics, shut down the runtime

use anyhow::{Context, Result};
use serial_monitor::config::DEFAULT_CONFIG_DIR;
use serial_monitor::ui::GuiController;
use serial_monitor::{
    APP_NAME, ConfigManager, Metrics, MonitorShell, StateManager, SystemPorts, VERSION,
};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    let config_manager = ConfigManager::new(DEFAULT_CONFIG_DIR)?;
    let settings = config_manager.load_settings()?;

    // Setup logging with both file and console output; the guard flushes on drop
    let _log_guard = serial_monitor::logging::setup_logging(
        &settings.log_dir,
        "serial-monitor",
        settings.debug_mode,
        cfg!(debug_assertions),
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    tracing::info!(
        "Settings from {}: default_baud={}, read_timeout={}ms, poll_interval={}ms",
        config_manager.settings_path(),
        settings.default_baud,
        settings.read_timeout_ms,
        settings.poll_interval_ms
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("serial-monitor-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let metrics = Arc::new(Metrics::new());
    let state_manager = Arc::new(StateManager::new());
    state_manager.select_baud(settings.baud_rate());

    let ports = Arc::new(SystemPorts);
    let (shell, events) = MonitorShell::new(
        state_manager,
        ports.clone(),
        ports,
        settings.link_timing(),
        metrics.clone(),
    );

    let gui_controller = GuiController::new(Arc::new(shell), events, runtime.handle().clone())?;

    tracing::info!("GUI controller initialized, launching window");

    // Blocks until the window is closed; closes the live session afterwards
    let result = gui_controller.run();

    tracing::info!("GUI closed, shutting down");
    metrics.log_summary();

    runtime.shutdown_timeout(Duration::from_secs(2));

    tracing::info!("Application shutdown complete");

    result.map_err(|e| {
        tracing::error!("GUI error: {}", e);
        anyhow::anyhow!("GUI error: {}", e)
    })
}
