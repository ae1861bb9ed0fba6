// GUI Controller - Bridges the Slint window with the monitor shell
//
// Coordinates between:
// - Slint UI (MainWindow)
// - MonitorShell (connect, send, clear, port refresh)
// - StateManager (what the window shows)
// - EventLoopBridge (background threads -> Slint thread)
//
// Two background threads feed the window:
// - link event pump: drains session events and applies them to the shell on the Slint thread
// - state subscription: renders every StateChange on the Slint thread

use crate::models::{AppState, BaudRate, ConnectionStatus, LinkEvent};
use crate::services::{LinkError, MonitorShell};
use crate::state::{StateChange, TranscriptCursor};
use crate::ui::bridge::{EventLoopBridge, EventLoopBridgeHandle};
use anyhow::{Context, Result};
use slint::{ComponentHandle, Model, ModelRc, SharedString, VecModel};
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use tokio::sync::broadcast::{self, error::RecvError};

// Include the generated Slint code
slint::include_modules!();

/// GUI Controller that wires up the Slint UI with the shell
///
/// # Example
/// ```ignore
/// let (shell, events) = MonitorShell::new(state, ports.clone(), ports, timing, metrics);
/// let controller = GuiController::new(Arc::new(shell), events, runtime.handle().clone())?;
/// controller.run()?;  // Blocks until window is closed
/// ```
pub struct GuiController {
    /// The Slint UI window
    ui: MainWindow,

    /// Keeps the bridge's sender alive for as long as the window
    _bridge: EventLoopBridge<MainWindow>,

    shell: Arc<MonitorShell>,
}

impl GuiController {
    /// Create the window and connect it to the shell
    ///
    /// # Arguments
    /// * `shell` - Shell owning the state and the link session
    /// * `events` - Receiving end of the shell's link event channel
    /// * `tokio_handle` - Runtime used to run sends off the UI thread
    pub fn new(
        shell: Arc<MonitorShell>,
        events: std_mpsc::Receiver<LinkEvent>,
        tokio_handle: tokio::runtime::Handle,
    ) -> Result<Self> {
        let ui = MainWindow::new().context("Failed to create Slint UI")?;

        let bridge = EventLoopBridge::new(&ui, tokio_handle, shell.metrics().clone())
            .context("Failed to create event loop bridge")?;

        // Populate the port selector before the window first shows
        shell.refresh_ports();

        // Subscribe before the snapshot so no change falls between the two
        let changes = shell.state().subscribe();
        let snapshot = shell.state().snapshot();
        Self::render_state(&ui, &snapshot);

        Self::setup_callbacks(&ui, &bridge, &shell);
        Self::setup_state_subscription(&bridge, &shell, changes, TranscriptCursor::at(&snapshot))?;
        Self::setup_link_event_pump(&bridge, &shell, events)?;

        tracing::info!("GUI controller initialized");

        Ok(Self {
            ui,
            _bridge: bridge,
            shell,
        })
    }

    /// Run the GUI (blocks until window is closed), then close any live session
    pub fn run(self) -> Result<(), slint::PlatformError> {
        tracing::info!("Starting GUI event loop");
        let result = self.ui.run();

        tracing::info!("Window closed");
        self.shell.shutdown();

        result
    }

    /// Set up Slint UI callbacks
    fn setup_callbacks(
        ui: &MainWindow,
        bridge: &EventLoopBridge<MainWindow>,
        shell: &Arc<MonitorShell>,
    ) {
        let shell_ref = shell.clone();
        ui.on_refresh_ports(move || {
            tracing::debug!("Refresh ports clicked");
            shell_ref.refresh_ports();
        });

        let shell_ref = shell.clone();
        ui.on_port_selected(move |port| {
            tracing::debug!("Port selected: {}", port);
            shell_ref.select_port(port.as_str());
        });

        let shell_ref = shell.clone();
        ui.on_baud_selected(move |index| {
            match usize::try_from(index).ok().and_then(BaudRate::from_index) {
                Some(baud) => shell_ref.select_baud(baud),
                None => tracing::warn!("Ignoring out-of-range baud index {}", index),
            }
        });

        let shell_ref = shell.clone();
        ui.on_toggle_connection(move || {
            tracing::info!("Connect/disconnect clicked");
            if let Err(e) = shell_ref.toggle_connection() {
                tracing::warn!("Connect failed: {}", e);
            }
        });

        let shell_ref = shell.clone();
        ui.on_clear_display(move || {
            tracing::debug!("Clear clicked");
            shell_ref.clear_display();
        });

        let shell_ref = shell.clone();
        let bridge_handle = bridge.clone_handle();
        let ui_weak = ui.as_weak();
        ui.on_send_data(move |text| {
            let Some(ui) = ui_weak.upgrade() else {
                return;
            };
            ui.set_is_sending(true);

            Self::send_in_background(&bridge_handle, shell_ref.clone(), text.to_string());
        });
    }

    /// Run a send on the blocking pool and report back to the window.
    ///
    /// The result is queued with `update_ui_blocking` from the blocking task, so
    /// the send controls are re-enabled even while a burst fills the bridge queue.
    /// Clears the input on success; the shell has already updated the indicator on failure.
    fn send_in_background(
        bridge: &EventLoopBridgeHandle<MainWindow>,
        shell: Arc<MonitorShell>,
        text: String,
    ) {
        let bridge_handle = bridge.clone();

        bridge.spawn_async(move || async move {
            let reporter = bridge_handle.clone();
            let task = tokio::task::spawn_blocking(move || {
                let sent = send_line(&shell, &text);
                reporter.update_ui_blocking(move |ui| Self::finish_send(ui, sent))
            });

            match task.await {
                Ok(true) => {}
                Ok(false) => tracing::debug!("Window closed before send result was shown"),
                Err(e) => {
                    tracing::error!("Send task failed: {}", e);
                    // Best effort: the task died before reporting
                    bridge_handle.update_ui(|ui| Self::finish_send(ui, false));
                }
            }
        });
    }

    fn finish_send(ui: &MainWindow, sent: bool) {
        ui.set_is_sending(false);
        if sent {
            ui.set_input_text(SharedString::new());
        }
    }

    /// Forward every link event to the shell on the Slint thread
    fn setup_link_event_pump(
        bridge: &EventLoopBridge<MainWindow>,
        shell: &Arc<MonitorShell>,
        events: std_mpsc::Receiver<LinkEvent>,
    ) -> Result<()> {
        let bridge_handle = bridge.clone_handle();
        let shell = shell.clone();

        std::thread::Builder::new()
            .name("link-events".to_string())
            .spawn(move || {
                tracing::debug!("Link event pump started");

                while let Ok(event) = events.recv() {
                    let shell = shell.clone();
                    let queued =
                        bridge_handle.update_ui_blocking(move |_ui| shell.handle_link_event(event));
                    if !queued {
                        break;
                    }
                }

                tracing::debug!("Link event pump terminated");
            })
            .context("Failed to start link event pump")?;

        Ok(())
    }

    /// Render state changes on the Slint thread.
    ///
    /// `cursor` describes the transcript already on screen. Changes pass through
    /// it so lines covered by a snapshot re-render are not appended twice.
    fn setup_state_subscription(
        bridge: &EventLoopBridge<MainWindow>,
        shell: &Arc<MonitorShell>,
        mut rx: broadcast::Receiver<StateChange>,
        mut cursor: TranscriptCursor,
    ) -> Result<()> {
        let bridge_handle = bridge.clone_handle();
        let state_manager = shell.state().clone();

        std::thread::Builder::new()
            .name("state-subscription".to_string())
            .spawn(move || {
                tracing::debug!("State subscription thread started");

                loop {
                    let queued = match rx.blocking_recv() {
                        Ok(change) => {
                            tracing::trace!("State change received: {:?}", change);
                            match cursor.admit(change) {
                                Some(change) => bridge_handle
                                    .update_ui_blocking(move |ui| Self::render_change(ui, change)),
                                None => true,
                            }
                        }
                        Err(RecvError::Closed) => {
                            tracing::info!(
                                "State broadcast channel closed - shutting down subscription thread"
                            );
                            break;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(
                                "State subscription lagged - {} events skipped, re-rendering from snapshot",
                                skipped
                            );
                            let snapshot = state_manager.snapshot();
                            cursor = TranscriptCursor::at(&snapshot);
                            bridge_handle.update_ui_blocking(move |ui| Self::render_state(ui, &snapshot))
                        }
                    };

                    if !queued {
                        break;
                    }
                }

                tracing::debug!("State subscription thread terminated");
            })
            .context("Failed to start state subscription thread")?;

        Ok(())
    }

    /// Render the whole state (startup, or after the subscription lagged)
    fn render_state(ui: &MainWindow, state: &AppState) {
        ui.set_ports(string_model(state.port_names()));
        ui.set_selected_port(state.selected_port.clone().unwrap_or_default().into());
        ui.set_selected_baud_index(state.baud_rate.index() as i32);
        Self::render_status(ui, state.status);
        ui.set_transcript(string_model(state.transcript.clone()));
    }

    fn render_change(ui: &MainWindow, change: StateChange) {
        match change {
            StateChange::PortsChanged { ports, selected } => {
                ui.set_ports(string_model(ports));
                ui.set_selected_port(selected.unwrap_or_default().into());
            }
            StateChange::BaudChanged { baud_rate } => {
                ui.set_selected_baud_index(baud_rate.index() as i32);
            }
            StateChange::ConnectionChanged { status } => {
                tracing::info!("{}", status.label());
                Self::render_status(ui, status);
            }
            StateChange::LinesAppended { lines, .. } => {
                let model = ui.get_transcript();
                match model.as_any().downcast_ref::<VecModel<SharedString>>() {
                    Some(transcript) => {
                        for line in lines {
                            transcript.push(line.into());
                        }
                    }
                    None => {
                        let mut all: Vec<String> = model.iter().map(|s| s.to_string()).collect();
                        all.extend(lines);
                        ui.set_transcript(string_model(all));
                    }
                }
            }
            StateChange::TranscriptCleared { .. } => {
                ui.set_transcript(string_model(Vec::new()));
            }
        }
    }

    fn render_status(ui: &MainWindow, status: ConnectionStatus) {
        ui.set_is_connected(status.is_connected());
        ui.set_status_text(status.label().into());
    }
}

/// Send one line through the shell. Returns whether it was written.
fn send_line(shell: &MonitorShell, text: &str) -> bool {
    match shell.send(text) {
        Ok(()) => true,
        Err(LinkError::NotConnected) => {
            tracing::debug!("Send ignored: not connected");
            false
        }
        Err(e) => {
            tracing::debug!("Send failed: {}", e);
            false
        }
    }
}

fn string_model(items: Vec<String>) -> ModelRc<SharedString> {
    let items: Vec<SharedString> = items.into_iter().map(SharedString::from).collect();
    ModelRc::new(VecModel::from(items))
}
