use super::link::{BaudRate, ConnectionStatus, LinkConfig, PortDescriptor};

/// Single source of truth for the monitor window.
///
/// # Thread Safety
///
/// `AppState` is wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`].
/// Never mutate it directly - go through [`StateManager::update()`](crate::state::StateManager::update)
/// so that the GUI receives the matching [`StateChange`](crate::state::StateChange) events.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    // Selector contents
    pub available_ports: Vec<PortDescriptor>,
    pub selected_port: Option<String>,
    pub baud_rate: BaudRate,

    // Connection indicator
    pub status: ConnectionStatus,

    // Received lines, append-only until cleared
    pub transcript: Vec<String>,

    // Bumped on every clear so observers can tell a clear from a shrink
    pub transcript_generation: u64,
}

impl AppState {
    /// Build a link configuration from the current selectors.
    ///
    /// Returns `None` when no port is selected.
    pub fn link_config(&self) -> Option<LinkConfig> {
        self.selected_port
            .as_ref()
            .filter(|p| !p.is_empty())
            .map(|port| LinkConfig::new(port.clone(), self.baud_rate))
    }

    /// Replace the port list, keeping the selection when the port is still present.
    pub fn set_available_ports(&mut self, ports: Vec<PortDescriptor>) {
        let keep = self
            .selected_port
            .as_ref()
            .is_some_and(|sel| ports.iter().any(|p| &p.name == sel));

        if !keep {
            self.selected_port = ports.first().map(|p| p.name.clone());
        }
        self.available_ports = ports;
    }

    /// Empty the transcript
    pub fn clear_transcript(&mut self) {
        self.transcript.clear();
        self.transcript_generation += 1;
    }

    pub fn port_names(&self) -> Vec<String> {
        self.available_ports.iter().map(|p| p.name.clone()).collect()
    }
}
