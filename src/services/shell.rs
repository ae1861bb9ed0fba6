use crate::metrics::Metrics;
use crate::models::{BaudRate, ConnectionStatus, LinkEvent, LinkEventKind, LinkTiming, SessionId};
use crate::services::link::{LinkContext, LinkError, LinkSession, PortOpener};
use crate::services::ports::PortRegistry;
use crate::state::StateManager;
use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The monitor's controller logic, independent of any widget toolkit.
///
/// Owns at most one [`LinkSession`] and all state the window shows (through
/// [`StateManager`]). The GUI calls the operations below from its callbacks
/// and feeds every [`LinkEvent`] back through [`handle_link_event`](Self::handle_link_event)
/// on the UI thread.
pub struct MonitorShell {
    state: Arc<StateManager>,
    registry: Arc<dyn PortRegistry>,
    link: LinkContext,
    session: Mutex<Option<LinkSession>>,
    next_session: AtomicU64,
}

impl MonitorShell {
    /// Create the shell and the receiving end of its link event channel
    pub fn new(
        state: Arc<StateManager>,
        registry: Arc<dyn PortRegistry>,
        opener: Arc<dyn PortOpener>,
        timing: LinkTiming,
        metrics: Arc<Metrics>,
    ) -> (Self, std_mpsc::Receiver<LinkEvent>) {
        let (events, events_rx) = std_mpsc::channel();
        let shell = Self {
            state,
            registry,
            link: LinkContext {
                opener,
                timing,
                events,
                metrics,
            },
            session: Mutex::new(None),
            next_session: AtomicU64::new(0),
        };
        (shell, events_rx)
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.link.metrics
    }

    /// Re-enumerate ports and repopulate the selector. Returns the port count.
    pub fn refresh_ports(&self) -> usize {
        let ports = self.registry.list_ports();
        let count = ports.len();
        self.state.set_ports(ports);
        tracing::info!("Found {} serial ports", count);
        count
    }

    pub fn select_port(&self, port: &str) {
        let port = (!port.is_empty()).then(|| port.to_string());
        self.state.select_port(port);
    }

    pub fn select_baud(&self, baud_rate: BaudRate) {
        tracing::debug!("Baud rate selected: {}", baud_rate);
        self.state.select_baud(baud_rate);
    }

    /// Whether a session is currently held
    pub fn is_session_active(&self) -> bool {
        self.lock_session().is_some()
    }

    /// Connect with the current selectors, or disconnect the live session.
    ///
    /// Connecting returns once the port is open; the indicator turns green when
    /// the session's `Connected` event is handled. A failed open turns it red
    /// immediately and returns the error.
    pub fn toggle_connection(&self) -> Result<(), LinkError> {
        let mut slot = self.lock_session();

        if let Some(mut session) = slot.take() {
            tracing::info!("Disconnecting {}", session.config());
            session.stop();
            self.state.set_status(ConnectionStatus::Disconnected);
            return Ok(());
        }

        let Some(config) = self.state.read(|s| s.link_config()) else {
            tracing::warn!("Connect requested with no port selected");
            self.state.set_status(ConnectionStatus::Disconnected);
            return Err(LinkError::connection(
                "",
                io::Error::new(ErrorKind::NotFound, "no port selected"),
            ));
        };

        let id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed) + 1);
        tracing::info!("Connecting session {} to {}", id, config);

        match LinkSession::open(id, config, &self.link) {
            Ok(session) => {
                *slot = Some(session);
                Ok(())
            }
            Err(e) => {
                self.state.set_status(ConnectionStatus::Disconnected);
                Err(e)
            }
        }
    }

    /// Apply an event from a link session.
    ///
    /// Events from any session other than the current one are dropped, so a
    /// stopped session can never change what the window shows.
    pub fn handle_link_event(&self, event: LinkEvent) {
        let mut slot = self.lock_session();

        if slot.as_ref().map(LinkSession::id) != Some(event.session) {
            tracing::trace!("Discarding event from stale session {}", event.session);
            return;
        }

        match event.kind {
            LinkEventKind::Connected => {
                self.state.set_status(ConnectionStatus::Connected);
            }
            LinkEventKind::LineReceived(text) => {
                self.state.append_line(text);
            }
            LinkEventKind::Disconnected => {
                if let Some(mut session) = slot.take() {
                    session.stop();
                }
                self.state.set_status(ConnectionStatus::Disconnected);
            }
        }
    }

    /// Send one line over the live session.
    ///
    /// Blocks until the reader thread has written it. On failure the session
    /// is torn down and the indicator shows disconnected.
    pub fn send(&self, text: &str) -> Result<(), LinkError> {
        let writer = self
            .lock_session()
            .as_ref()
            .filter(|s| s.is_running())
            .map(LinkSession::writer)
            .ok_or(LinkError::NotConnected)?;

        match writer.write_line(text) {
            Ok(()) => {
                self.link.metrics.record_line_sent();
                tracing::debug!("Sent line ({} bytes)", text.len() + 1);
                Ok(())
            }
            Err(e) => {
                self.link.metrics.record_write_failure();
                tracing::warn!("Send failed: {}", e);

                let mut slot = self.lock_session();
                if slot.as_ref().map(LinkSession::id) == Some(writer.session()) {
                    if let Some(mut session) = slot.take() {
                        session.stop();
                    }
                }
                drop(slot);

                self.state.set_status(ConnectionStatus::Disconnected);
                Err(e)
            }
        }
    }

    /// Empty the transcript. The session is untouched.
    pub fn clear_display(&self) {
        self.state.clear_transcript();
    }

    /// Stop any live session; called when the window closes
    pub fn shutdown(&self) {
        if let Some(mut session) = self.lock_session().take() {
            tracing::info!("Closing {} on shutdown", session.config());
            session.stop();
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<LinkSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for MonitorShell {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PortDescriptor;
    use crate::services::link::MockPortOpener;
    use crate::services::ports::MockPortRegistry;
    use crate::state::StateChange;

    fn shell_with(
        registry: MockPortRegistry,
        opener: MockPortOpener,
    ) -> (MonitorShell, std_mpsc::Receiver<LinkEvent>) {
        MonitorShell::new(
            Arc::new(StateManager::new()),
            Arc::new(registry),
            Arc::new(opener),
            LinkTiming::default(),
            Arc::new(Metrics::new()),
        )
    }

    #[test]
    fn test_refresh_populates_selector() {
        let mut registry = MockPortRegistry::new();
        registry
            .expect_list_ports()
            .times(1)
            .returning(|| vec![PortDescriptor::new("COM4"), PortDescriptor::new("COM9")]);
        let (shell, _rx) = shell_with(registry, MockPortOpener::new());

        assert_eq!(shell.refresh_ports(), 2);
        let state = shell.state().snapshot();
        assert_eq!(state.port_names(), vec!["COM4", "COM9"]);
        assert_eq!(state.selected_port.as_deref(), Some("COM4"));
    }

    #[test]
    fn test_connect_without_port_fails_without_opening() {
        let mut opener = MockPortOpener::new();
        opener.expect_open().never();
        let (shell, _rx) = shell_with(MockPortRegistry::new(), opener);

        assert!(matches!(
            shell.toggle_connection(),
            Err(LinkError::Connection { .. })
        ));
        assert!(!shell.is_session_active());
    }

    #[test]
    fn test_open_failure_keeps_disconnected() {
        let mut opener = MockPortOpener::new();
        opener
            .expect_open()
            .times(1)
            .returning(|_, _| Err(io::Error::new(ErrorKind::ResourceBusy, "busy")));
        let (shell, rx) = shell_with(MockPortRegistry::new(), opener);
        shell.select_port("COM4");
        let mut changes = shell.state().subscribe();

        assert!(shell.toggle_connection().is_err());
        assert!(!shell.is_session_active());
        assert_eq!(
            shell.state().read(|s| s.status),
            ConnectionStatus::Disconnected
        );
        // Already disconnected, so the indicator does not flicker
        assert!(changes.try_recv().is_err());

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, LinkEventKind::Disconnected);
        shell.handle_link_event(event);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_without_session_is_rejected() {
        let (shell, _rx) = shell_with(MockPortRegistry::new(), MockPortOpener::new());
        assert!(matches!(shell.send("hello"), Err(LinkError::NotConnected)));
    }

    #[test]
    fn test_stale_events_are_ignored() {
        let (shell, _rx) = shell_with(MockPortRegistry::new(), MockPortOpener::new());
        let mut changes = shell.state().subscribe();

        shell.handle_link_event(LinkEvent::connected(SessionId(41)));
        shell.handle_link_event(LinkEvent::line(SessionId(41), "ghost".to_string()));

        assert!(shell.state().read(|s| s.transcript.is_empty()));
        assert!(matches!(
            changes.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn test_clear_display_is_idempotent() {
        let (shell, _rx) = shell_with(MockPortRegistry::new(), MockPortOpener::new());
        for n in [0usize, 1, 17] {
            for i in 0..n {
                shell.state().append_line(format!("line {}", i));
            }
            shell.clear_display();
            assert_eq!(shell.state().read(|s| s.transcript.len()), 0);
        }

        let mut changes = shell.state().subscribe();
        shell.clear_display();
        assert!(matches!(
            changes.try_recv().unwrap(),
            StateChange::TranscriptCleared { .. }
        ));
    }
}
