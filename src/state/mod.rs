// State management module
//
// This module provides the StateManager which wraps AppState with thread-safe access
// using Arc<RwLock<T>> and emits change events for GUI updates.

use crate::models::{AppState, BaudRate, ConnectionStatus, PortDescriptor};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Buffered change events per subscriber. Transcript lines arrive in bursts,
/// so this is sized well above a screenful.
const CHANGE_BUFFER: usize = 1024;

/// Change events emitted when state is modified
///
/// These events notify the GUI about state changes without it having to poll.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// Port list or selected port changed
    PortsChanged {
        ports: Vec<String>,
        selected: Option<String>,
    },

    /// Selected baud rate changed
    BaudChanged { baud_rate: BaudRate },

    /// Connection indicator changed
    ConnectionChanged { status: ConnectionStatus },

    /// Lines were appended to the transcript, in order.
    ///
    /// `start` is the transcript index of the first line within `generation`.
    LinesAppended {
        generation: u64,
        start: usize,
        lines: Vec<String>,
    },

    /// Transcript was emptied, starting `generation`
    TranscriptCleared { generation: u64 },
}

/// Tracks how much of the transcript a renderer already shows.
///
/// A lagging subscriber re-renders from a [`StateManager::snapshot`], but the
/// broadcast channel still holds changes the snapshot already includes.
/// [`admit`](Self::admit) drops those and trims partial overlaps so every
/// line is rendered exactly once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscriptCursor {
    generation: u64,
    len: usize,
}

impl TranscriptCursor {
    /// Cursor for a renderer that has just drawn `state`
    pub fn at(state: &AppState) -> Self {
        Self {
            generation: state.transcript_generation,
            len: state.transcript.len(),
        }
    }

    /// Pass a change through, minus any transcript lines already shown.
    ///
    /// Non-transcript changes always pass.
    pub fn admit(&mut self, change: StateChange) -> Option<StateChange> {
        match change {
            StateChange::TranscriptCleared { generation } => {
                if generation <= self.generation {
                    return None;
                }
                self.generation = generation;
                self.len = 0;
                Some(StateChange::TranscriptCleared { generation })
            }
            StateChange::LinesAppended {
                generation,
                start,
                lines,
            } => {
                let end = start + lines.len();
                if generation != self.generation || end <= self.len {
                    return None;
                }
                let skip = self.len.saturating_sub(start);
                self.len = end;
                Some(StateChange::LinesAppended {
                    generation,
                    start: start + skip,
                    lines: lines.into_iter().skip(skip).collect(),
                })
            }
            other => Some(other),
        }
    }
}

/// The parts of [`AppState`] compared by change detection.
///
/// The transcript is tracked by length and generation so an update does not
/// have to copy it.
#[derive(Clone, PartialEq)]
struct StateDigest {
    ports: Vec<PortDescriptor>,
    selected_port: Option<String>,
    baud_rate: BaudRate,
    status: ConnectionStatus,
    transcript_len: usize,
    transcript_generation: u64,
}

impl StateDigest {
    fn of(state: &AppState) -> Self {
        Self {
            ports: state.available_ports.clone(),
            selected_port: state.selected_port.clone(),
            baud_rate: state.baud_rate,
            status: state.status,
            transcript_len: state.transcript.len(),
            transcript_generation: state.transcript_generation,
        }
    }
}

/// Thread-safe state manager with event emission
///
/// - Provides thread-safe access to [`AppState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// Always use `StateManager` instead of accessing [`AppState`] directly:
/// - [`read()`](Self::read) for reading state
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
///
/// The primary consumer is [`crate::ui::controller::GuiController`], which renders each change.
pub struct StateManager {
    state: Arc<RwLock<AppState>>,
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    /// Clone of the whole current state
    pub fn snapshot(&self) -> AppState {
        self.read(|state| state.clone())
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let status = state_manager.read(|state| state.status);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// 1. Captures a digest of the old state
    /// 2. Applies the update function
    /// 3. Detects what changed
    /// 4. Emits the matching events
    ///
    /// Returns the events that were emitted.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old = StateDigest::of(&state);

        update_fn(&mut state);

        let changes = Self::detect_changes(&old, &state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    ///
    /// Returns a receiver that will get notified of all future state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(old: &StateDigest, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.ports != new.available_ports || old.selected_port != new.selected_port {
            changes.push(StateChange::PortsChanged {
                ports: new.port_names(),
                selected: new.selected_port.clone(),
            });
        }

        if old.baud_rate != new.baud_rate {
            changes.push(StateChange::BaudChanged {
                baud_rate: new.baud_rate,
            });
        }

        if old.status != new.status {
            changes.push(StateChange::ConnectionChanged { status: new.status });
        }

        let generation = new.transcript_generation;
        if old.transcript_generation != generation {
            changes.push(StateChange::TranscriptCleared { generation });
            if !new.transcript.is_empty() {
                changes.push(StateChange::LinesAppended {
                    generation,
                    start: 0,
                    lines: new.transcript.clone(),
                });
            }
        } else if new.transcript.len() > old.transcript_len {
            changes.push(StateChange::LinesAppended {
                generation,
                start: old.transcript_len,
                lines: new.transcript[old.transcript_len..].to_vec(),
            });
        }

        changes
    }

    // Convenience methods for common state updates

    /// Replace the port list from a fresh enumeration
    pub fn set_ports(&self, ports: Vec<PortDescriptor>) -> Vec<StateChange> {
        self.update(|state| state.set_available_ports(ports))
    }

    pub fn select_port(&self, port: Option<String>) -> Vec<StateChange> {
        self.update(|state| state.selected_port = port)
    }

    pub fn select_baud(&self, baud_rate: BaudRate) -> Vec<StateChange> {
        self.update(|state| state.baud_rate = baud_rate)
    }

    pub fn set_status(&self, status: ConnectionStatus) -> Vec<StateChange> {
        self.update(|state| state.status = status)
    }

    /// Append one received line to the transcript
    pub fn append_line(&self, line: String) -> Vec<StateChange> {
        self.update(|state| state.transcript.push(line))
    }

    pub fn clear_transcript(&self) -> Vec<StateChange> {
        self.update(|state| state.clear_transcript())
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across threads
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
