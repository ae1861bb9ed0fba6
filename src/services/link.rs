use crate::metrics::Metrics;
use crate::models::{LinkConfig, LinkEvent, LinkState, LinkTiming, SessionId};
use crate::services::framing::{LINE_TERMINATOR, LineFramer};
use crate::services::ports::SystemPorts;
use std::io::{self, ErrorKind};
use std::string::FromUtf8Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// Largest single read from the port
const READ_CHUNK: usize = 1024;

/// Errors surfaced by a link session
#[derive(Error, Debug)]
pub enum LinkError {
    /// Open or write failure for any OS-level reason
    #[error("Connection error on {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: io::Error,
    },

    /// A received line was not valid UTF-8
    #[error("Received non UTF-8 data on {port}: {source}")]
    Decode {
        port: String,
        #[source]
        source: FromUtf8Error,
    },

    /// No session is running
    #[error("Not connected")]
    NotConnected,
}

impl LinkError {
    pub fn connection(port: impl Into<String>, source: io::Error) -> Self {
        LinkError::Connection {
            port: port.into(),
            source,
        }
    }
}

/// Byte-level access to an open port.
///
/// Implemented for the `serialport` crate's handles; tests supply fakes.
pub trait SerialIo: Send {
    /// Bytes waiting in the driver's input buffer
    fn bytes_to_read(&mut self) -> io::Result<usize>;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `data` and flush
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
}

impl SerialIo for Box<dyn serialport::SerialPort> {
    fn bytes_to_read(&mut self) -> io::Result<usize> {
        Ok(serialport::SerialPort::bytes_to_read(&**self)? as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut **self, buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        io::Write::write_all(&mut **self, data)?;
        io::Write::flush(&mut **self)
    }
}

/// Acquires exclusive OS ownership of a device
#[cfg_attr(test, mockall::automock)]
pub trait PortOpener: Send + Sync {
    fn open(&self, config: &LinkConfig, read_timeout: Duration) -> io::Result<Box<dyn SerialIo>>;
}

impl PortOpener for SystemPorts {
    fn open(&self, config: &LinkConfig, read_timeout: Duration) -> io::Result<Box<dyn SerialIo>> {
        let port = serialport::new(config.port.as_str(), config.baud_rate.as_u32())
            .timeout(read_timeout)
            .open()?;
        Ok(Box::new(port))
    }
}

/// Everything a session needs besides its configuration
#[derive(Clone)]
pub struct LinkContext {
    pub opener: Arc<dyn PortOpener>,
    pub timing: LinkTiming,
    pub events: std_mpsc::Sender<LinkEvent>,
    pub metrics: Arc<Metrics>,
}

struct WriteRequest {
    data: Vec<u8>,
    reply: std_mpsc::SyncSender<io::Result<()>>,
}

/// An open serial connection and its reader thread.
///
/// The session owns the only OS handle to the device. The reader thread
/// performs both reads and writes on it; [`LinkSession::write_line`] hands
/// the bytes to that thread and waits for the result.
///
/// Events go out on the context's channel: `Connected` first, then one
/// `LineReceived` per line, and `Disconnected` if the loop dies on an error.
/// A clean [`stop()`](Self::stop) emits nothing.
pub struct LinkSession {
    id: SessionId,
    config: LinkConfig,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<LinkState>>,
    writer: LinkWriter,
    worker: Option<JoinHandle<()>>,
}

impl LinkSession {
    /// Open the device and start the reader thread.
    ///
    /// On failure a `Disconnected` event is emitted and no thread is started.
    pub fn open(id: SessionId, config: LinkConfig, ctx: &LinkContext) -> Result<Self, LinkError> {
        let state = Arc::new(Mutex::new(LinkState::Idle));
        set_state(&state, LinkState::Connecting);

        let port = match ctx.opener.open(&config, ctx.timing.read_timeout) {
            Ok(port) => port,
            Err(e) => {
                tracing::warn!("Failed to open {}: {}", config, e);
                set_state(&state, LinkState::Disconnected);
                ctx.metrics.record_open_failure();
                let _ = ctx.events.send(LinkEvent::disconnected(id));
                return Err(LinkError::connection(&config.port, e));
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let (write_tx, write_rx) = std_mpsc::channel();

        let reader = ReadLoop {
            id,
            port_name: config.port.clone(),
            port,
            framer: LineFramer::new(),
            running: running.clone(),
            state: state.clone(),
            write_rx,
            events: ctx.events.clone(),
            poll_interval: ctx.timing.poll_interval,
            metrics: ctx.metrics.clone(),
        };

        // The port moves into the closure; a failed spawn drops it again
        let worker = thread::Builder::new()
            .name(format!("serial-reader-{}", id.0))
            .spawn(move || reader.run())
            .map_err(|e| {
                tracing::error!("Failed to start reader thread for {}: {}", config, e);
                set_state(&state, LinkState::Disconnected);
                let _ = ctx.events.send(LinkEvent::disconnected(id));
                LinkError::connection(&config.port, e)
            })?;

        tracing::info!("Session {} opened {}", id, config);
        ctx.metrics.record_session_opened();

        Ok(Self {
            id,
            writer: LinkWriter {
                session: id,
                port: config.port.clone(),
                write_tx,
                timeout: ctx.timing.write_timeout,
            },
            config,
            running,
            state,
            worker: Some(worker),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn state(&self) -> LinkState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the reader thread is still servicing the port
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Clear the running flag and wait for the reader thread to exit.
    ///
    /// When this returns the handle is released and the thread emits no more events.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Reader thread for session {} panicked", self.id);
            }
            tracing::info!("Session {} closed {}", self.id, self.config);
        }

        set_state(&self.state, LinkState::Disconnected);
    }

    /// Write `text` plus a line terminator through the session's handle
    pub fn write_line(&self, text: &str) -> Result<(), LinkError> {
        self.writer.write_line(text)
    }

    /// A cloneable handle for writing without holding the session
    pub fn writer(&self) -> LinkWriter {
        self.writer.clone()
    }
}

impl Drop for LinkSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Queues writes onto a session's reader thread
#[derive(Clone)]
pub struct LinkWriter {
    session: SessionId,
    port: String,
    write_tx: std_mpsc::Sender<WriteRequest>,
    timeout: Duration,
}

impl LinkWriter {
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Write the UTF-8 bytes of `text` followed by one `\n`.
    ///
    /// Fails with a connection error when the write fails, when the reader
    /// thread has exited, or when it does not get to the write in time.
    pub fn write_line(&self, text: &str) -> Result<(), LinkError> {
        let mut data = Vec::with_capacity(text.len() + 1);
        data.extend_from_slice(text.as_bytes());
        data.push(LINE_TERMINATOR);

        let (reply_tx, reply_rx) = std_mpsc::sync_channel(1);
        self.write_tx
            .send(WriteRequest {
                data,
                reply: reply_tx,
            })
            .map_err(|_| self.not_running())?;

        match reply_rx.recv_timeout(self.timeout) {
            Ok(result) => result.map_err(|e| LinkError::connection(&self.port, e)),
            Err(RecvTimeoutError::Timeout) => Err(LinkError::connection(
                &self.port,
                io::Error::new(ErrorKind::TimedOut, "write was not serviced in time"),
            )),
            Err(RecvTimeoutError::Disconnected) => Err(self.not_running()),
        }
    }

    fn not_running(&self) -> LinkError {
        LinkError::connection(
            &self.port,
            io::Error::new(ErrorKind::NotConnected, "reader thread has stopped"),
        )
    }
}

/// State owned by the reader thread
struct ReadLoop {
    id: SessionId,
    port_name: String,
    port: Box<dyn SerialIo>,
    framer: LineFramer,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<LinkState>>,
    write_rx: std_mpsc::Receiver<WriteRequest>,
    events: std_mpsc::Sender<LinkEvent>,
    poll_interval: Duration,
    metrics: Arc<Metrics>,
}

impl ReadLoop {
    fn run(mut self) {
        set_state(&self.state, LinkState::Connected);
        let _ = self.events.send(LinkEvent::connected(self.id));
        tracing::debug!("Reader thread for session {} started", self.id);

        let outcome = self.pump();

        // Release the handle before announcing the exit
        let Self {
            id,
            port,
            running,
            state,
            events,
            metrics,
            ..
        } = self;
        drop(port);
        running.store(false, Ordering::Release);
        set_state(&state, LinkState::Disconnected);

        match outcome {
            Ok(()) => tracing::debug!("Reader thread for session {} stopped", id),
            Err(e) => {
                if matches!(e, LinkError::Decode { .. }) {
                    metrics.record_decode_failure();
                }
                tracing::warn!("Session {} ended: {}", id, e);
                let _ = events.send(LinkEvent::disconnected(id));
            }
        }
    }

    fn pump(&mut self) -> Result<(), LinkError> {
        let mut buf = [0u8; READ_CHUNK];

        while self.running.load(Ordering::Acquire) {
            self.service_writes();

            let waiting = self
                .port
                .bytes_to_read()
                .map_err(|e| LinkError::connection(&self.port_name, e))?;

            if waiting == 0 {
                thread::sleep(self.poll_interval);
                continue;
            }

            let want = waiting.min(READ_CHUNK);
            match self.port.read(&mut buf[..want]) {
                Ok(0) => {
                    return Err(LinkError::connection(
                        &self.port_name,
                        io::Error::new(ErrorKind::UnexpectedEof, "port closed"),
                    ));
                }
                Ok(n) => {
                    self.metrics.record_bytes_received(n);
                    self.framer.extend(&buf[..n]);
                    if !self.emit_lines()? {
                        tracing::debug!("Event listener for session {} is gone", self.id);
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) => return Err(LinkError::connection(&self.port_name, e)),
            }
        }

        Ok(())
    }

    /// Emit every complete buffered line. Returns false once the listener has hung up.
    fn emit_lines(&mut self) -> Result<bool, LinkError> {
        while let Some(line) = self.framer.next_line() {
            let text = line.map_err(|source| LinkError::Decode {
                port: self.port_name.clone(),
                source,
            })?;
            tracing::trace!("Session {} received: {}", self.id, text);
            self.metrics.record_line_received();
            if self.events.send(LinkEvent::line(self.id, text)).is_err() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn service_writes(&mut self) {
        while let Ok(request) = self.write_rx.try_recv() {
            let result = self.port.write_all(&request.data);
            if let Err(ref e) = result {
                tracing::warn!("Write to {} failed: {}", self.port_name, e);
            }
            let _ = request.reply.send(result);
        }
    }
}

fn set_state(state: &Mutex<LinkState>, next: LinkState) {
    let mut current = state.lock().unwrap_or_else(PoisonError::into_inner);
    match current.advance(next) {
        Some(advanced) => *current = advanced,
        None => tracing::warn!("Ignoring link state change {:?} -> {:?}", *current, next),
    }
}
