//! Fake ports shared by the integration tests

#![allow(dead_code)]

use serial_monitor::Metrics;
use serial_monitor::models::{LinkConfig, LinkEvent, LinkTiming, PortDescriptor};
use serial_monitor::services::{LinkContext, PortOpener, PortRegistry, SerialIo};
use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// What a fake port does once opened
#[derive(Clone, Default)]
pub struct PortScript {
    /// Delivered one chunk per read, in order
    pub chunks: Vec<Vec<u8>>,
    /// Payload that becomes readable once per period, first after one period
    pub periodic: Option<(Vec<u8>, Duration)>,
    /// Report a read error once the chunks are used up
    pub fail_when_drained: bool,
    pub fail_writes: bool,
    /// How long each write blocks before completing
    pub write_delay: Option<Duration>,
    /// Report a byte waiting on every poll, then read nothing
    pub zero_reads: bool,
}

impl PortScript {
    pub fn chunks(chunks: &[&[u8]]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_vec()).collect(),
            ..Default::default()
        }
    }

    pub fn periodic(payload: &[u8], every: Duration) -> Self {
        Self {
            periodic: Some((payload.to_vec(), every)),
            ..Default::default()
        }
    }
}

/// Record of everything done to fake ports
#[derive(Default)]
pub struct PortLog {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub writes: Mutex<Vec<Vec<u8>>>,
    pub opened_configs: Mutex<Vec<LinkConfig>>,
}

impl PortLog {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }
}

pub struct FakePort {
    pending: VecDeque<Vec<u8>>,
    periodic: Option<(Vec<u8>, Duration)>,
    emitted: u32,
    opened_at: Instant,
    fail_when_drained: bool,
    fail_writes: bool,
    write_delay: Option<Duration>,
    zero_reads: bool,
    log: Arc<PortLog>,
}

impl FakePort {
    fn new(script: PortScript, log: Arc<PortLog>) -> Self {
        Self {
            pending: script.chunks.into(),
            periodic: script.periodic,
            emitted: 0,
            opened_at: Instant::now(),
            fail_when_drained: script.fail_when_drained,
            fail_writes: script.fail_writes,
            write_delay: script.write_delay,
            zero_reads: script.zero_reads,
            log,
        }
    }

    fn release_periodic(&mut self) {
        if let Some((payload, every)) = &self.periodic {
            let due = (self.opened_at.elapsed().as_nanos() / every.as_nanos()) as u32;
            while self.emitted < due {
                self.pending.push_back(payload.clone());
                self.emitted += 1;
            }
        }
    }
}

impl SerialIo for FakePort {
    fn bytes_to_read(&mut self) -> io::Result<usize> {
        if self.zero_reads {
            return Ok(1);
        }
        self.release_periodic();
        match self.pending.front() {
            Some(chunk) => Ok(chunk.len()),
            None if self.fail_when_drained => {
                Err(io::Error::new(ErrorKind::BrokenPipe, "device unplugged"))
            }
            None => Ok(0),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.zero_reads {
            return Ok(0);
        }
        let Some(mut chunk) = self.pending.pop_front() else {
            return Err(io::Error::new(ErrorKind::TimedOut, "no data"));
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.pending.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        if let Some(delay) = self.write_delay {
            std::thread::sleep(delay);
        }
        if self.fail_writes {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "write failed"));
        }
        self.log.writes.lock().unwrap().push(data.to_vec());
        Ok(())
    }
}

impl Drop for FakePort {
    fn drop(&mut self) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Opens [`FakePort`]s following a script, or refuses every open
pub struct FakeOpener {
    pub log: Arc<PortLog>,
    script: PortScript,
    refuse: bool,
}

impl FakeOpener {
    pub fn new(script: PortScript) -> Self {
        Self {
            log: Arc::default(),
            script,
            refuse: false,
        }
    }

    pub fn refusing() -> Self {
        Self {
            log: Arc::default(),
            script: PortScript::default(),
            refuse: true,
        }
    }
}

impl PortOpener for FakeOpener {
    fn open(&self, config: &LinkConfig, _read_timeout: Duration) -> io::Result<Box<dyn SerialIo>> {
        if self.refuse {
            return Err(io::Error::new(ErrorKind::PermissionDenied, "port busy"));
        }
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        self.log.opened_configs.lock().unwrap().push(config.clone());
        Ok(Box::new(FakePort::new(self.script.clone(), self.log.clone())))
    }
}

/// Returns the next port set on every call, repeating the last one
pub struct SequenceRegistry {
    sets: Mutex<VecDeque<Vec<PortDescriptor>>>,
    pub calls: AtomicUsize,
}

impl SequenceRegistry {
    pub fn new(sets: Vec<Vec<&str>>) -> Self {
        Self {
            sets: Mutex::new(
                sets.into_iter()
                    .map(|set| set.into_iter().map(PortDescriptor::new).collect())
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        }
    }
}

impl PortRegistry for SequenceRegistry {
    fn list_ports(&self) -> Vec<PortDescriptor> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut sets = self.sets.lock().unwrap();
        if sets.len() > 1 {
            sets.pop_front().unwrap_or_default()
        } else {
            sets.front().cloned().unwrap_or_default()
        }
    }
}

pub fn fast_timing() -> LinkTiming {
    LinkTiming {
        read_timeout: Duration::from_secs(1),
        poll_interval: Duration::from_millis(2),
        write_timeout: Duration::from_millis(500),
    }
}

pub fn link_context(opener: Arc<dyn PortOpener>) -> (LinkContext, mpsc::Receiver<LinkEvent>) {
    let (events, rx) = mpsc::channel();
    let ctx = LinkContext {
        opener,
        timing: fast_timing(),
        events,
        metrics: Arc::new(Metrics::new()),
    };
    (ctx, rx)
}

/// Collect events until `count` have arrived or `within` elapses
pub fn collect_events(
    rx: &mpsc::Receiver<LinkEvent>,
    count: usize,
    within: Duration,
) -> Vec<LinkEvent> {
    let deadline = Instant::now() + within;
    let mut events = Vec::new();
    while events.len() < count {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match rx.recv_timeout(remaining) {
            Ok(event) => events.push(event),
            Err(_) => break,
        }
    }
    events
}
