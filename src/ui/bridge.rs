// EventLoopBridge - Marshals work from background threads onto the Slint event loop
//
// Two kinds of threads feed the GUI:
// 1. Plain std threads (link event pump, state subscription) that block on channels
// 2. Tokio tasks (sends running off the UI thread)
//
// Both queue closures here; a handler thread forwards them to the Slint event loop
// with upgrade_in_event_loop, preserving order.

use crate::metrics::Metrics;
use anyhow::{Context, Result};
use slint::ComponentHandle;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

type UiUpdate<T> = Box<dyn FnOnce(&T) + Send>;

/// Queued UI updates before `update_ui` starts dropping
const UI_QUEUE_CAPACITY: usize = 256;

/// Coordinates between background threads, the tokio runtime and the Slint event loop
///
/// # Example
/// ```ignore
/// let bridge = EventLoopBridge::new(&ui, runtime.handle().clone(), metrics)?;
/// let handle = bridge.clone_handle();
///
/// std::thread::spawn(move || {
///     handle.update_ui_blocking(|ui| ui.set_status_text("Status: Connected".into()));
/// });
/// ```
pub struct EventLoopBridge<T: ComponentHandle> {
    handle: EventLoopBridgeHandle<T>,
}

impl<T: ComponentHandle + 'static> EventLoopBridge<T> {
    /// Create a new EventLoopBridge
    ///
    /// Spawns the handler thread that forwards queued updates to the Slint event loop.
    pub fn new(
        ui: &T,
        tokio_handle: tokio::runtime::Handle,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let ui_weak = ui.as_weak();
        let (ui_update_tx, mut ui_update_rx) = mpsc::channel::<UiUpdate<T>>(UI_QUEUE_CAPACITY);

        std::thread::Builder::new()
            .name("ui-bridge".to_string())
            .spawn(move || {
                tracing::debug!("EventLoopBridge handler thread started");

                while let Some(update_fn) = ui_update_rx.blocking_recv() {
                    // Queues the update to run on Slint's event loop thread
                    let result = ui_weak.upgrade_in_event_loop(move |ui| {
                        update_fn(&ui);
                    });

                    if let Err(e) = result {
                        // The event loop has stopped
                        tracing::warn!("Failed to queue UI update to event loop: {:?}", e);
                        break;
                    }
                }

                tracing::debug!("EventLoopBridge handler thread terminated");
            })
            .context("Failed to start EventLoopBridge handler thread")?;

        Ok(Self {
            handle: EventLoopBridgeHandle {
                tokio_handle,
                ui_update_tx,
                metrics,
            },
        })
    }

    /// Clone the bridge for use in multiple callbacks and threads
    pub fn clone_handle(&self) -> EventLoopBridgeHandle<T> {
        self.handle.clone()
    }
}

/// Lightweight handle that can be cloned and passed to callbacks
pub struct EventLoopBridgeHandle<T: ComponentHandle> {
    tokio_handle: tokio::runtime::Handle,
    ui_update_tx: mpsc::Sender<UiUpdate<T>>,
    metrics: Arc<Metrics>,
}

// Manual Clone implementation to avoid requiring T: Clone
impl<T: ComponentHandle> Clone for EventLoopBridgeHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tokio_handle: self.tokio_handle.clone(),
            ui_update_tx: self.ui_update_tx.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<T: ComponentHandle + 'static> EventLoopBridgeHandle<T> {
    /// Schedule a UI update without blocking; dropped if the queue is full.
    ///
    /// Safe to call from tokio tasks. Only for updates the window can do without;
    /// anything that must land goes through [`update_ui_blocking`](Self::update_ui_blocking).
    pub fn update_ui<F>(&self, update: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        match self.ui_update_tx.try_send(Box::new(update)) {
            Ok(_) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.record_ui_update_dropped();
                tracing::warn!("UI update channel full - skipping update to prevent backpressure");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Failed to send UI update - handler thread has stopped");
            }
        }
    }

    /// Schedule a UI update, waiting for queue space. Never drops.
    ///
    /// Must be called from a plain thread or a `spawn_blocking` task, not from async code.
    /// Returns false once the handler thread has stopped.
    pub fn update_ui_blocking<F>(&self, update: F) -> bool
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.ui_update_tx.blocking_send(Box::new(update)).is_ok()
    }

    /// Spawn an async task on the tokio runtime
    pub fn spawn_async<F, Fut>(&self, future_factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tokio_handle.spawn(async move {
            future_factory().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    // A real Slint component needs a display, so these exercise the channel
    // behaviour the bridge relies on.

    #[test]
    fn test_blocking_send_preserves_order_from_plain_thread() {
        let (tx, mut rx) = mpsc::channel::<usize>(2);

        let producer = std::thread::spawn(move || {
            for i in 0..10 {
                tx.blocking_send(i).unwrap();
            }
        });

        let received: Vec<usize> = (0..10).map(|_| rx.blocking_recv().unwrap()).collect();
        producer.join().unwrap();
        assert_eq!(received, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_try_send_reports_full_queue() {
        let (tx, _rx) = mpsc::channel::<usize>(1);
        assert!(tx.try_send(1).is_ok());
        assert!(matches!(
            tx.try_send(2),
            Err(mpsc::error::TrySendError::Full(2))
        ));
    }

    #[test]
    fn test_blocking_send_from_blocking_task_waits_for_space() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (tx, mut rx) = mpsc::channel::<usize>(1);
        tx.try_send(0).unwrap();

        // Queue is full, so a try_send here would drop the update
        let task = rt.spawn_blocking(move || tx.blocking_send(1).is_ok());

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(rx.blocking_recv(), Some(0));
        assert!(rt.block_on(task).unwrap());
        assert_eq!(rx.blocking_recv(), Some(1));

        rt.shutdown_timeout(Duration::from_secs(1));
    }

    #[test]
    fn test_async_spawn() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = counter.clone();
        rt.spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        rt.shutdown_timeout(Duration::from_secs(1));
    }
}
