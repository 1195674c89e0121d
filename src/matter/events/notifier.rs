//! Urgent event delivery notifier.
//!
//! When an urgent event is logged, the reporting engine must be woken so the
//! event goes out to subscribers immediately instead of at the next reporting
//! interval.

use super::path::ConcreteEventPath;
use log::warn;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Maximum number of distinct paths awaiting urgent delivery.
pub const MAX_PENDING_URGENT: usize = 16;

/// Reporting collaborator called after an urgent event was logged.
pub trait UrgentEventScheduler: Send + Sync {
    fn schedule_urgent_event_delivery(&self, path: ConcreteEventPath);
}

/// Queues urgent event paths and wakes the reporting task.
///
/// # Usage
/// ```ignore
/// let notifier = Arc::new(UrgentEventNotifier::new());
/// let events = EventManagement::new(tiers, clock)?.with_scheduler(notifier.clone());
///
/// // reporting task
/// loop {
///     notifier.wait().await;
///     for path in notifier.take_pending() { /* build report */ }
/// }
/// ```
pub struct UrgentEventNotifier {
    signal: Notify,
    pending: Mutex<heapless::Vec<ConcreteEventPath, MAX_PENDING_URGENT>>,
}

impl UrgentEventNotifier {
    pub fn new() -> Self {
        Self {
            signal: Notify::new(),
            pending: Mutex::new(heapless::Vec::new()),
        }
    }

    /// Take the paths scheduled since the last call.
    pub fn take_pending(&self) -> heapless::Vec<ConcreteEventPath, MAX_PENDING_URGENT> {
        let mut pending = self.pending.lock();
        core::mem::take(&mut *pending)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Wait until urgent delivery is scheduled.
    ///
    /// A schedule that happened while nobody was waiting is not lost.
    pub async fn wait(&self) {
        self.signal.notified().await;
    }
}

impl Default for UrgentEventNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl UrgentEventScheduler for UrgentEventNotifier {
    fn schedule_urgent_event_delivery(&self, path: ConcreteEventPath) {
        {
            let mut pending = self.pending.lock();
            if !pending.contains(&path) && pending.push(path).is_err() {
                // the wake-up below still triggers a full report
                warn!(
                    "Urgent event queue full, dropping path ep={} cluster=0x{:04X} event=0x{:04X}",
                    path.endpoint_id, path.cluster_id, path.event_id
                );
            }
        }
        self.signal.notify_one();
    }
}
