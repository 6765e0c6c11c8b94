//! C13: in-process publish-subscribe for [`AuditEvent`]s.
//!
//! Delivery is best-effort: a subscriber with a full mailbox has its oldest
//! queued event dropped (counted) rather than backpressuring the applier.
//! Sequence numbers are assigned centrally so ordering per `(key, resource)`
//! is monotonic regardless of how many subscribers exist.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::model::AuditEvent;

const DEFAULT_MAILBOX_CAPACITY: usize = 256;

struct Subscriber {
    sender: mpsc::Sender<AuditEvent>,
    dropped: Arc<AtomicU64>,
}

/// Central sequence counter plus a set of bounded per-subscriber mailboxes.
pub struct AuditBus {
    sequence: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
    mailbox_capacity: usize,
}

impl Default for AuditBus {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }
}

impl AuditBus {
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            sequence: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
            mailbox_capacity,
        }
    }

    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers a new subscriber and returns its receiving end plus a
    /// handle to its drop counter.
    pub fn subscribe(&self) -> (mpsc::Receiver<AuditEvent>, Arc<AtomicU64>) {
        let (tx, rx) = mpsc::channel(self.mailbox_capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        self.subscribers.lock().push(Subscriber {
            sender: tx,
            dropped: dropped.clone(),
        });
        (rx, dropped)
    }

    /// Delivers `event` to every subscriber's mailbox. A full mailbox drops
    /// the event and increments that subscriber's counter; it never blocks.
    pub fn publish(&self, event: AuditEvent) {
        let subscribers = self.subscribers.lock();
        for sub in subscribers.iter() {
            if sub.sender.try_send(event.clone()).is_err() {
                sub.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Resource, SeriesKey};

    fn event(sequence: u64) -> AuditEvent {
        AuditEvent::ResizeAttempt {
            correlation_id: uuid::Uuid::new_v4(),
            sequence,
            key: SeriesKey::new("ns", "pod", "app"),
            resource: Resource::Cpu,
            requested_value: 100,
            at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn delivers_to_all_subscribers() {
        let bus = AuditBus::default();
        let (mut rx1, _) = bus.subscribe();
        let (mut rx2, _) = bus.subscribe();
        bus.publish(event(bus.next_sequence()));

        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn full_mailbox_drops_and_counts_instead_of_blocking() {
        let bus = AuditBus::new(1);
        let (_rx, dropped) = bus.subscribe();
        bus.publish(event(0));
        bus.publish(event(1));
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sequence_is_monotonic() {
        let bus = AuditBus::default();
        let a = bus.next_sequence();
        let b = bus.next_sequence();
        assert!(b > a);
    }
}
