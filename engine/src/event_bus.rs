//! Fan-out of turn records to live observers.
//!
//! Each subscriber owns an unbounded queue, so a slow observer never blocks
//! the control loop or another observer. Records are serialized once per
//! publish and shared as `Arc<str>`. There is no replay: a subscriber sees
//! only what is published after it joined.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use shared_types::TurnRecord;
use tokio::sync::mpsc;
use tracing::{debug, warn};

type Queue = mpsc::UnboundedSender<Arc<str>>;

struct Registry {
    next_id: u64,
    queues: HashMap<u64, Queue>,
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                queues: HashMap::new(),
            })),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut registry = self.inner.lock().expect("EventBus lock poisoned");
            registry.next_id += 1;
            let id = registry.next_id;
            registry.queues.insert(id, tx);
            id
        };
        debug!(subscriber = id, "event subscriber joined");
        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Idempotent.
    pub fn unsubscribe(&self, id: u64) {
        remove(&self.inner, id);
    }

    /// Deliver `record` to every live subscriber. Returns how many queues
    /// accepted it; closed queues are dropped from the registry.
    pub fn publish(&self, record: &TurnRecord) -> usize {
        let message: Arc<str> = match serde_json::to_string(record) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(turn = record.turn, error = %e, "failed to encode turn record");
                return 0;
            }
        };
        self.publish_raw(message)
    }

    pub fn publish_raw(&self, message: Arc<str>) -> usize {
        let mut registry = self.inner.lock().expect("EventBus lock poisoned");
        registry
            .queues
            .retain(|_, queue| queue.send(Arc::clone(&message)).is_ok());
        registry.queues.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .expect("EventBus lock poisoned")
            .queues
            .len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn remove(registry: &Mutex<Registry>, id: u64) {
    let removed = registry
        .lock()
        .expect("EventBus lock poisoned")
        .queues
        .remove(&id)
        .is_some();
    if removed {
        debug!(subscriber = id, "event subscriber left");
    }
}

/// A live feed of serialized turn records. Unregisters itself on drop.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Arc<str>>,
    bus: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next message, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.bus.upgrade() {
            remove(&registry, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared_types::{TurnRequest, TurnResponse, TurnStatus};

    fn record(turn: u64) -> TurnRecord {
        TurnRecord {
            turn,
            timestamp: Utc::now(),
            latency_ms: 1,
            request: TurnRequest {
                context: "hi".to_string(),
                model: "m".to_string(),
            },
            response: TurnResponse {
                status: TurnStatus::Ok,
                text: "click(1, 1)".to_string(),
                error: None,
                usage: serde_json::Value::Null,
            },
            actions: Vec::new(),
            malformed: Vec::new(),
        }
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(&record(1)), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_record_in_order() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        assert_eq!(bus.publish(&record(1)), 2);
        assert_eq!(bus.publish(&record(2)), 2);

        for sub in [&mut a, &mut b] {
            let first: TurnRecord = serde_json::from_str(&sub.recv().await.unwrap()).unwrap();
            let second: TurnRecord = serde_json::from_str(&sub.recv().await.unwrap()).unwrap();
            assert_eq!((first.turn, second.turn), (1, 2));
        }
    }

    #[test]
    fn late_subscribers_get_no_replay() {
        let bus = EventBus::new();
        bus.publish(&record(1));
        let mut late = bus.subscribe();
        assert!(late.try_recv().is_none());

        bus.publish(&record(2));
        let got: TurnRecord = serde_json::from_str(&late.try_recv().unwrap()).unwrap();
        assert_eq!(got.turn, 2);
    }

    #[test]
    fn dropped_subscriptions_unregister() {
        let bus = EventBus::new();
        let keep = bus.subscribe();
        let gone = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(gone);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.publish(&record(1)), 1);

        bus.unsubscribe(keep.id());
        bus.unsubscribe(keep.id());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn subscription_outliving_the_bus_is_harmless() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        drop(bus);
        assert!(sub.try_recv().is_none());
        drop(sub);
    }
}
