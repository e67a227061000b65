use std::collections::HashMap;
use std::sync::Mutex;

use log::{debug, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::message::Record;

pub type SubscriberId = u64;

/// Result of one per-subscriber delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The receiving half is gone; the subscriber gets pruned after the
    /// broadcast pass completes.
    Closed,
}

/// Fan-out hub over the live subscriber set.
///
/// Subscribers are plain string channels; the transport (a WebSocket task,
/// or a test harness) drains them. Delivery is failure-isolated: a dead
/// subscriber never blocks the others, it is simply removed once the pass
/// is done.
pub struct Broadcaster {
    inner: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    next_id: SubscriberId,
    subscribers: HashMap<SubscriberId, UnboundedSender<String>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Registry::default()),
        }
    }

    /// Add a subscriber. The `init` snapshot is queued as its first frame
    /// before the id becomes visible to broadcasts, so a late joiner always
    /// sees `init` first. Also returns a sender for direct (non-broadcast)
    /// replies such as `pong`.
    pub fn register(
        &self,
        init: &Record,
    ) -> (SubscriberId, UnboundedReceiver<String>, UnboundedSender<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(encode(init));

        let mut registry = self.inner.lock().expect("subscriber registry poisoned");
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.insert(id, tx.clone());
        debug!(
            "subscriber {} registered ({} connected)",
            id,
            registry.subscribers.len()
        );
        (id, rx, tx)
    }

    /// Drop a subscriber whose transport disconnected.
    pub fn unregister(&self, id: SubscriberId) {
        let mut registry = self.inner.lock().expect("subscriber registry poisoned");
        if registry.subscribers.remove(&id).is_some() {
            debug!(
                "subscriber {} unregistered ({} left)",
                id,
                registry.subscribers.len()
            );
        }
    }

    pub fn client_count(&self) -> usize {
        self.inner
            .lock()
            .expect("subscriber registry poisoned")
            .subscribers
            .len()
    }

    /// Serialize once, deliver the identical frame to every subscriber,
    /// then prune the ones whose channel closed.
    pub fn broadcast(&self, record: &Record) {
        let mut registry = self.inner.lock().expect("subscriber registry poisoned");
        if registry.subscribers.is_empty() {
            return;
        }

        let frame = encode(record);
        let mut closed = Vec::new();
        for (&id, tx) in &registry.subscribers {
            if send_frame(tx, frame.clone()) == SendOutcome::Closed {
                closed.push(id);
            }
        }
        for id in closed {
            warn!("subscriber {} closed mid-broadcast, pruning", id);
            registry.subscribers.remove(&id);
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

fn send_frame(tx: &UnboundedSender<String>, frame: String) -> SendOutcome {
    match tx.send(frame) {
        Ok(()) => SendOutcome::Sent,
        Err(_) => SendOutcome::Closed,
    }
}

fn encode(record: &Record) -> String {
    serde_json::to_string(record).expect("record serializes to JSON")
}
