//! Fan-out of `model::Event`s to `events.subscribe` connections (§5).
//!
//! A dedicated task drains the daemon's shared `broadcast::Receiver<Event>`
//! and calls [`Broadcaster::dispatch`], which snapshots the subscriber list,
//! forwards to every subscriber whose topic set matches, and silently drops
//! any subscriber whose channel has gone away.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Mutex;

use model::event::{Event, Topic};
use tokio::sync::mpsc;

/// One `events.subscribe` connection's registration.
struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<Event>,
    topics: BTreeSet<Topic>,
}

/// Registry of live subscribers plus the fan-out logic.
pub struct Broadcaster {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: Mutex<u64>,
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.subscribers.lock().map(|s| s.len()).unwrap_or(0);
        f.debug_struct("Broadcaster").field("subscribers", &count).finish()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    /// Register a new subscriber for `topics`, returning its id (used to
    /// unregister on connection close) and the receiving half of its
    /// channel.
    pub fn subscribe(&self, topics: BTreeSet<Topic>) -> (u64, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut next_id = self.next_id.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let id = *next_id;
        *next_id = next_id.wrapping_add(1);
        drop(next_id);
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.push(Subscriber { id, tx, topics });
        (id, rx)
    }

    /// Drop a subscriber, typically called when its connection closes.
    pub fn unsubscribe(&self, id: u64) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|s| s.id != id);
    }

    /// Forward `event` to every subscriber whose topic set contains it,
    /// evicting any whose channel is closed.
    pub fn dispatch(&self, event: &Event) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|s| {
            if !s.topics.contains(&event.topic) {
                return true;
            }
            s.tx.send(event.clone()).is_ok()
        });
    }

    /// Number of currently registered subscribers, for `daemon.status`.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(topic: Topic) -> Event {
        Event::new(topic, json!({"ok": true}))
    }

    #[test]
    fn dispatch_only_reaches_matching_topics() {
        let broadcaster = Broadcaster::new();
        let (_id, mut rx) = broadcaster.subscribe(BTreeSet::from([Topic::Orders]));
        broadcaster.dispatch(&event(Topic::Fills));
        assert!(rx.try_recv().is_err());
        broadcaster.dispatch(&event(Topic::Orders));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn dropped_receiver_is_evicted_on_next_dispatch() {
        let broadcaster = Broadcaster::new();
        let (_id, rx) = broadcaster.subscribe(BTreeSet::from([Topic::Risk]));
        drop(rx);
        assert_eq!(broadcaster.subscriber_count(), 1);
        broadcaster.dispatch(&event(Topic::Risk));
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn unsubscribe_removes_by_id() {
        let broadcaster = Broadcaster::new();
        let (id, _rx) = broadcaster.subscribe(BTreeSet::from([Topic::Pnl]));
        assert_eq!(broadcaster.subscriber_count(), 1);
        broadcaster.unsubscribe(id);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }
}
