// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::warn;

use crate::event::{Event, Topic};

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct Registry {
    /// Topic-scoped subscribers, in subscription order
    by_topic: HashMap<Topic, Vec<(u64, Handler)>>,
    /// Subscribers that see every event
    all: Vec<(u64, Handler)>,
}

/// Synchronous in-process pub/sub.
///
/// `publish` runs every matching handler on the caller's thread; a panicking
/// handler is caught and logged so neither the publisher nor the remaining
/// subscribers are affected.  Events from a single publisher therefore reach
/// each subscriber in publish order.
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler for a single topic.  The returned [`Subscription`]
    /// removes the handler when cancelled or dropped.
    pub fn subscribe(
        &self,
        topic: Topic,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut reg = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        reg.by_topic
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            id,
            topic: Some(topic),
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Register a handler that observes every event regardless of topic.
    pub fn subscribe_all(&self, handler: impl Fn(&Event) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut reg = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        reg.all.push((id, Arc::new(handler)));
        Subscription {
            id,
            topic: None,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Dispatch `event` synchronously to all matching subscribers.
    pub fn publish(&self, event: &Event) {
        // Snapshot handlers so a subscriber that subscribes/cancels during
        // dispatch cannot deadlock on the registry mutex.
        let handlers: Vec<Handler> = {
            let reg = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            let mut out: Vec<Handler> = Vec::new();
            if let Some(list) = reg.by_topic.get(&event.topic()) {
                out.extend(list.iter().map(|(_, h)| Arc::clone(h)));
            }
            out.extend(reg.all.iter().map(|(_, h)| Arc::clone(h)));
            out
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(topic = ?event.topic(), "event subscriber panicked; continuing");
            }
        }
    }

    /// Number of live subscribers (topic-scoped + catch-all).
    pub fn subscriber_count(&self) -> usize {
        let reg = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        reg.by_topic.values().map(Vec::len).sum::<usize>() + reg.all.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation handle returned by [`EventBus::subscribe`].
///
/// Dropping the handle unsubscribes; `cancel()` does so explicitly.
pub struct Subscription {
    id: u64,
    topic: Option<Topic>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn cancel(self) {
        // Drop does the work.
    }

    fn remove(&self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut reg = registry.lock().unwrap_or_else(|e| e.into_inner());
            match self.topic {
                Some(topic) => {
                    if let Some(list) = reg.by_topic.get_mut(&topic) {
                        list.retain(|(id, _)| *id != self.id);
                    }
                }
                None => reg.all.retain(|(id, _)| *id != self.id),
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::event::{KbChange, KbChangeKind};

    fn file_created(path: &str) -> Event {
        Event::KbChanged {
            user_id: 1,
            kb_id: "kb".into(),
            change: KbChange::new(KbChangeKind::FileCreated, path),
            source: "test".into(),
        }
    }

    #[test]
    fn subscriber_receives_matching_topic() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _sub = bus.subscribe(Topic::FileCreated, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(&file_created("a.md"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscriber_ignores_other_topics() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _sub = bus.subscribe(Topic::FileDeleted, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(&file_created("a.md"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_subscriber_does_not_stop_others() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let _bad = bus.subscribe(Topic::FileCreated, |_| panic!("boom"));
        let h = Arc::clone(&hits);
        let _good = bus.subscribe(Topic::FileCreated, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(&file_created("a.md"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_subscription_stops_delivery() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let sub = bus.subscribe(Topic::FileCreated, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(&file_created("a.md"));
        drop(sub);
        bus.publish(&file_created("b.md"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribe_all_sees_every_topic() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _sub = bus.subscribe_all(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(&file_created("a.md"));
        bus.publish(&Event::GitPull {
            user_id: 1,
            kb_id: "kb".into(),
        });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn single_publisher_order_is_preserved() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = bus.subscribe(Topic::FileCreated, move |ev| {
            if let Event::KbChanged { change, .. } = ev {
                s.lock().unwrap().push(change.path.clone());
            }
        });
        for name in ["1.md", "2.md", "3.md"] {
            bus.publish(&file_created(name));
        }
        let got = seen.lock().unwrap();
        assert_eq!(
            got.as_slice(),
            &[
                std::path::PathBuf::from("1.md"),
                std::path::PathBuf::from("2.md"),
                std::path::PathBuf::from("3.md")
            ]
        );
    }

    #[test]
    fn cancel_removes_subscriber_count() {
        let bus = EventBus::new();
        let sub = bus.subscribe(Topic::GitCommit, |_| {});
        assert_eq!(bus.subscriber_count(), 1);
        sub.cancel();
        assert_eq!(bus.subscriber_count(), 0);
    }
}
