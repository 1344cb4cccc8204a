use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::event::{Event, EventKind};

const MAX_HISTORY: usize = 1000;

type Handler = Arc<dyn Fn(Event) + Send + Sync>;

/// In-process publish/subscribe bus. Publishing never blocks on a slow
/// handler: each notification runs on its own thread, so one wedged
/// subscriber can't stall the publisher or its siblings.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<EventKind, Vec<Handler>>>,
    history: Mutex<VecDeque<Event>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `kind`. Handlers cannot be compared for
    /// equality once erased behind `dyn Fn`, so unlike the reference
    /// implementation this does not reject duplicate subscriptions.
    pub fn subscribe(&self, kind: EventKind, handler: impl Fn(Event) + Send + Sync + 'static) {
        let mut subscribers = self.subscribers.lock().expect("event bus poisoned");
        subscribers.entry(kind).or_default().push(Arc::new(handler));
        tracing::info!(event = "taskflow.eventbus.subscribe", kind = ?kind, "handler subscribed");
    }

    pub fn publish(
        &self,
        kind: EventKind,
        payload: HashMap<String, Value>,
        source: impl Into<String>,
        correlation_id: Option<String>,
    ) -> Uuid {
        let event = Event {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            payload,
            source: source.into(),
            correlation_id,
        };

        {
            let mut history = self.history.lock().expect("event bus poisoned");
            if history.len() == MAX_HISTORY {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        self.notify_subscribers(&event);
        tracing::info!(event = "taskflow.eventbus.publish", event_id = %event.id, kind = ?event.kind, "event published");
        event.id
    }

    fn notify_subscribers(&self, event: &Event) {
        let handlers = {
            let subscribers = self.subscribers.lock().expect("event bus poisoned");
            subscribers.get(&event.kind).cloned().unwrap_or_default()
        };
        for handler in handlers {
            let event = event.clone();
            std::thread::spawn(move || handler(event));
        }
    }

    pub fn get_events(
        &self,
        kind: Option<EventKind>,
        correlation_id: Option<&str>,
        limit: usize,
    ) -> Vec<Event> {
        let mut events: Vec<Event> = {
            let history = self.history.lock().expect("event bus poisoned");
            history.iter().cloned().collect()
        };
        if let Some(kind) = kind {
            events.retain(|e| e.kind == kind);
        }
        if let Some(correlation_id) = correlation_id {
            events.retain(|e| e.correlation_id.as_deref() == Some(correlation_id));
        }
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit);
        events
    }

    /// Re-delivers every historical event for `correlation_id`, oldest first,
    /// to whichever handlers are currently subscribed.
    pub fn replay_events(&self, correlation_id: &str) {
        let mut events = self.get_events(None, Some(correlation_id), MAX_HISTORY);
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        tracing::info!(event = "taskflow.eventbus.replay", correlation_id, count = events.len(), "replaying events");
        for event in &events {
            self.notify_subscribers(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let received = Arc::new(AtomicUsize::new(0));
        let received2 = received.clone();
        bus.subscribe(EventKind::TaskCreated, move |_event| {
            received2.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(EventKind::TaskCreated, HashMap::new(), "test", None);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscriber_of_other_kind_is_not_notified() {
        let bus = EventBus::new();
        let received = Arc::new(AtomicUsize::new(0));
        let received2 = received.clone();
        bus.subscribe(EventKind::TaskFailed, move |_event| {
            received2.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(EventKind::TaskCreated, HashMap::new(), "test", None);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(received.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn get_events_filters_by_kind_and_correlation_id() {
        let bus = EventBus::new();
        bus.publish(EventKind::TaskCreated, HashMap::new(), "test", Some("corr-1".into()));
        bus.publish(EventKind::TaskFailed, HashMap::new(), "test", Some("corr-1".into()));
        bus.publish(EventKind::TaskCreated, HashMap::new(), "test", Some("corr-2".into()));

        let events = bus.get_events(Some(EventKind::TaskCreated), Some("corr-1"), 100);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id.as_deref(), Some("corr-1"));
    }

    #[test]
    fn history_is_bounded_at_max_capacity() {
        let bus = EventBus::new();
        for _ in 0..(MAX_HISTORY + 10) {
            bus.publish(EventKind::TaskCreated, HashMap::new(), "test", None);
        }
        let events = bus.get_events(None, None, MAX_HISTORY + 100);
        assert_eq!(events.len(), MAX_HISTORY);
    }

    #[test]
    fn replay_redelivers_to_current_subscribers() {
        let bus = EventBus::new();
        bus.publish(EventKind::TaskCreated, HashMap::new(), "test", Some("corr-3".into()));

        let received = Arc::new(AtomicUsize::new(0));
        let received2 = received.clone();
        bus.subscribe(EventKind::TaskCreated, move |_event| {
            received2.fetch_add(1, Ordering::SeqCst);
        });

        bus.replay_events("corr-3");
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }
}
