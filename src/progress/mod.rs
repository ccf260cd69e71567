use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A single progress message. Transient: forwarded to live observers and
/// never stored.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub at: DateTime<Utc>,
    pub text: String,
}

impl ProgressEvent {
    fn new(text: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            text: text.into(),
        }
    }
}

/// One live observer of a task topic. Holds the receiving end of the
/// delivery channel; dropping it (or the underlying connection) makes the
/// hub evict the observer on the next publish.
pub struct ObserverSession {
    pub id: u64,
    pub topic: String,
    pub receiver: mpsc::UnboundedReceiver<ProgressEvent>,
}

/// Fans progress text out to every observer subscribed to a task topic.
///
/// The hub is an owned instance shared via `Arc`, keyed by task id so each
/// observer only sees the task it asked for. Delivery is fire-and-forget:
/// a dead observer is logged and evicted without aborting delivery to the
/// rest.
pub struct ProgressHub {
    topics: Mutex<HashMap<String, HashMap<u64, mpsc::UnboundedSender<ProgressEvent>>>>,
    next_observer_id: AtomicU64,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            next_observer_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, topic: &str) -> ObserverSession {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);

        let mut topics = self.topics.lock().unwrap();
        topics.entry(topic.to_string()).or_default().insert(id, tx);
        info!("Observer {} subscribed to topic {}, {} observer(s) now", id, topic, topics[topic].len());

        ObserverSession {
            id,
            topic: topic.to_string(),
            receiver: rx,
        }
    }

    pub fn unsubscribe(&self, session: &ObserverSession) {
        let mut topics = self.topics.lock().unwrap();
        if let Some(observers) = topics.get_mut(&session.topic) {
            observers.remove(&session.id);
            if observers.is_empty() {
                topics.remove(&session.topic);
            }
        }
        info!("Observer {} left topic {}", session.id, session.topic);
    }

    /// Delivers `text` to every observer of `topic`. Observers whose channel
    /// is gone are evicted; the remaining observers still get the message.
    pub fn publish(&self, topic: &str, text: impl Into<String>) {
        let event = ProgressEvent::new(text);
        debug!("Progress [{}]: {}", topic, event.text);

        let mut topics = self.topics.lock().unwrap();
        let Some(observers) = topics.get_mut(topic) else {
            return;
        };

        let mut dead = Vec::new();
        for (id, sender) in observers.iter() {
            if sender.send(event.clone()).is_err() {
                warn!("Failed to deliver progress to observer {}, dropping it", id);
                dead.push(*id);
            }
        }

        for id in dead {
            observers.remove(&id);
        }
        if observers.is_empty() {
            topics.remove(topic);
        }
    }

    pub fn observer_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .unwrap()
            .get(topic)
            .map(|o| o.len())
            .unwrap_or(0)
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishing handle scoped to one task's topic, threaded through the
/// pipeline so stages never see the hub or other tasks' topics.
#[derive(Clone)]
pub struct TaskProgress {
    hub: Arc<ProgressHub>,
    task_id: String,
}

impl TaskProgress {
    pub fn new(hub: Arc<ProgressHub>, task_id: impl Into<String>) -> Self {
        Self {
            hub,
            task_id: task_id.into(),
        }
    }

    pub fn send(&self, text: impl Into<String>) {
        self.hub.publish(&self.task_id, text);
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fanout_delivers_one_copy_to_each_observer() {
        let hub = ProgressHub::new();
        let mut sessions: Vec<_> = (0..3).map(|_| hub.subscribe("task-a")).collect();

        hub.publish("task-a", "extracting audio");

        for session in sessions.iter_mut() {
            let event = session.receiver.try_recv().expect("observer should get one copy");
            assert_eq!(event.text, "extracting audio");
            assert!(session.receiver.try_recv().is_err(), "no duplicate delivery");
        }
    }

    #[tokio::test]
    async fn test_dead_observer_does_not_block_the_rest() {
        let hub = ProgressHub::new();
        let dead = hub.subscribe("task-a");
        let mut alive = hub.subscribe("task-a");

        drop(dead.receiver);
        hub.publish("task-a", "still going");

        assert_eq!(alive.receiver.try_recv().unwrap().text, "still going");
        // the dead observer was evicted during publish
        assert_eq!(hub.observer_count("task-a"), 1);
    }

    #[tokio::test]
    async fn test_topics_are_isolated_per_task() {
        let hub = ProgressHub::new();
        let mut a = hub.subscribe("task-a");
        let mut b = hub.subscribe("task-b");

        hub.publish("task-a", "only for a");

        assert_eq!(a.receiver.try_recv().unwrap().text, "only for a");
        assert!(b.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_observer() {
        let hub = ProgressHub::new();
        let session = hub.subscribe("task-a");
        assert_eq!(hub.observer_count("task-a"), 1);

        hub.unsubscribe(&session);
        assert_eq!(hub.observer_count("task-a"), 0);
    }

    #[tokio::test]
    async fn test_task_progress_handle_publishes_to_its_topic() {
        let hub = Arc::new(ProgressHub::new());
        let mut session = hub.subscribe("task-x");

        let progress = TaskProgress::new(hub.clone(), "task-x");
        progress.send("step 1/3");

        assert_eq!(session.receiver.try_recv().unwrap().text, "step 1/3");
    }
}
