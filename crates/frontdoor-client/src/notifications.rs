//! Classification of inbound envelopes.
//!
//! Every envelope first reaches the endpoint callback registered for its
//! resource (if any). NOTIFY envelopes are then kept as notifications; all
//! other traffic goes to the correlation [`Inbox`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use frontdoor_protocol::{Envelope, decode_message};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::correlator::Inbox;

/// How notifications are retained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMode {
    /// Keep only the most recent notification.
    #[default]
    Latest,
    /// Keep every notification in arrival order.
    Queue,
}

/// Per-resource callback invoked for every inbound envelope on that resource.
pub type EndpointCallback = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Where an inbound envelope ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Stored as a notification.
    Notification,
    /// Offered to the inbox; `accepted` reports the arrival filter verdict.
    Inbox { accepted: bool },
}

#[derive(Default)]
struct Notifications {
    latest: Option<Envelope>,
    queue: VecDeque<Envelope>,
    /// Count of notifications stored so far.
    generation: u64,
}

/// Splits inbound traffic into notifications and correlated responses.
pub struct NotificationChannel {
    mode: NotificationMode,
    endpoints: RwLock<HashMap<String, EndpointCallback>>,
    notifications: Mutex<Notifications>,
    notified: Notify,
    inbox: Arc<Inbox>,
}

impl NotificationChannel {
    pub fn new(mode: NotificationMode, inbox: Arc<Inbox>) -> Self {
        Self {
            mode,
            endpoints: RwLock::new(HashMap::new()),
            notifications: Mutex::new(Notifications::default()),
            notified: Notify::new(),
            inbox,
        }
    }

    pub fn mode(&self) -> NotificationMode {
        self.mode
    }

    pub fn inbox(&self) -> &Arc<Inbox> {
        &self.inbox
    }

    /// Registers `callback` for `resource`, replacing any previous one.
    pub fn add_endpoint(&self, resource: impl Into<String>, callback: EndpointCallback) {
        self.endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(resource.into(), callback);
    }

    pub fn remove_endpoint(&self, resource: &str) -> bool {
        self.endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(resource)
            .is_some()
    }

    /// Routes one inbound envelope.
    pub fn dispatch(&self, envelope: Envelope) -> Delivery {
        let callback = self
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(envelope.resource())
            .cloned();
        if let Some(callback) = callback {
            callback(&envelope);
        }

        if envelope.is_notification() {
            debug!(resource = %envelope.resource(), "notification received");
            self.store(envelope);
            Delivery::Notification
        } else {
            let accepted = self.inbox.push(envelope);
            Delivery::Inbox { accepted }
        }
    }

    /// Decodes and routes one text frame. Malformed frames are dropped.
    pub fn dispatch_text(&self, text: &str) -> Option<Delivery> {
        match decode_message(text) {
            Ok(envelope) => Some(self.dispatch(envelope)),
            Err(e) => {
                warn!(error = %e, "dropping malformed inbound message");
                None
            }
        }
    }

    fn store(&self, envelope: Envelope) {
        {
            let mut notifications = self.lock();
            if self.mode == NotificationMode::Queue {
                notifications.queue.push_back(envelope.clone());
            }
            notifications.latest = Some(envelope);
            notifications.generation += 1;
        }
        self.notified.notify_waiters();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Notifications> {
        self.notifications.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Most recent notification, in either mode.
    pub fn last_notification(&self) -> Option<Envelope> {
        self.lock().latest.clone()
    }

    /// Removes and returns the oldest queued notification.
    pub fn pop_notification(&self) -> Option<Envelope> {
        self.lock().queue.pop_front()
    }

    pub fn notifications_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn notification_count(&self) -> usize {
        self.lock().queue.len()
    }

    /// Drops the oldest queued notifications until at most `remaining` are left.
    pub fn drain_notifications_to(&self, remaining: usize) -> Vec<Envelope> {
        let mut notifications = self.lock();
        let excess = notifications.queue.len().saturating_sub(remaining);
        notifications.queue.drain(..excess).collect()
    }

    /// Waits for the next notification.
    ///
    /// In queue mode this pops the oldest queued entry (waiting if the queue
    /// is empty); in latest mode it returns the next notification to arrive
    /// after the call, never one stored before it.
    pub async fn next_notification(&self, timeout: Duration) -> Option<Envelope> {
        let deadline = tokio::time::Instant::now() + timeout;
        let start = self.lock().generation;
        loop {
            let notified = self.notified.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut notifications = self.lock();
                match self.mode {
                    NotificationMode::Queue => {
                        if let Some(envelope) = notifications.queue.pop_front() {
                            return Some(envelope);
                        }
                    }
                    NotificationMode::Latest if notifications.generation != start => {
                        return notifications.latest.clone();
                    }
                    NotificationMode::Latest => {}
                }
            }

            tokio::time::timeout_at(deadline, notified).await.ok()?;
        }
    }
}
