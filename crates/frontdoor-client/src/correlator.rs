//! Request id generation and response correlation.
//!
//! The receive loop pushes every non-NOTIFY envelope into the [`Inbox`];
//! callers waiting on a request id are woken on each push and take the
//! first entry carrying their id. Waiting is event driven, there is no
//! sleep-and-rescan interval.
//!
//! Only answers are kept. A REQUEST addressed to this side is shown to the
//! arrival filter and then dropped, and the oldest unclaimed answers are
//! evicted once [`MAX_INBOX_ENTRIES`] is reached.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use frontdoor_protocol::{Envelope, MessageType};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{ClientError, ClientResult};

/// Largest request id before the counter wraps back to 0.
pub const MAX_REQUEST_ID: u32 = 9999;

/// Sequential request ids in `0..=MAX_REQUEST_ID`.
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    next: AtomicU32,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator whose first id is `start`.
    pub fn starting_at(start: u32) -> Self {
        Self {
            next: AtomicU32::new(start.min(MAX_REQUEST_ID)),
        }
    }

    /// Returns the current counter value and advances it.
    pub fn next_id(&self) -> u32 {
        let advance = |current: u32| Some(if current >= MAX_REQUEST_ID { 0 } else { current + 1 });
        match self.next.fetch_update(Ordering::AcqRel, Ordering::Acquire, advance) {
            Ok(previous) | Err(previous) => previous,
        }
    }

    /// Value the next call to [`next_id`](Self::next_id) returns.
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::Acquire)
    }
}

/// Unclaimed answers kept before the oldest is evicted.
pub const MAX_INBOX_ENTRIES: usize = 1024;

/// Predicate over an arriving envelope and its position in the inbox.
///
/// Runs under the inbox lock, so it must not call back into the inbox.
pub type ArrivalFilter = Arc<dyn Fn(&Envelope, usize) -> bool + Send + Sync>;

#[derive(Default)]
struct InboxState {
    entries: VecDeque<Envelope>,
    filter: Option<ArrivalFilter>,
}

/// Unmatched inbound envelopes awaiting correlation.
#[derive(Default)]
pub struct Inbox {
    state: Mutex<InboxState>,
    /// Fired on every stored answer and on close.
    updated: Notify,
    /// Fired when the arrival filter accepts a pushed envelope.
    arrived: Notify,
    closed: AtomicBool,
}

impl std::fmt::Debug for Inbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbox")
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offers an envelope to the arrival filter and stores it if it is an
    /// answer, waking waiters.
    ///
    /// Returns whether the arrival filter accepted it.
    pub fn push(&self, envelope: Envelope) -> bool {
        let mut state = self.lock();
        let index = state.entries.len();
        let accepted = state.filter.as_ref().is_some_and(|filter| filter(&envelope, index));
        let request_id = envelope.request_id();

        let stored = envelope.message_type() != Some(MessageType::Request);
        if stored {
            state.entries.push_back(envelope);
            if state.entries.len() > MAX_INBOX_ENTRIES
                && let Some(evicted) = state.entries.pop_front()
            {
                debug!(request_id = ?evicted.request_id(), "inbox full, evicting oldest answer");
            }
        }
        drop(state);
        trace!(?request_id, index, accepted, stored, "inbox push");

        if stored {
            self.updated.notify_waiters();
        }
        if accepted {
            self.arrived.notify_one();
        }
        accepted
    }

    /// Removes and returns the first answer carrying `request_id`.
    pub fn take(&self, request_id: u32) -> Option<Envelope> {
        let mut state = self.lock();
        let position = state
            .entries
            .iter()
            .position(|envelope| envelope.request_id() == Some(request_id))?;
        state.entries.remove(position)
    }

    /// Waits for the response to `request_id`.
    ///
    /// Fails with [`ClientError::ResponseTimeout`] once `timeout` elapses, or
    /// with [`ClientError::ConnectionClosed`] as soon as the inbox is closed.
    pub async fn await_response(&self, request_id: u32, timeout: Duration) -> ClientResult<Envelope> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.updated.notified();
            tokio::pin!(notified);
            // Register before checking so a push in between is not missed.
            notified.as_mut().enable();

            if let Some(envelope) = self.take(request_id) {
                debug!(request_id, "response matched");
                return Ok(envelope);
            }
            if self.is_closed() {
                return Err(ClientError::ConnectionClosed);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return match self.take(request_id) {
                    Some(envelope) => Ok(envelope),
                    None => Err(ClientError::ResponseTimeout { request_id, timeout }),
                };
            }
        }
    }

    /// Installs the predicate that decides which arrivals fire
    /// [`wait_arrival`](Self::wait_arrival). `None` removes it.
    pub fn set_arrival_filter(&self, filter: Option<ArrivalFilter>) {
        self.lock().filter = filter;
    }

    /// Waits for an arrival accepted by the filter.
    ///
    /// An acceptance that happened while nobody waited is remembered and
    /// consumed by the next call.
    pub async fn wait_arrival(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.arrived.notified()).await.is_ok()
    }

    /// Marks the inbox closed and wakes every waiter.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.updated.notify_waiters();
    }

    /// Empties the inbox and reopens it for a new connection.
    pub fn reset(&self) {
        self.lock().entries.clear();
        self.closed.store(false, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Id generator plus the inbox it correlates against.
#[derive(Debug, Default)]
pub struct Correlator {
    ids: RequestIdGenerator,
    inbox: Arc<Inbox>,
}

impl Correlator {
    pub fn new(inbox: Arc<Inbox>) -> Self {
        Self {
            ids: RequestIdGenerator::new(),
            inbox,
        }
    }

    pub fn next_request_id(&self) -> u32 {
        self.ids.next_id()
    }

    pub fn ids(&self) -> &RequestIdGenerator {
        &self.ids
    }

    pub fn inbox(&self) -> &Arc<Inbox> {
        &self.inbox
    }

    pub async fn await_response(&self, request_id: u32, timeout: Duration) -> ClientResult<Envelope> {
        self.inbox.await_response(request_id, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frontdoor_protocol::{Header, Method};
    use serde_json::json;

    fn response(request_id: u32, tag: &str) -> Envelope {
        Envelope::new(Header::new(Method::Get, "/test"))
            .with_message_type(MessageType::Response)
            .with_request_id(request_id)
            .with_body(json!({ "tag": tag }))
    }

    #[test]
    fn ids_increase_and_wrap() {
        let ids = RequestIdGenerator::new();
        assert_eq!(ids.next_id(), 0);
        assert_eq!(ids.next_id(), 1);

        let ids = RequestIdGenerator::starting_at(MAX_REQUEST_ID - 1);
        assert_eq!(ids.next_id(), 9998);
        assert_eq!(ids.next_id(), 9999);
        assert_eq!(ids.next_id(), 0);
        assert_eq!(ids.peek(), 1);
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let ids = Arc::new(RequestIdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..500).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<u32> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 2000);
    }

    #[test]
    fn take_is_positional_per_id() {
        let inbox = Inbox::new();
        inbox.push(response(5, "first"));
        inbox.push(response(7, "other"));
        inbox.push(response(5, "second"));

        assert_eq!(inbox.take(5).unwrap().body_field("/tag"), Some(&json!("first")));
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox.take(5).unwrap().body_field("/tag"), Some(&json!("second")));
        assert!(inbox.take(5).is_none());
        assert_eq!(inbox.take(7).unwrap().body_field("/tag"), Some(&json!("other")));
    }

    #[test]
    fn requests_are_not_kept() {
        let inbox = Inbox::new();
        for id in 0..50 {
            inbox.push(response(id, "req").with_message_type(MessageType::Request));
        }
        assert!(inbox.take(4).is_none());
        assert!(inbox.is_empty());
    }

    #[tokio::test]
    async fn filtered_request_signals_without_being_kept() {
        let inbox = Inbox::new();
        inbox.set_arrival_filter(Some(Arc::new(|envelope: &Envelope, _: usize| {
            envelope.message_type() == Some(MessageType::Request)
        })));
        assert!(inbox.push(response(1, "req").with_message_type(MessageType::Request)));
        assert!(inbox.wait_arrival(Duration::from_millis(10)).await);
        assert!(inbox.is_empty());
    }

    #[test]
    fn oldest_answers_are_evicted_when_full() {
        let inbox = Inbox::new();
        let total = MAX_INBOX_ENTRIES as u32 + 3;
        for id in 0..total {
            inbox.push(response(id, "unclaimed"));
        }
        assert_eq!(inbox.len(), MAX_INBOX_ENTRIES);
        assert!(inbox.take(0).is_none());
        assert!(inbox.take(2).is_none());
        assert!(inbox.take(3).is_some());
        assert!(inbox.take(total - 1).is_some());
    }

    #[test]
    fn filter_index_tracks_concurrent_pushes() {
        let inbox = Arc::new(Inbox::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        inbox.set_arrival_filter(Some(Arc::new(move |_: &Envelope, index: usize| {
            record.lock().unwrap().push(index);
            false
        })));

        let handles: Vec<_> = (0..4u32)
            .map(|thread| {
                let inbox = inbox.clone();
                std::thread::spawn(move || {
                    for n in 0..25 {
                        inbox.push(response(thread * 100 + n, "x"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut indexes = seen.lock().unwrap().clone();
        indexes.sort_unstable();
        assert_eq!(indexes, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn await_wakes_on_push() {
        let inbox = Arc::new(Inbox::new());
        let writer = inbox.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.push(response(7, "noise"));
            writer.push(response(3, "answer"));
        });

        let envelope = inbox.await_response(3, Duration::from_secs(5)).await.unwrap();
        assert_eq!(envelope.body_field("/tag"), Some(&json!("answer")));
        assert_eq!(inbox.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn await_times_out() {
        let inbox = Inbox::new();
        inbox.push(response(1, "unrelated"));
        let result = inbox.await_response(2, Duration::from_secs(150)).await;
        assert!(matches!(
            result,
            Err(ClientError::ResponseTimeout { request_id: 2, .. })
        ));
    }

    #[tokio::test]
    async fn close_wakes_waiters() {
        let inbox = Arc::new(Inbox::new());
        let closer = inbox.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.close();
        });

        let result = inbox.await_response(9, Duration::from_secs(30)).await;
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));

        inbox.reset();
        assert!(!inbox.is_closed());
        assert!(inbox.is_empty());
    }

    #[tokio::test]
    async fn response_already_received_survives_close() {
        let inbox = Inbox::new();
        inbox.push(response(8, "early"));
        inbox.close();
        assert!(inbox.await_response(8, Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn arrival_filter_sees_index_and_signals() {
        let inbox = Inbox::new();
        inbox.set_arrival_filter(Some(Arc::new(|envelope: &Envelope, index: usize| {
            index >= 1 && envelope.request_id() == Some(2)
        })));

        assert!(!inbox.push(response(2, "at zero")));
        assert!(!inbox.wait_arrival(Duration::from_millis(10)).await);

        assert!(inbox.push(response(2, "at one")));
        assert!(inbox.wait_arrival(Duration::from_millis(10)).await);

        inbox.set_arrival_filter(None);
        assert!(!inbox.push(response(2, "unfiltered")));
    }

    #[tokio::test]
    async fn correlator_uses_shared_inbox() {
        let inbox = Arc::new(Inbox::new());
        let correlator = Correlator::new(inbox.clone());
        let id = correlator.next_request_id();
        inbox.push(response(id, "mine"));
        let envelope = correlator.await_response(id, Duration::from_secs(1)).await.unwrap();
        assert_eq!(envelope.request_id(), Some(0));
    }
}
