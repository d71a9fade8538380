//! Request correlation: match inbound responses to the request that caused them.
//!
//! A caller that sends a request registers a *continuation* under the
//! request's `request_id`.  When a [`ResponsePacket`] arrives, [`resolve`]
//! scans the pending table, removes the first entry with the same id and
//! fires its continuation exactly once.
//!
//! Two kinds of continuation exist:
//!
//! - **Waiter** – a oneshot sender.  The synchronous request path awaits the
//!   receiver under a timeout and removes the entry itself if it gives up.
//! - **Callback** – a closure plus a handle to the owner's [`OwnerQueue`].
//!   The network side never runs the closure: it pushes it onto the owner's
//!   queue, and the owner runs it later from [`OwnerQueue::drain`].  All
//!   owner state is therefore only touched from the owner's own task.
//!
//! # Stale entries
//!
//! A callback whose owner has gone away, or that has waited longer than the
//! configured TTL, can never be useful.  [`PendingRequests::purge_stale`]
//! removes those; it runs on every registration and every resolution.
//!
//! [`resolve`]: PendingRequests::resolve

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::protocol::packet::ResponsePacket;

/// Closure run on the owner's task when its response arrives.
pub type ResponseCallback = Box<dyn FnOnce(ResponsePacket) + Send + 'static>;

/// Deferred work queued for an owner.
pub type OwnerTask = Box<dyn FnOnce() + Send + 'static>;

/// Default lifetime of an unresolved callback.
pub const DEFAULT_CALLBACK_TTL: Duration = Duration::from_secs(60);

/// Errors returned when registering a continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CorrelationError {
    #[error("request id {0} already has a pending continuation")]
    Duplicate(u64),
}

// ── Owner queue ───────────────────────────────────────────────────────────────

/// Single-consumer queue of deferred tasks owned by one component.
///
/// Dropping the queue closes every [`OwnerQueueHandle`] pointing at it.
pub struct OwnerQueue {
    sender: mpsc::UnboundedSender<OwnerTask>,
    receiver: mpsc::UnboundedReceiver<OwnerTask>,
}

impl OwnerQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { sender, receiver }
    }

    /// Returns a handle that producers use to push tasks.
    pub fn handle(&self) -> OwnerQueueHandle {
        OwnerQueueHandle {
            sender: self.sender.clone(),
        }
    }

    /// Runs every task queued so far on the calling task.  Returns how many ran.
    pub fn drain(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.receiver.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Waits for the next task and runs it.
    pub async fn run_next(&mut self) {
        if let Some(task) = self.receiver.recv().await {
            task();
        }
    }

    /// Number of tasks waiting to be drained.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl Default for OwnerQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer side of an [`OwnerQueue`].
#[derive(Clone)]
pub struct OwnerQueueHandle {
    sender: mpsc::UnboundedSender<OwnerTask>,
}

impl OwnerQueueHandle {
    /// Queues `task`.  Returns `false` if the owner no longer exists.
    pub fn push(&self, task: OwnerTask) -> bool {
        self.sender.send(task).is_ok()
    }

    /// `true` once the owning [`OwnerQueue`] has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// ── Pending request table ─────────────────────────────────────────────────────

enum Continuation {
    Waiter(oneshot::Sender<ResponsePacket>),
    Callback {
        callback: ResponseCallback,
        owner: OwnerQueueHandle,
        registered_at: Instant,
    },
}

impl Continuation {
    fn is_stale(&self, ttl: Duration) -> bool {
        match self {
            Continuation::Waiter(tx) => tx.is_closed(),
            Continuation::Callback {
                owner,
                registered_at,
                ..
            } => owner.is_closed() || registered_at.elapsed() > ttl,
        }
    }
}

struct PendingEntry {
    request_id: u64,
    continuation: Continuation,
}

/// What [`PendingRequests::resolve`] did with a response.
#[derive(Debug, PartialEq)]
pub enum Resolution {
    /// Handed to a waiting caller.
    Delivered,
    /// Queued on the owner's task queue.
    Queued,
    /// Matched, but the waiter or owner was already gone.
    Discarded,
    /// No pending entry for this id.
    Unmatched(ResponsePacket),
}

/// Ordered table of outstanding requests.
pub struct PendingRequests {
    entries: Mutex<Vec<PendingEntry>>,
    callback_ttl: Duration,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::with_callback_ttl(DEFAULT_CALLBACK_TTL)
    }

    pub fn with_callback_ttl(callback_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            callback_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PendingEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, request_id: u64, continuation: Continuation) -> Result<(), CorrelationError> {
        let mut entries = self.lock();
        Self::purge_locked(&mut entries, self.callback_ttl);
        if entries.iter().any(|e| e.request_id == request_id) {
            return Err(CorrelationError::Duplicate(request_id));
        }
        entries.push(PendingEntry {
            request_id,
            continuation,
        });
        Ok(())
    }

    /// Registers a waiter and returns the receiver the caller awaits.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Duplicate`] if `request_id` is pending.
    pub fn register_waiter(
        &self,
        request_id: u64,
    ) -> Result<oneshot::Receiver<ResponsePacket>, CorrelationError> {
        let (tx, rx) = oneshot::channel();
        self.insert(request_id, Continuation::Waiter(tx))?;
        Ok(rx)
    }

    /// Registers a callback to be queued on `owner` when the response arrives.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Duplicate`] if `request_id` is pending.
    pub fn register_callback(
        &self,
        request_id: u64,
        owner: &OwnerQueueHandle,
        callback: ResponseCallback,
    ) -> Result<(), CorrelationError> {
        self.insert(
            request_id,
            Continuation::Callback {
                callback,
                owner: owner.clone(),
                registered_at: Instant::now(),
            },
        )
    }

    /// Fires the continuation registered for `response.request_id`, if any.
    pub fn resolve(&self, response: ResponsePacket) -> Resolution {
        let continuation = {
            let mut entries = self.lock();
            Self::purge_locked(&mut entries, self.callback_ttl);
            match entries
                .iter()
                .position(|e| e.request_id == response.request_id)
            {
                Some(index) => entries.remove(index).continuation,
                None => return Resolution::Unmatched(response),
            }
        };

        let request_id = response.request_id;
        match continuation {
            Continuation::Waiter(tx) => match tx.send(response) {
                Ok(()) => Resolution::Delivered,
                Err(_) => {
                    debug!(request_id, "waiter gave up before the response arrived");
                    Resolution::Discarded
                }
            },
            Continuation::Callback {
                callback, owner, ..
            } => {
                if owner.push(Box::new(move || callback(response))) {
                    Resolution::Queued
                } else {
                    debug!(request_id, "callback owner is gone");
                    Resolution::Discarded
                }
            }
        }
    }

    /// Removes the entry for `request_id`.  Returns whether one existed.
    pub fn remove(&self, request_id: u64) -> bool {
        let mut entries = self.lock();
        match entries.iter().position(|e| e.request_id == request_id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, request_id: u64) -> bool {
        self.lock().iter().any(|e| e.request_id == request_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every entry.  Waiters observe a closed channel.
    pub fn fail_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.lock());
        drained.len()
    }

    /// Drops callbacks whose owner is gone or whose TTL expired, and waiters
    /// whose caller stopped listening.  Returns how many were removed.
    pub fn purge_stale(&self) -> usize {
        let mut entries = self.lock();
        Self::purge_locked(&mut entries, self.callback_ttl)
    }

    fn purge_locked(entries: &mut Vec<PendingEntry>, ttl: Duration) -> usize {
        let before = entries.len();
        entries.retain(|e| !e.continuation.is_stale(ttl));
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, "purged stale pending requests");
        }
        purged
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet::ResponseCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn reply(id: u64) -> ResponsePacket {
        ResponsePacket::new(id, ResponseCode::Success, format!("reply {id}"))
    }

    #[tokio::test]
    async fn test_waiter_receives_matching_response() {
        // Arrange
        let pending = PendingRequests::new();
        let rx = pending.register_waiter(42).expect("register");

        // Act
        let outcome = pending.resolve(reply(42));

        // Assert
        assert_eq!(outcome, Resolution::Delivered);
        assert_eq!(rx.await.expect("delivered").request_id, 42);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_unmatched_response_is_returned_to_caller() {
        let pending = PendingRequests::new();
        let _rx = pending.register_waiter(1).expect("register");

        let outcome = pending.resolve(reply(2));

        assert_eq!(outcome, Resolution::Unmatched(reply(2)));
        assert!(pending.contains(1));
    }

    #[test]
    fn test_continuation_fires_at_most_once() {
        let pending = PendingRequests::new();
        let _rx = pending.register_waiter(5).expect("register");

        let first = pending.resolve(reply(5));
        let second = pending.resolve(reply(5));

        assert_eq!(first, Resolution::Delivered);
        assert_eq!(second, Resolution::Unmatched(reply(5)));
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let pending = PendingRequests::new();
        let _rx = pending.register_waiter(9).expect("register");

        let result = pending.register_waiter(9);

        assert_eq!(result.err(), Some(CorrelationError::Duplicate(9)));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_resolution_does_not_disturb_other_entries() {
        let pending = PendingRequests::new();
        let _a = pending.register_waiter(1).expect("a");
        let _b = pending.register_waiter(2).expect("b");
        let _c = pending.register_waiter(3).expect("c");

        pending.resolve(reply(2));

        assert!(pending.contains(1));
        assert!(!pending.contains(2));
        assert!(pending.contains(3));
    }

    #[test]
    fn test_callback_is_queued_not_run_inline() {
        // Arrange
        let pending = PendingRequests::new();
        let mut owner = OwnerQueue::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        pending
            .register_callback(
                7,
                &owner.handle(),
                Box::new(move |resp| *sink.lock().unwrap() = Some(resp.request_id)),
            )
            .expect("register");

        // Act
        let outcome = pending.resolve(reply(7));

        // Assert – nothing ran until the owner drained its queue
        assert_eq!(outcome, Resolution::Queued);
        assert_eq!(*seen.lock().unwrap(), None);
        assert_eq!(owner.pending(), 1);
        assert_eq!(owner.drain(), 1);
        assert_eq!(*seen.lock().unwrap(), Some(7));
    }

    #[test]
    fn test_callback_for_dropped_owner_is_purged() {
        let pending = PendingRequests::new();
        let owner = OwnerQueue::new();
        pending
            .register_callback(3, &owner.handle(), Box::new(|_| {}))
            .expect("register");

        drop(owner);

        assert_eq!(pending.purge_stale(), 1);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_callback_older_than_ttl_is_purged_on_next_registration() {
        // Arrange
        let pending = PendingRequests::with_callback_ttl(Duration::from_millis(1));
        let owner = OwnerQueue::new();
        pending
            .register_callback(1, &owner.handle(), Box::new(|_| {}))
            .expect("register");
        std::thread::sleep(Duration::from_millis(10));

        // Act
        let _rx = pending.register_waiter(2).expect("register waiter");

        // Assert
        assert!(!pending.contains(1));
        assert!(pending.contains(2));
    }

    #[test]
    fn test_waiter_whose_receiver_dropped_is_purged() {
        let pending = PendingRequests::new();
        let rx = pending.register_waiter(4).expect("register");

        drop(rx);

        assert_eq!(pending.purge_stale(), 1);
    }

    #[test]
    fn test_remove_reports_presence() {
        let pending = PendingRequests::new();
        let _rx = pending.register_waiter(11).expect("register");

        assert!(pending.remove(11));
        assert!(!pending.remove(11));
    }

    #[tokio::test]
    async fn test_fail_all_wakes_waiters_with_error() {
        let pending = PendingRequests::new();
        let rx1 = pending.register_waiter(1).expect("1");
        let rx2 = pending.register_waiter(2).expect("2");

        let failed = pending.fail_all();

        assert_eq!(failed, 2);
        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_waiters_each_receive_their_own_reply() {
        // Arrange
        let pending = Arc::new(PendingRequests::new());
        let ids: Vec<u64> = (100..132).collect();
        let mismatches = Arc::new(AtomicUsize::new(0));

        let waiters: Vec<_> = ids
            .iter()
            .map(|&id| {
                let rx = pending.register_waiter(id).expect("register");
                let mismatches = Arc::clone(&mismatches);
                tokio::spawn(async move {
                    let resp = rx.await.expect("reply");
                    if resp.request_id != id || resp.error_message != format!("reply {id}") {
                        mismatches.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        // Act – resolve in reverse order from another task
        let resolver = Arc::clone(&pending);
        let reversed: Vec<u64> = ids.iter().rev().copied().collect();
        tokio::spawn(async move {
            for id in reversed {
                assert_eq!(resolver.resolve(reply(id)), Resolution::Delivered);
            }
        })
        .await
        .expect("resolver");
        for w in waiters {
            w.await.expect("waiter");
        }

        // Assert
        assert_eq!(mismatches.load(Ordering::SeqCst), 0);
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_owner_run_next_executes_one_task() {
        let mut owner = OwnerQueue::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);

        assert!(owner.handle().push(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })));
        owner.run_next().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handle_reports_closed_after_owner_dropped() {
        let owner = OwnerQueue::new();
        let handle = owner.handle();
        assert!(!handle.is_closed());

        drop(owner);

        assert!(handle.is_closed());
        assert!(!handle.push(Box::new(|| {})));
    }
}
