//! Request id allocation and response routing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gethctl_frame::{RequestId, Response};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::CallError;

/// Outcome delivered to a pending call.
pub type Completion = std::result::Result<Value, CallError>;

/// What happened to an inbound response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Routed to the call that issued the id.
    Delivered(RequestId),
    /// No call was waiting on this id.
    Unmatched(RequestId),
    /// The message carried no usable id.
    MissingId,
}

/// Monotonic request id sequence, starting at 1.
///
/// Shared between correlators so ids keep increasing across reconnects
/// and node restarts.
#[derive(Debug)]
pub struct RequestIds {
    next: AtomicU64,
}

impl RequestIds {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Take the next id.
    pub fn next_id(&self) -> RequestId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The id the next call will take.
    pub fn peek(&self) -> RequestId {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps outstanding request ids to their completions.
///
/// Ids start at 1 and only increase. An id has at most one pending entry,
/// and each entry resolves exactly once: whichever of `resolve`, `cancel`
/// or `fail_all` reaches it first removes it.
pub struct Correlator {
    ids: Arc<RequestIds>,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<Completion>>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::with_ids(Arc::new(RequestIds::new()))
    }

    /// Correlator drawing its ids from a shared sequence.
    pub fn with_ids(ids: Arc<RequestIds>) -> Self {
        Self {
            ids,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn ids(&self) -> &Arc<RequestIds> {
        &self.ids
    }

    /// Allocate the next id and park a completion for it.
    ///
    /// Call before writing the request so an immediate response finds
    /// its entry.
    pub fn register(&self) -> (RequestId, oneshot::Receiver<Completion>) {
        let id = self.ids.next_id();
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        debug!(id, "registered request");
        (id, rx)
    }

    /// Route a response to the call that issued its id.
    pub fn resolve(&self, response: Response) -> Resolution {
        let Some(id) = response.request_id() else {
            warn!(id = ?response.id, "dropping response without a usable id");
            return Resolution::MissingId;
        };

        let Some(tx) = self.lock().remove(&id) else {
            warn!(id, "dropping response for unknown or finished request");
            return Resolution::Unmatched(id);
        };

        let outcome = response.into_outcome().map_err(CallError::from);
        if tx.send(outcome).is_err() {
            debug!(id, "caller stopped waiting before the response arrived");
        }
        Resolution::Delivered(id)
    }

    /// Remove an entry without resolving it.
    ///
    /// Returns false when the entry was already gone.
    pub fn cancel(&self, id: RequestId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Fail every pending entry, returning how many there were.
    pub fn fail_all<F>(&self, reason: F) -> usize
    where
        F: Fn() -> CallError,
    {
        let drained: Vec<_> = self.lock().drain().collect();
        let count = drained.len();
        for (id, tx) in drained {
            debug!(id, "failing pending request");
            let _ = tx.send(Err(reason()));
        }
        count
    }

    /// Number of calls still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, oneshot::Sender<Completion>>> {
        // Entries stay consistent even if a holder panicked mid-operation.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use gethctl_frame::RpcError;
    use serde_json::json;

    use super::*;

    fn response(value: Value) -> Response {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn resolves_result_to_its_caller() {
        let correlator = Correlator::new();
        let (id, rx) = correlator.register();
        assert_eq!(id, 1);

        let resolution = correlator.resolve(response(json!({"id": 1, "result": "0xabc"})));
        assert_eq!(resolution, Resolution::Delivered(1));
        assert_eq!(rx.await.unwrap().unwrap(), json!("0xabc"));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn resolves_error_to_its_caller() {
        let correlator = Correlator::new();
        let (_, rx) = correlator.register();

        correlator.resolve(response(json!({
            "id": 1,
            "error": {"code": -32000, "message": "account is locked"}
        })));
        match rx.await.unwrap() {
            Err(CallError::Rpc(err)) => assert_eq!(err.message, "account is locked"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ids_increase_from_one() {
        let correlator = Correlator::new();
        let ids: Vec<_> = (0..5).map(|_| correlator.register().0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(correlator.pending_count(), 5);
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let correlator = Arc::new(Correlator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let correlator = Arc::clone(&correlator);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| correlator.register().0)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "id {id} issued twice");
            }
        }
        assert_eq!(seen.len(), 800);
        assert_eq!(seen.iter().min(), Some(&1));
        assert_eq!(seen.iter().max(), Some(&800));
    }

    #[test]
    fn second_response_for_same_id_is_unmatched() {
        let correlator = Correlator::new();
        let (_, _rx) = correlator.register();

        let first = correlator.resolve(response(json!({"id": 1, "result": true})));
        let second = correlator.resolve(response(json!({"id": 1, "result": true})));
        assert_eq!(first, Resolution::Delivered(1));
        assert_eq!(second, Resolution::Unmatched(1));
    }

    #[test]
    fn unknown_and_missing_ids_are_dropped() {
        let correlator = Correlator::new();
        assert_eq!(
            correlator.resolve(response(json!({"id": 42, "result": 1}))),
            Resolution::Unmatched(42)
        );
        assert_eq!(
            correlator.resolve(response(json!({"result": 1}))),
            Resolution::MissingId
        );
    }

    #[test]
    fn late_response_after_cancel_is_unmatched() {
        let correlator = Correlator::new();
        let (id, _rx) = correlator.register();
        assert!(correlator.cancel(id));
        assert!(!correlator.cancel(id));

        assert_eq!(
            correlator.resolve(response(json!({"id": id, "result": "late"}))),
            Resolution::Unmatched(id)
        );
    }

    #[test]
    fn dropped_receiver_still_counts_as_delivered() {
        let correlator = Correlator::new();
        let (id, rx) = correlator.register();
        drop(rx);
        assert_eq!(
            correlator.resolve(response(json!({"id": id, "result": 1}))),
            Resolution::Delivered(id)
        );
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn fail_all_drains_every_entry() {
        let correlator = Correlator::new();
        let (_, first) = correlator.register();
        let (_, second) = correlator.register();

        assert_eq!(correlator.fail_all(|| CallError::ConnectionClosed), 2);
        assert_eq!(correlator.pending_count(), 0);
        assert!(matches!(first.await.unwrap(), Err(CallError::ConnectionClosed)));
        assert!(matches!(second.await.unwrap(), Err(CallError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn out_of_order_responses_reach_their_own_callers() {
        let correlator = Correlator::new();
        let (a, rx_a) = correlator.register();
        let (b, rx_b) = correlator.register();

        correlator.resolve(Response::success(b, json!("second")));
        correlator.resolve(Response::failure(a, RpcError::new(-1, "first failed")));

        assert_eq!(rx_b.await.unwrap().unwrap(), json!("second"));
        assert!(matches!(rx_a.await.unwrap(), Err(CallError::Rpc(_))));
    }

    #[test]
    fn correlators_sharing_ids_never_reuse_one() {
        let ids = Arc::new(RequestIds::new());
        let first = Correlator::with_ids(Arc::clone(&ids));
        let (a, _rx_a) = first.register();
        let (b, _rx_b) = first.register();
        drop(first);

        let second = Correlator::with_ids(Arc::clone(&ids));
        let (c, _rx_c) = second.register();
        assert_eq!((a, b, c), (1, 2, 3));
        assert_eq!(ids.peek(), 4);
        assert_eq!(second.pending_count(), 1);
    }
}
