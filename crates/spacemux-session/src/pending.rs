//! The pending-request table: correlates `did-request` replies with the
//! callers waiting on them.
//!
//! Owned by the session driver task, so it is a plain `HashMap` with no
//! locking. Every entry holds the `oneshot` sender its caller is awaiting;
//! removing an entry always completes that caller, one way or another.

use std::collections::HashMap;
use std::time::Duration;

use spacemux_protocol::{RequestId, Value};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::RequestError;

/// What the caller of [`Mux::request`](crate::Mux::request) eventually gets.
pub(crate) type ReplySender = oneshot::Sender<Result<Value, RequestError>>;

struct PendingRequest {
    issued: Instant,
    reply: ReplySender,
}

/// Requests that have been issued but not yet answered.
pub(crate) struct PendingTable {
    next_id: u64,
    requests: HashMap<RequestId, PendingRequest>,
    high_water: usize,
    timeout: Duration,
}

impl PendingTable {
    pub(crate) fn new(high_water: usize, timeout: Duration) -> Self {
        Self {
            next_id: 1,
            requests: HashMap::new(),
            high_water,
            timeout,
        }
    }

    /// Hands out the next request id. Ids start at 1 and are never reused
    /// within a session.
    pub(crate) fn allocate(&mut self) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Records a request as in flight.
    ///
    /// When the table has grown past its high-water mark, stale entries are
    /// swept first.
    pub(crate) fn register(&mut self, id: RequestId, reply: ReplySender) {
        if self.requests.len() >= self.high_water {
            self.evict_stale(Instant::now());
        }
        self.requests.insert(
            id,
            PendingRequest {
                issued: Instant::now(),
                reply,
            },
        );
    }

    /// Completes the request with its reply.
    ///
    /// Returns `false` if no such request is pending (already answered,
    /// evicted, or never issued).
    pub(crate) fn resolve(&mut self, id: RequestId, result: Result<Value, RequestError>) -> bool {
        let Some(pending) = self.requests.remove(&id) else {
            return false;
        };
        // The caller may have stopped waiting; that is not our problem.
        let _ = pending.reply.send(result);
        true
    }

    /// Fails every request older than the configured timeout with
    /// [`RequestError::Timeout`]. Returns how many were evicted.
    pub(crate) fn evict_stale(&mut self, now: Instant) -> usize {
        let stale: Vec<RequestId> = self
            .requests
            .iter()
            .filter(|(_, p)| now.duration_since(p.issued) >= self.timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in &stale {
            self.resolve(*id, Err(RequestError::Timeout(*id)));
        }
        if !stale.is_empty() {
            tracing::warn!(
                evicted = stale.len(),
                remaining = self.requests.len(),
                "evicted timed-out requests"
            );
        }
        stale.len()
    }

    /// Fails every pending request with `error()`.
    pub(crate) fn fail_all(&mut self, error: impl Fn() -> RequestError) {
        for (_, pending) in self.requests.drain() {
            let _ = pending.reply.send(Err(error()));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.requests.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PendingTable {
        PendingTable::new(2, Duration::from_secs(60))
    }

    // =====================================================================
    // allocate()
    // =====================================================================

    #[test]
    fn test_allocate_ids_are_sequential_from_one() {
        let mut t = table();
        assert_eq!(t.allocate(), RequestId(1));
        assert_eq!(t.allocate(), RequestId(2));
        assert_eq!(t.allocate(), RequestId(3));
    }

    // =====================================================================
    // resolve()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_resolve_delivers_reply_to_its_caller() {
        let mut t = table();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        let id1 = t.allocate();
        let id2 = t.allocate();
        t.register(id1, tx1);
        t.register(id2, tx2);

        // Answered out of order.
        assert!(t.resolve(id2, Ok(Value::from("two"))));
        assert!(t.resolve(id1, Ok(Value::from("one"))));

        assert_eq!(rx1.await.unwrap().unwrap(), Value::from("one"));
        assert_eq!(rx2.await.unwrap().unwrap(), Value::from("two"));
        assert_eq!(t.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_unknown_id_returns_false() {
        let mut t = table();
        assert!(!t.resolve(RequestId(99), Ok(Value::Undefined)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_twice_only_first_wins() {
        let mut t = table();
        let (tx, rx) = oneshot::channel();
        let id = t.allocate();
        t.register(id, tx);

        assert!(t.resolve(id, Ok(Value::from(1))));
        assert!(!t.resolve(id, Ok(Value::from(2))));
        assert_eq!(rx.await.unwrap().unwrap(), Value::from(1));
    }

    // =====================================================================
    // evict_stale()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_evict_stale_fails_only_old_requests() {
        let mut t = table();
        let (old_tx, old_rx) = oneshot::channel();
        let old = t.allocate();
        t.register(old, old_tx);

        tokio::time::advance(Duration::from_secs(45)).await;
        let (new_tx, _new_rx) = oneshot::channel();
        let new = t.allocate();
        t.register(new, new_tx);

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(t.evict_stale(Instant::now()), 1);
        assert_eq!(t.len(), 1);

        assert!(matches!(
            old_rx.await.unwrap(),
            Err(RequestError::Timeout(id)) if id == old
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_above_high_water_sweeps() {
        let mut t = table();
        for _ in 0..2 {
            let (tx, _rx) = oneshot::channel();
            let id = t.allocate();
            t.register(id, tx);
        }
        tokio::time::advance(Duration::from_secs(61)).await;

        let (tx, _rx) = oneshot::channel();
        let id = t.allocate();
        t.register(id, tx);

        // Both old requests were swept; only the new one remains.
        assert_eq!(t.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_below_high_water_keeps_stale() {
        let mut t = PendingTable::new(10, Duration::from_secs(1));
        let (tx, _rx) = oneshot::channel();
        let id = t.allocate();
        t.register(id, tx);
        tokio::time::advance(Duration::from_secs(5)).await;

        let (tx, _rx) = oneshot::channel();
        let id = t.allocate();
        t.register(id, tx);
        assert_eq!(t.len(), 2);
    }

    // =====================================================================
    // fail_all()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_fail_all_completes_every_caller() {
        let mut t = table();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        let id1 = t.allocate();
        t.register(id1, tx1);
        let id2 = t.allocate();
        t.register(id2, tx2);

        t.fail_all(|| RequestError::SessionClosed);

        assert_eq!(t.len(), 0);
        assert!(matches!(rx1.await.unwrap(), Err(RequestError::SessionClosed)));
        assert!(matches!(rx2.await.unwrap(), Err(RequestError::SessionClosed)));
    }
}
