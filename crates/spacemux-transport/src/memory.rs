//! In-process transport: a pair of unbounded channels per connection.
//!
//! The [`MemoryConnector`] hands the far end of every successful connect to
//! a [`MemoryListener`], so a test can play the space process. Connect
//! attempts can be refused on demand to drive reconnect logic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};

use crate::{Connection, ConnectionId, Connector, TransportError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

struct Shared {
    refusals: AtomicUsize,
    attempts: AtomicUsize,
    peers: mpsc::UnboundedSender<MemoryConnection>,
}

/// A [`Connector`] whose connections terminate at a [`MemoryListener`].
///
/// Cheap to clone; clones share the refusal budget and attempt counter.
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

/// Receives the server end of each connection a [`MemoryConnector`] opens.
pub struct MemoryListener {
    peers: mpsc::UnboundedReceiver<MemoryConnection>,
}

impl MemoryConnector {
    /// Creates a connector and its listener.
    pub fn new() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            shared: Arc::new(Shared {
                refusals: AtomicUsize::new(0),
                attempts: AtomicUsize::new(0),
                peers: tx,
            }),
        };
        (connector, MemoryListener { peers: rx })
    }

    /// Makes the next `n` connect attempts fail with
    /// [`TransportError::ConnectFailed`].
    pub fn refuse_next(&self, n: usize) {
        self.shared.refusals.fetch_add(n, Ordering::SeqCst);
    }

    /// Total connect attempts so far, refused ones included.
    pub fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

impl MemoryListener {
    /// Waits for the next successful connect and returns its far end.
    ///
    /// Returns `None` once every connector clone is dropped.
    pub async fn accept(&mut self) -> Option<MemoryConnection> {
        self.peers.recv().await
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<Self::Connection, TransportError> {
        let attempt = self.shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let refused = self
            .shared
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            tracing::debug!(attempt, "memory connect refused");
            return Err(TransportError::ConnectFailed("refused".into()));
        }

        let (near, far) = MemoryConnection::pair();
        self.shared
            .peers
            .send(far)
            .map_err(|_| TransportError::ConnectFailed("no listener".into()))?;
        tracing::debug!(attempt, id = %near.id, "memory connection opened");
        Ok(near)
    }
}

/// One end of an in-process connection.
pub struct MemoryConnection {
    id: ConnectionId,
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl MemoryConnection {
    /// Creates two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let a = Self::new(b_tx, a_rx);
        let b = Self::new(a_tx, b_rx);
        (a, b)
    }

    fn new(tx: mpsc::UnboundedSender<String>, rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            id: ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
        }
    }
}

impl Connection for MemoryConnection {
    async fn send(&self, frame: &str) -> Result<(), TransportError> {
        let tx = self.tx.lock().await;
        let tx = tx
            .as_ref()
            .ok_or_else(|| TransportError::ConnectionClosed("closed locally".into()))?;
        tx.send(frame.to_owned())
            .map_err(|_| TransportError::ConnectionClosed("peer dropped".into()))
    }

    async fn recv(&self) -> Result<Option<String>, TransportError> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.tx.lock().await.take();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_carries_frames_both_ways() {
        let (a, b) = MemoryConnection::pair();
        a.send("(hello)").await.unwrap();
        assert_eq!(b.recv().await.unwrap().as_deref(), Some("(hello)"));
        b.send("(keep-alive)").await.unwrap();
        assert_eq!(a.recv().await.unwrap().as_deref(), Some("(keep-alive)"));
    }

    #[tokio::test]
    async fn test_close_ends_peer_stream() {
        let (a, b) = MemoryConnection::pair();
        a.close().await.unwrap();
        assert_eq!(b.recv().await.unwrap(), None);
        assert!(matches!(
            a.send("x").await,
            Err(TransportError::ConnectionClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_connector_refuses_then_connects() {
        let (connector, mut listener) = MemoryConnector::new();
        connector.refuse_next(2);

        assert!(connector.connect().await.is_err());
        assert!(connector.connect().await.is_err());
        let near = connector.connect().await.expect("third attempt connects");
        assert_eq!(connector.attempts(), 3);

        let far = listener.accept().await.expect("listener sees the far end");
        near.send("ping").await.unwrap();
        assert_eq!(far.recv().await.unwrap().as_deref(), Some("ping"));
    }

    #[tokio::test]
    async fn test_connect_without_listener_fails() {
        let (connector, listener) = MemoryConnector::new();
        drop(listener);
        assert!(matches!(
            connector.connect().await,
            Err(TransportError::ConnectFailed(_))
        ));
    }
}
