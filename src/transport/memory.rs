//! In-process transport pair.
//!
//! Whatever one end sends, the other receives byte-for-byte, in order.
//! Backs the local monitor mode (capture straight into playback without a
//! relay) and the session tests.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Transport, TransportError};

/// One end of an in-memory, message-framed byte pipe.
pub struct MemoryTransport {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MemoryTransport {
    /// Create two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(a_tx),
                rx: a_rx,
            },
            Self {
                tx: Some(b_tx),
                rx: b_rx,
            },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| TransportError::ConnectionError("transport closed".into()))?;
        tx.send(payload)
            .map_err(|_| TransportError::ConnectionError("peer went away".into()))
    }

    async fn recv(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_order_both_ways() {
        let (mut a, mut b) = MemoryTransport::pair();
        a.send(vec![1, 2]).await.unwrap();
        a.send(vec![3]).await.unwrap();
        b.send(vec![9]).await.unwrap();

        assert_eq!(b.recv().await.unwrap().unwrap(), vec![1, 2]);
        assert_eq!(b.recv().await.unwrap().unwrap(), vec![3]);
        assert_eq!(a.recv().await.unwrap().unwrap(), vec![9]);
    }

    #[tokio::test]
    async fn close_ends_peer_stream_after_backlog() {
        let (mut a, mut b) = MemoryTransport::pair();
        a.send(vec![7]).await.unwrap();
        a.close().await.unwrap();
        a.close().await.unwrap();

        assert_eq!(b.recv().await.unwrap().unwrap(), vec![7]);
        assert!(b.recv().await.is_none());
        assert!(a.send(vec![1]).await.is_err());
    }

    #[tokio::test]
    async fn send_to_dropped_peer_fails() {
        let (mut a, b) = MemoryTransport::pair();
        drop(b);
        assert!(matches!(
            a.send(vec![1]).await,
            Err(TransportError::ConnectionError(_))
        ));
    }
}
