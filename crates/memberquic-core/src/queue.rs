//! Bounded inbound event queues.
//!
//! Receive loops push into the sending half; the membership engine drains an
//! [`EventQueue`]. Once the transport shuts down, a drained queue reports
//! `None` instead of blocking forever.

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Read-only view of one inbound event queue.
pub struct EventQueue<T> {
    rx: Mutex<mpsc::Receiver<T>>,
    shutdown: CancellationToken,
}

impl<T> EventQueue<T> {
    /// Create a queue of `capacity` events tied to `shutdown`.
    pub(crate) fn new(capacity: usize, shutdown: CancellationToken) -> (mpsc::Sender<T>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let queue = Self {
            rx: Mutex::new(rx),
            shutdown,
        };
        (tx, queue)
    }

    /// Wait for the next event.
    ///
    /// Events already queued are still handed out after shutdown; `None`
    /// means the transport is shut down and the queue is empty.
    pub async fn recv(&self) -> Option<T> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            event = rx.recv() => event,
            () = self.shutdown.cancelled() => rx.try_recv().ok(),
        }
    }

    /// Take the next event if one is ready.
    ///
    /// Returns `None` while another task is parked in [`recv`](Self::recv),
    /// even if events are queued; that task receives them instead.
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_in_order() {
        let token = CancellationToken::new();
        let (tx, queue) = EventQueue::new(4, token);
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        assert_eq!(queue.recv().await, Some(1));
        assert_eq!(queue.try_recv(), Some(2));
        assert_eq!(queue.try_recv(), None);
    }

    #[tokio::test]
    async fn drains_then_ends_after_shutdown() {
        let token = CancellationToken::new();
        let (tx, queue) = EventQueue::new(4, token.clone());
        tx.send("queued").await.unwrap();
        token.cancel();

        assert_eq!(queue.recv().await, Some("queued"));
        let next = tokio::time::timeout(Duration::from_secs(1), queue.recv())
            .await
            .expect("recv must not block after shutdown");
        assert_eq!(next, None);
        drop(tx);
    }

    #[tokio::test]
    async fn try_recv_yields_to_parked_receiver() {
        let token = CancellationToken::new();
        let (tx, queue) = EventQueue::new(4, token);
        let queue = std::sync::Arc::new(queue);

        let waiter = tokio::spawn({
            let queue = std::sync::Arc::clone(&queue);
            async move { queue.recv().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        tx.send(7u8).await.unwrap();
        assert_eq!(queue.try_recv(), None);
        assert_eq!(waiter.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn full_queue_applies_backpressure() {
        let token = CancellationToken::new();
        let (tx, queue) = EventQueue::new(1, token);
        tx.send(1u8).await.unwrap();
        assert!(tx.try_send(2).is_err());
        assert_eq!(queue.recv().await, Some(1));
        assert!(tx.try_send(2).is_ok());
    }
}
