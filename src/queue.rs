//! FIFO handoff between reader tasks and the processor task (spec.md §4.7).
//!
//! Backed by `tokio::sync::mpsc::unbounded_channel`, which already gives
//! unbounded, strict-FIFO, multi-producer/single-consumer semantics without
//! a hand-rolled condvar queue (SPEC_FULL.md §4.7).

use tokio::sync::{mpsc, oneshot};

use crate::protocol::{WireRequest, WireResponse};

/// A parsed request paired with the reply channel the processor task uses
/// to hand the response back to the reader task that owns the socket.
pub struct QueuedRequest {
    pub request: WireRequest,
    pub reply: oneshot::Sender<WireResponse>,
}

#[derive(Clone)]
pub struct RequestQueueSender {
    inner: mpsc::UnboundedSender<QueuedRequest>,
}

impl RequestQueueSender {
    /// Enqueues `request`, returning a receiver that resolves once the
    /// processor task has produced a response. Errors if the processor task
    /// has shut down.
    pub fn enqueue(
        &self,
        request: WireRequest,
    ) -> Result<oneshot::Receiver<WireResponse>, WireRequest> {
        let (reply_tx, reply_rx) = oneshot::channel();
        match self.inner.send(QueuedRequest {
            request,
            reply: reply_tx,
        }) {
            Ok(()) => Ok(reply_rx),
            Err(send_err) => Err(send_err.0.request),
        }
    }
}

pub struct RequestQueueReceiver {
    inner: mpsc::UnboundedReceiver<QueuedRequest>,
}

impl RequestQueueReceiver {
    pub async fn recv(&mut self) -> Option<QueuedRequest> {
        self.inner.recv().await
    }
}

pub fn channel() -> (RequestQueueSender, RequestQueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RequestQueueSender { inner: tx }, RequestQueueReceiver { inner: rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::WireRequest;
    use serde_json::Value;

    #[tokio::test]
    async fn enqueue_then_recv_preserves_order() {
        let (tx, mut rx) = channel();
        for i in 0..3 {
            let req = WireRequest {
                operation: "get_stats".to_string(),
                session_id: String::new(),
                request_id: i.to_string(),
                parameters: Value::Null,
            };
            tx.enqueue(req).unwrap();
        }
        for i in 0..3 {
            let queued = rx.recv().await.unwrap();
            assert_eq!(queued.request.request_id, i.to_string());
        }
    }
}
