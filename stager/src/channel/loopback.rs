//! In-process message channel
//!
//! Used when no broker is configured and by tests. Each queue has at most
//! one subscriber; a newer subscription replaces the older one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::channel::{MessageChannel, ReplyCallbacks};
use crate::errors::StagerError;

/// A request delivered to a loopback subscriber
pub struct InboundRequest {
    pub payload: Vec<u8>,
    pub replier: Replier,
}

impl InboundRequest {
    pub fn parse_json<T: for<'de> serde::Deserialize<'de>>(&self) -> Result<T, StagerError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

#[derive(Clone)]
enum ReplySink {
    Collect(mpsc::UnboundedSender<Vec<u8>>),
    Callbacks(Arc<ReplyCallbacks>),
}

/// Answers an [`InboundRequest`]; can be cloned and used more than once
#[derive(Clone)]
pub struct Replier {
    sink: ReplySink,
}

impl Replier {
    pub fn reply(&self, payload: Vec<u8>) {
        match &self.sink {
            ReplySink::Collect(tx) => {
                if tx.send(payload).is_err() {
                    debug!("Reply arrived after requester stopped listening");
                }
            }
            ReplySink::Callbacks(callbacks) => callbacks.reply(payload),
        }
    }

    pub fn reply_json<T: Serialize>(&self, value: &T) -> Result<(), StagerError> {
        self.reply(serde_json::to_vec(value)?);
        Ok(())
    }

    /// Signal a transport failure; plain requests have no error path
    pub fn fail(&self, message: impl Into<String>) {
        let message: String = message.into();
        match &self.sink {
            ReplySink::Collect(_) => debug!("Dropping failure for plain request: {}", message),
            ReplySink::Callbacks(callbacks) => callbacks.error(message),
        }
    }
}

type Handler = Arc<dyn Fn(InboundRequest) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
pub struct LoopbackChannel {
    queues: Mutex<HashMap<String, mpsc::UnboundedSender<InboundRequest>>>,
}

impl LoopbackChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every request published on `queue`
    pub fn subscribe(&self, queue: &str) -> mpsc::UnboundedReceiver<InboundRequest> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut queues) = self.queues.lock() {
            if queues.insert(queue.to_string(), tx).is_some() {
                debug!("Replacing subscriber on queue: {}", queue);
            }
        }
        rx
    }

    /// Spawn a task answering requests on `queue` with `handler`
    pub fn serve<F>(&self, queue: &str, handler: F) -> JoinHandle<()>
    where
        F: Fn(InboundRequest) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let mut rx = self.subscribe(queue);
        let handler: Handler = Arc::new(handler);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                tokio::spawn(handler(request));
            }
        })
    }

    fn deliver(&self, queue: &str, request: InboundRequest) -> bool {
        let Ok(queues) = self.queues.lock() else {
            warn!("Loopback queue table is poisoned");
            return false;
        };
        match queues.get(queue) {
            Some(tx) => tx.send(request).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl MessageChannel for LoopbackChannel {
    async fn request(
        &self,
        queue: &str,
        payload: Vec<u8>,
        expected: usize,
        timeout: Duration,
    ) -> Result<Vec<Vec<u8>>, StagerError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let request = InboundRequest {
            payload,
            replier: Replier {
                sink: ReplySink::Collect(tx),
            },
        };
        if !self.deliver(queue, request) {
            debug!("No subscriber on queue: {}", queue);
            return Ok(Vec::new());
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let mut replies = Vec::with_capacity(expected);
        while replies.len() < expected {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(reply)) => replies.push(reply),
                Ok(None) | Err(_) => break,
            }
        }
        Ok(replies)
    }

    async fn send_with_callbacks(
        &self,
        queue: &str,
        payload: Vec<u8>,
        _timeout: Duration,
        callbacks: ReplyCallbacks,
    ) -> Result<(), StagerError> {
        let request = InboundRequest {
            payload,
            replier: Replier {
                sink: ReplySink::Callbacks(Arc::new(callbacks)),
            },
        };
        if !self.deliver(queue, request) {
            debug!("No subscriber on queue: {}", queue);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_request_without_subscriber() {
        let channel = LoopbackChannel::new();
        let replies = channel
            .request("staging", b"{}".to_vec(), 1, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn test_request_collects_expected_replies() {
        let channel = LoopbackChannel::new();
        let _server = channel.serve("echo", |request| {
            async move {
                request.replier.reply(request.payload.clone());
                request.replier.reply(b"second".to_vec());
            }
            .boxed()
        });

        let replies = channel
            .request("echo", b"first".to_vec(), 1, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(replies, vec![b"first".to_vec()]);
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let channel = LoopbackChannel::new();
        let _rx = channel.subscribe("silent");

        let replies = channel
            .request("silent", b"{}".to_vec(), 1, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn test_callbacks_receive_reply_and_error() {
        let channel = LoopbackChannel::new();
        let mut rx = channel.subscribe("staging");

        let replies = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        let (r, e) = (replies.clone(), errors.clone());
        channel
            .send_with_callbacks(
                "staging",
                b"{}".to_vec(),
                Duration::from_secs(1),
                ReplyCallbacks::new(
                    move |_| {
                        r.fetch_add(1, Ordering::SeqCst);
                    },
                    move |_| {
                        e.fetch_add(1, Ordering::SeqCst);
                    },
                ),
            )
            .await
            .unwrap();

        let request = rx.recv().await.unwrap();
        request.replier.reply(b"ok".to_vec());
        request.replier.fail("boom");

        assert_eq!(replies.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }
}
