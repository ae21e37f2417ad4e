//! Turns a callback-driven staging exchange into a single awaited outcome
//!
//! Three writers race for one [`DeliverySlot`]: the reply callback, the error
//! callback and a timer. The first write wins; later ones are discarded, so
//! a reply arriving after the deadline has no effect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use staging_wire::StagingRequest;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::channel::{MessageChannel, ReplyCallbacks};
use crate::staging::outcome::StagingOutcome;

/// Single-assignment slot with at-most-once delivery
pub struct DeliverySlot<T> {
    delivered: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> DeliverySlot<T> {
    /// Create a slot and the receiving end of its single delivery
    pub fn channel() -> (Arc<Self>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Self {
            delivered: AtomicBool::new(false),
            sender: Mutex::new(Some(tx)),
        });
        (slot, rx)
    }

    /// Deliver `value` unless something was delivered before.
    ///
    /// Returns true if this call won the slot.
    pub fn deliver(&self, value: T) -> bool {
        if self
            .delivered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let sender = match self.sender.lock() {
            Ok(mut sender) => sender.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            // receiver may be gone if the caller gave up
            Some(tx) => {
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered.load(Ordering::Acquire)
    }
}

/// Aborts the timer once the exchange is settled or abandoned
struct TimerGuard(JoinHandle<()>);

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Synchronous staging exchange over a message channel
#[derive(Clone)]
pub struct StagingBridge {
    channel: Arc<dyn MessageChannel>,
}

impl StagingBridge {
    pub fn new(channel: Arc<dyn MessageChannel>) -> Self {
        Self { channel }
    }

    /// Send `request` on `queue` and wait for the first of reply, error or timeout
    pub async fn call(
        &self,
        queue: &str,
        request: &StagingRequest,
        timeout: Duration,
    ) -> StagingOutcome {
        let payload = match serde_json::to_vec(request) {
            Ok(payload) => payload,
            Err(e) => {
                return StagingOutcome::RemoteError(format!("failed to encode staging request: {}", e))
            }
        };

        let (slot, mut rx) = DeliverySlot::channel();

        let reply_slot = slot.clone();
        let error_slot = slot.clone();
        let app_id = request.app_id.clone();
        let callbacks = ReplyCallbacks::new(
            move |payload| {
                if !reply_slot.deliver(StagingOutcome::from_reply(&payload)) {
                    debug!("Discarding late staging reply for {}", app_id);
                }
            },
            move |message| {
                if !error_slot.deliver(StagingOutcome::RemoteError(message)) {
                    debug!("Discarding late staging error: already settled");
                }
            },
        );

        let timer_slot = slot.clone();
        let _timer = TimerGuard(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            timer_slot.deliver(StagingOutcome::NoResponse);
        }));

        let send = self
            .channel
            .send_with_callbacks(queue, payload, timeout, callbacks);
        tokio::pin!(send);

        // a stalled publish must not hold the caller past the timer
        let settled = tokio::select! {
            sent = &mut send => {
                if let Err(e) = sent {
                    slot.deliver(StagingOutcome::RemoteError(e.to_string()));
                }
                None
            }
            settled = &mut rx => Some(settled),
        };
        let settled = match settled {
            Some(settled) => settled,
            None => rx.await,
        };

        // the slot keeps its sender until a delivery, so this only fails if
        // the timer task was torn down with the runtime
        settled.unwrap_or(StagingOutcome::NoResponse)
    }
}
