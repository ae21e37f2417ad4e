//! Message channel used to reach staging workers

pub mod loopback;
pub mod mqtt;
pub mod topics;

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::StagerError;

pub use self::loopback::{InboundRequest, LoopbackChannel, Replier};
pub use self::mqtt::{EventPump, MqttAddress, MqttChannel};
pub use self::topics::Topics;

/// Request/reply messaging
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Publish `payload` on `queue` and collect up to `expected` replies.
    ///
    /// Returns early once `expected` replies arrived, otherwise whatever
    /// arrived before `timeout` (possibly nothing).
    async fn request(
        &self,
        queue: &str,
        payload: Vec<u8>,
        expected: usize,
        timeout: Duration,
    ) -> Result<Vec<Vec<u8>>, StagerError>;

    /// Publish `payload` on `queue` and return immediately.
    ///
    /// Replies and transport failures are reported through `callbacks` for
    /// at most `timeout`. Callbacks may fire more than once.
    async fn send_with_callbacks(
        &self,
        queue: &str,
        payload: Vec<u8>,
        timeout: Duration,
        callbacks: ReplyCallbacks,
    ) -> Result<(), StagerError>;
}

/// Reply and error callbacks of a `send_with_callbacks` exchange
pub struct ReplyCallbacks {
    on_reply: Box<dyn Fn(Vec<u8>) + Send + Sync>,
    on_error: Box<dyn Fn(String) + Send + Sync>,
}

impl ReplyCallbacks {
    pub fn new(
        on_reply: impl Fn(Vec<u8>) + Send + Sync + 'static,
        on_error: impl Fn(String) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_reply: Box::new(on_reply),
            on_error: Box::new(on_error),
        }
    }

    pub fn reply(&self, payload: Vec<u8>) {
        (self.on_reply)(payload)
    }

    pub fn error(&self, message: impl Into<String>) {
        (self.on_error)(message.into())
    }
}
