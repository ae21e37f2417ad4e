//! MQTT transport for the message channel
//!
//! Requests are published on `<prefix>/<queue>` wrapped in an [`Envelope`]
//! naming a per-request reply inbox. Replies arrive on that inbox and are
//! routed by the [`EventPump`], which owns the broker connection.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use secrecy::{ExposeSecret, SecretString};
use staging_wire::Envelope;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::channel::topics::Topics;
use crate::channel::{MessageChannel, ReplyCallbacks};
use crate::errors::StagerError;

/// MQTT broker address
#[derive(Debug)]
pub struct MqttAddress {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    /// Optional path to a PEM-encoded CA certificate for broker verification.
    /// When `None` and `use_tls` is `true`, the system certificate store is used.
    pub ca_cert_path: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

impl Default for MqttAddress {
    fn default() -> Self {
        Self {
            host: "".to_string(),
            port: 1883,
            use_tls: false,
            ca_cert_path: None,
            username: None,
            password: None,
        }
    }
}

/// Event pump options
#[derive(Debug, Clone)]
pub struct PumpOptions {
    /// Reconnect delay on failure
    pub reconnect_delay: Duration,

    /// Max consecutive connection failures before giving up
    pub max_reconnect_attempts: u32,
}

impl Default for PumpOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 10,
        }
    }
}

#[derive(Clone)]
enum Waiter {
    Collect(mpsc::UnboundedSender<Vec<u8>>),
    Callbacks(Arc<ReplyCallbacks>),
}

#[derive(Debug, PartialEq, Eq)]
enum Routed {
    Collected,
    /// Callback waiter fired and was removed
    Completed,
    Unknown,
}

/// Reply inboxes awaiting messages
#[derive(Default)]
struct Inbox {
    waiters: Mutex<HashMap<String, Waiter>>,
}

impl Inbox {
    fn register(&self, topic: &str, waiter: Waiter) {
        if let Ok(mut waiters) = self.waiters.lock() {
            waiters.insert(topic.to_string(), waiter);
        }
    }

    fn remove(&self, topic: &str) -> bool {
        self.waiters
            .lock()
            .map(|mut waiters| waiters.remove(topic).is_some())
            .unwrap_or(false)
    }

    fn topics(&self) -> Vec<String> {
        self.waiters
            .lock()
            .map(|waiters| waiters.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn route(&self, topic: &str, payload: Vec<u8>) -> Routed {
        let waiter = {
            let Ok(mut waiters) = self.waiters.lock() else {
                return Routed::Unknown;
            };
            if matches!(waiters.get(topic), Some(Waiter::Callbacks(_))) {
                waiters.remove(topic)
            } else {
                waiters.get(topic).cloned()
            }
        };
        let Some(waiter) = waiter else {
            return Routed::Unknown;
        };

        // callbacks run outside the lock
        match waiter {
            Waiter::Collect(tx) => {
                let _ = tx.send(payload);
                Routed::Collected
            }
            Waiter::Callbacks(callbacks) => {
                callbacks.reply(payload);
                Routed::Completed
            }
        }
    }
}

/// Message channel backed by an MQTT broker
pub struct MqttChannel {
    client: AsyncClient,
    topics: Topics,
    inbox: Arc<Inbox>,
}

/// Drives the broker connection and routes replies to waiting requests
pub struct EventPump {
    client: AsyncClient,
    eventloop: EventLoop,
    inbox: Arc<Inbox>,
}

impl MqttChannel {
    /// Create a channel and the event pump that must be run for it to work
    pub fn connect(
        address: &MqttAddress,
        topics: Topics,
    ) -> Result<(Self, EventPump), StagerError> {
        if address.host.is_empty() {
            return Err(StagerError::ChannelError(
                "MQTT host is not configured".to_string(),
            ));
        }

        let client_id = format!("app-stager-{}", uuid::Uuid::new_v4().simple());

        let mut options = MqttOptions::new(client_id, &address.host, address.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let Some(ref username) = address.username {
            let password = address
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_string())
                .unwrap_or_default();
            options.set_credentials(username, password);
        }

        if address.use_tls {
            use rumqttc::{TlsConfiguration, Transport};
            use rustls::ClientConfig;

            let mut root_cert_store = rustls::RootCertStore::empty();

            if let Some(ref ca_path) = address.ca_cert_path {
                let ca_pem = std::fs::read(ca_path).map_err(|e| {
                    StagerError::ChannelError(format!("Failed to read CA cert {ca_path}: {e}"))
                })?;
                let mut cursor = std::io::Cursor::new(ca_pem);
                for cert in rustls_pemfile::certs(&mut cursor).flatten() {
                    let _ = root_cert_store.add(cert);
                }
            } else {
                for cert in rustls_native_certs::load_native_certs().unwrap_or_default() {
                    let _ = root_cert_store.add(cert);
                }
            }

            let client_config = ClientConfig::builder()
                .with_root_certificates(root_cert_store)
                .with_no_client_auth();

            options.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(
                Arc::new(client_config),
            )));
        }

        let (client, eventloop) = AsyncClient::new(options, 64);
        let inbox = Arc::new(Inbox::default());

        let channel = Self {
            client: client.clone(),
            topics,
            inbox: inbox.clone(),
        };
        let pump = EventPump {
            client,
            eventloop,
            inbox,
        };
        Ok((channel, pump))
    }

    async fn publish_request(
        &self,
        queue: &str,
        inbox_topic: &str,
        payload: &[u8],
    ) -> Result<(), StagerError> {
        self.client
            .subscribe(inbox_topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| StagerError::ChannelError(e.to_string()))?;

        let envelope = Envelope::wrap(inbox_topic, payload);
        let body = serde_json::to_vec(&envelope)?;
        let topic = self.topics.queue(queue);

        self.client
            .publish(&topic, QoS::AtLeastOnce, false, body)
            .await
            .map_err(|e| StagerError::ChannelError(e.to_string()))?;

        debug!("Published request to: {} (reply to {})", topic, inbox_topic);
        Ok(())
    }

    /// Publish unless `deadline` passes first. `Ok(false)` means the request
    /// queue did not take it in time.
    async fn publish_before(
        &self,
        deadline: Instant,
        queue: &str,
        inbox_topic: &str,
        payload: &[u8],
    ) -> Result<bool, StagerError> {
        match tokio::time::timeout_at(deadline, self.publish_request(queue, inbox_topic, payload))
            .await
        {
            Ok(Ok(())) => Ok(true),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!("Request on {} not published before its deadline", queue);
                Ok(false)
            }
        }
    }

    fn release_inbox(&self, inbox_topic: &str) {
        self.inbox.remove(inbox_topic);
        // never wait on a full request queue
        if let Err(e) = self.client.try_unsubscribe(inbox_topic) {
            debug!("Failed to unsubscribe {}: {}", inbox_topic, e);
        }
    }
}

#[async_trait]
impl MessageChannel for MqttChannel {
    async fn request(
        &self,
        queue: &str,
        payload: Vec<u8>,
        expected: usize,
        timeout: Duration,
    ) -> Result<Vec<Vec<u8>>, StagerError> {
        let inbox_topic = self.topics.inbox();
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.inbox.register(&inbox_topic, Waiter::Collect(tx));

        let deadline = Instant::now() + timeout;
        match self.publish_before(deadline, queue, &inbox_topic, &payload).await {
            Ok(true) => {}
            Ok(false) => {
                self.release_inbox(&inbox_topic);
                return Ok(vec![]);
            }
            Err(e) => {
                self.release_inbox(&inbox_topic);
                return Err(e);
            }
        }

        let mut replies = Vec::with_capacity(expected);
        while replies.len() < expected {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(reply)) => replies.push(reply),
                Ok(None) | Err(_) => break,
            }
        }

        self.release_inbox(&inbox_topic);
        Ok(replies)
    }

    async fn send_with_callbacks(
        &self,
        queue: &str,
        payload: Vec<u8>,
        timeout: Duration,
        callbacks: ReplyCallbacks,
    ) -> Result<(), StagerError> {
        let inbox_topic = self.topics.inbox();
        self.inbox
            .register(&inbox_topic, Waiter::Callbacks(Arc::new(callbacks)));

        let deadline = Instant::now() + timeout;
        match self.publish_before(deadline, queue, &inbox_topic, &payload).await {
            Ok(true) => {}
            Ok(false) => {
                self.release_inbox(&inbox_topic);
                return Err(StagerError::ChannelError(format!(
                    "request on {} not published within {:?}",
                    queue, timeout
                )));
            }
            Err(e) => {
                self.release_inbox(&inbox_topic);
                return Err(e);
            }
        }

        // Unanswered inboxes expire silently
        let inbox = self.inbox.clone();
        let client = self.client.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if inbox.remove(&inbox_topic) {
                debug!("Reply inbox expired: {}", inbox_topic);
                let _ = client.try_unsubscribe(inbox_topic);
            }
        });

        Ok(())
    }
}

impl EventPump {
    /// Poll the broker connection until shutdown or too many failures
    pub async fn run(
        mut self,
        options: &PumpOptions,
        mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
    ) {
        info!("Message bus event pump starting...");

        let mut failures = 0;

        loop {
            tokio::select! {
                _ = &mut shutdown_signal => {
                    info!("Message bus event pump shutting down");
                    if let Err(e) = self.client.try_disconnect() {
                        debug!("Disconnect failed: {}", e);
                    }
                    return;
                }
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        debug!("Received message on topic: {}", publish.topic);
                        match self.inbox.route(&publish.topic, publish.payload.to_vec()) {
                            Routed::Completed => {
                                let _ = self.client.try_unsubscribe(publish.topic.clone());
                            }
                            Routed::Collected => {}
                            Routed::Unknown => {
                                debug!("Dropping unsolicited message on: {}", publish.topic);
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Message bus connected");
                        failures = 0;
                        self.resubscribe();
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        debug!("Subscription acknowledged");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        failures += 1;
                        warn!("Message bus poll error: {}, reconnecting...", e);
                        if failures >= options.max_reconnect_attempts {
                            error!("Max reconnect attempts reached, giving up");
                            return;
                        }
                        tokio::time::sleep(options.reconnect_delay).await;
                    }
                }
            }
        }
    }

    /// Reply inboxes do not survive a reconnect with a clean session
    fn resubscribe(&self) {
        for topic in self.inbox.topics() {
            if let Err(e) = self.client.try_subscribe(topic.clone(), QoS::AtLeastOnce) {
                warn!("Failed to resubscribe {}: {}", topic, e);
            }
        }
    }
}
