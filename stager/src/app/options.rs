//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::channel::mqtt::{MqttAddress, PumpOptions};
use crate::staging::stager::StagingConfig;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Main application options
#[derive(Debug, Default)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Staging protocol
    pub staging: StagingConfig,

    /// Message bus connection; an empty host selects the in-process channel
    pub message_bus: MessageBusOptions,

    /// URIs handed to staging workers
    pub external: ExternalOptions,

    /// Enable HTTP server
    pub enable_server: bool,

    /// Server configuration
    pub server: ServerOptions,
}

impl AppOptions {
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions {
                layout,
                droplets_dir: settings.directories.droplets.clone(),
                task_logs_dir: settings.directories.task_logs.clone(),
            },
            staging: StagingConfig::from(&settings.staging),
            message_bus: MessageBusOptions {
                address: MqttAddress {
                    host: settings.message_bus.host.clone(),
                    port: settings.message_bus.port,
                    use_tls: settings.message_bus.tls,
                    ca_cert_path: settings.message_bus.ca_cert_path.clone(),
                    username: settings.message_bus.username.clone(),
                    password: settings
                        .message_bus
                        .password
                        .as_ref()
                        .map(copy_secret),
                },
                topic_prefix: settings.message_bus.topic_prefix.clone(),
                pump: PumpOptions::default(),
            },
            external: ExternalOptions {
                base_url: settings.external.base_url.clone(),
                user: settings.external.user.clone(),
                password: settings
                    .external
                    .password
                    .as_ref()
                    .map(copy_secret),
            },
            enable_server: settings.server.enabled,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
        }
    }
}

pub(crate) fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Overrides the layout's droplet directory
    pub droplets_dir: Option<PathBuf>,

    /// Overrides the layout's task log directory
    pub task_logs_dir: Option<PathBuf>,
}

/// Message bus options
#[derive(Debug)]
pub struct MessageBusOptions {
    pub address: MqttAddress,
    pub topic_prefix: String,
    pub pump: PumpOptions,
}

impl Default for MessageBusOptions {
    fn default() -> Self {
        Self {
            address: MqttAddress::default(),
            topic_prefix: "stager".to_string(),
            pump: PumpOptions::default(),
        }
    }
}

/// Externally reachable address of this stager
#[derive(Debug)]
pub struct ExternalOptions {
    pub base_url: String,
    pub user: Option<String>,
    pub password: Option<SecretString>,
}

impl Default for ExternalOptions {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9022".to_string(),
            user: None,
            password: None,
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9022,
        }
    }
}
