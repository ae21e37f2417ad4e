//! Settings file management

use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::artifacts::digest::DigestAlgorithm;
use crate::errors::StagerError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Stager settings
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON formatted logs
    #[serde(default)]
    pub log_json: bool,

    /// Also write rolling log files under the storage layout
    #[serde(default)]
    pub log_to_file: bool,

    /// Override of the storage layout base directory
    #[serde(default)]
    pub base_dir: Option<PathBuf>,

    /// Staging protocol configuration
    #[serde(default)]
    pub staging: StagingSettings,

    /// Message bus connection
    #[serde(default)]
    pub message_bus: MessageBusSettings,

    /// Directory overrides
    #[serde(default)]
    pub directories: DirectorySettings,

    /// Externally reachable address used in staging URIs
    #[serde(default)]
    pub external: ExternalSettings,

    /// Local HTTP server
    #[serde(default)]
    pub server: ServerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            base_dir: None,
            staging: StagingSettings::default(),
            message_bus: MessageBusSettings::default(),
            directories: DirectorySettings::default(),
            external: ExternalSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file
    pub async fn load(file: &File) -> Result<Self, StagerError> {
        file.read_json::<Settings>().await.map_err(|e| {
            StagerError::ConfigError(format!(
                "Unable to read settings file {}: {}",
                file.path().display(),
                e
            ))
        })
    }
}

fn default_true() -> bool {
    true
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

/// Staging protocol settings
#[derive(Debug, Clone, Deserialize)]
pub struct StagingSettings {
    /// Queue for synchronous staging requests
    #[serde(default = "default_queue")]
    pub queue: String,

    /// Queue for asynchronous staging requests
    #[serde(default = "default_async_queue")]
    pub async_queue: String,

    /// Maximum time to wait for a synchronous staging result, in seconds
    #[serde(default = "default_max_staging_runtime")]
    pub max_staging_runtime: u64,

    /// Maximum time to wait for the async staging reply, in seconds
    #[serde(default = "default_async_request_timeout")]
    pub async_request_timeout: u64,

    /// Droplet digest algorithm
    #[serde(default)]
    pub digest: DigestAlgorithm,
}

fn default_queue() -> String {
    "staging".to_string()
}

fn default_async_queue() -> String {
    "staging.async".to_string()
}

fn default_max_staging_runtime() -> u64 {
    120
}

fn default_async_request_timeout() -> u64 {
    30
}

impl Default for StagingSettings {
    fn default() -> Self {
        Self {
            queue: default_queue(),
            async_queue: default_async_queue(),
            max_staging_runtime: default_max_staging_runtime(),
            async_request_timeout: default_async_request_timeout(),
            digest: DigestAlgorithm::default(),
        }
    }
}

/// Message bus (MQTT broker) settings
#[derive(Debug, Deserialize)]
pub struct MessageBusSettings {
    /// Broker host; an empty host runs the in-process loopback channel
    #[serde(default)]
    pub host: String,

    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Use TLS
    #[serde(default)]
    pub tls: bool,

    /// Optional path to a PEM-encoded CA certificate for broker TLS verification.
    /// When absent, the system certificate store is used.
    #[serde(default)]
    pub ca_cert_path: Option<String>,

    /// Broker username
    #[serde(default)]
    pub username: Option<String>,

    /// Broker password
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,

    /// Prefix of every staging topic
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_topic_prefix() -> String {
    "stager".to_string()
}

impl Default for MessageBusSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_mqtt_port(),
            tls: false,
            ca_cert_path: None,
            username: None,
            password: None,
            topic_prefix: default_topic_prefix(),
        }
    }
}

/// Directory overrides; unset entries fall back to the storage layout
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectorySettings {
    #[serde(default)]
    pub droplets: Option<PathBuf>,

    #[serde(default)]
    pub task_logs: Option<PathBuf>,
}

/// Address staging workers use to reach this service
#[derive(Debug, Deserialize)]
pub struct ExternalSettings {
    #[serde(default = "default_external_url")]
    pub base_url: String,

    /// Basic auth user for the staging endpoints
    #[serde(default)]
    pub user: Option<String>,

    /// Basic auth password for the staging endpoints
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,
}

fn default_external_url() -> String {
    "http://127.0.0.1:9022".to_string()
}

impl Default for ExternalSettings {
    fn default() -> Self {
        Self {
            base_url: default_external_url(),
            user: None,
            password: None,
        }
    }
}

/// Local HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    9022
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}
