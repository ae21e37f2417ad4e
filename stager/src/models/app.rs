//! Application models

use serde::{Deserialize, Serialize};

/// Snapshot of an application record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    /// Unique application ID
    pub guid: String,

    /// Application name
    pub name: String,

    /// Memory limit in MB
    pub memory: u64,

    /// Disk quota in MB
    pub disk_quota: u64,

    /// File descriptor limit
    pub file_descriptors: u64,

    /// User environment; key order is preserved
    #[serde(default)]
    pub environment_json: Option<serde_json::Map<String, serde_json::Value>>,

    #[serde(default)]
    pub framework: Option<Framework>,

    #[serde(default)]
    pub buildpack: Option<String>,

    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub service_bindings: Vec<ServiceBinding>,

    /// Digest of the current droplet, set by a successful staging
    #[serde(default)]
    pub droplet_hash: Option<String>,
}

impl App {
    /// Create an app with default resource limits
    pub fn new(guid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            name: name.into(),
            memory: 256,
            disk_quota: 1024,
            file_descriptors: 16384,
            environment_json: None,
            framework: None,
            buildpack: None,
            metadata: serde_json::Map::new(),
            service_bindings: Vec::new(),
            droplet_hash: None,
        }
    }

    /// Environment rendered as `KEY=VALUE` entries in declaration order
    pub fn environment(&self) -> Vec<String> {
        self.environment_json
            .iter()
            .flatten()
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => format!("{}={}", key, s),
                serde_json::Value::Null => format!("{}=", key),
                other => format!("{}={}", key, other),
            })
            .collect()
    }
}

/// Framework the app is built with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Framework {
    pub name: String,

    #[serde(default)]
    pub internal_info: serde_json::Value,
}

/// Binding between an app and a service instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceBinding {
    #[serde(default)]
    pub credentials: serde_json::Value,

    #[serde(default)]
    pub binding_options: Option<serde_json::Value>,

    #[serde(default)]
    pub service_instance: Option<ServiceInstance>,
}

/// Provisioned instance of a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub name: String,

    #[serde(default)]
    pub service_plan: Option<ServicePlan>,
}

/// Plan of a service offering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePlan {
    pub name: String,

    #[serde(default)]
    pub service: Option<Service>,
}

/// Service offering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub label: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_keeps_declaration_order() {
        let mut app = App::new("app-1", "web");
        app.environment_json = serde_json::from_str(
            r#"{"ZETA":"last-declared-first","ALPHA":1,"EMPTY":null,"FLAG":true}"#,
        )
        .unwrap();

        assert_eq!(
            app.environment(),
            vec![
                "ZETA=last-declared-first".to_string(),
                "ALPHA=1".to_string(),
                "EMPTY=".to_string(),
                "FLAG=true".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_environment_is_empty() {
        let app = App::new("app-1", "web");
        assert!(app.environment().is_empty());
    }
}
