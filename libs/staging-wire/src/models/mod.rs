//! Wire models

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

/// Staging request sent to a staging worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRequest {
    pub app_id: String,
    pub properties: StagingProperties,
    pub download_uri: String,
    pub upload_uri: String,
}

/// Properties of the application being staged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingProperties {
    pub services: Vec<ServiceBindingDescriptor>,
    pub framework: String,
    pub framework_info: serde_json::Value,
    pub buildpack: Option<String>,
    pub resources: Resources,
    /// `KEY=VALUE` entries in the order of the app's environment
    pub environment: Vec<String>,
    pub meta: serde_json::Value,
}

/// Resource limits for the staged application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    pub memory: u64,
    pub disk: u64,
    pub fds: u64,
}

/// A service bound to the application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceBindingDescriptor {
    /// `<service label>-<service version>`
    pub label: String,
    pub tags: serde_json::Map<String, serde_json::Value>,
    pub name: String,
    pub credentials: serde_json::Value,
    pub options: serde_json::Value,
    pub plan: String,
    pub plan_options: serde_json::Map<String, serde_json::Value>,
}

/// Reply of the synchronous staging queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagingReply {
    #[serde(default)]
    pub task_log: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Reply of the asynchronous staging queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AsyncStagingReply {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub streaming_log_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Transport envelope for brokers without native reply subjects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Topic the responder publishes its replies to
    pub reply_to: String,
    /// Base64 encoded request body
    pub payload: String,
}

impl Envelope {
    /// Wrap a raw payload
    pub fn wrap(reply_to: impl Into<String>, payload: &[u8]) -> Self {
        Self {
            reply_to: reply_to.into(),
            payload: BASE64.encode(payload),
        }
    }

    /// Decode the wrapped payload
    pub fn body(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_async_reply_treats_null_as_absent() {
        let reply: AsyncStagingReply = serde_json::from_str(
            r#"{"task_id":"t1","streaming_log_url":"http://x/log","error":null}"#,
        )
        .unwrap();
        assert_eq!(reply.task_id.as_deref(), Some("t1"));
        assert_eq!(reply.streaming_log_url.as_deref(), Some("http://x/log"));
        assert!(reply.error.is_none());

        let empty: AsyncStagingReply = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, AsyncStagingReply::default());
    }

    #[test]
    fn test_staging_reply_with_error() {
        let reply: StagingReply = serde_json::from_str(r#"{"error":"build failed"}"#).unwrap();
        assert_eq!(reply.error.as_deref(), Some("build failed"));
        assert!(reply.task_log.is_none());
    }

    #[test]
    fn test_envelope_body() {
        let envelope = Envelope::wrap("stager/_inbox/1", b"{\"app_id\":\"a\"}");
        assert_eq!(envelope.reply_to, "stager/_inbox/1");
        assert_eq!(envelope.body().unwrap(), b"{\"app_id\":\"a\"}".to_vec());
    }

    #[test]
    fn test_request_shape() {
        let request = StagingRequest {
            app_id: "app-1".to_string(),
            properties: StagingProperties {
                services: vec![],
                framework: "sinatra".to_string(),
                framework_info: serde_json::json!({}),
                buildpack: None,
                resources: Resources {
                    memory: 512,
                    disk: 1024,
                    fds: 16384,
                },
                environment: vec!["A=1".to_string()],
                meta: serde_json::json!({}),
            },
            download_uri: "http://cc/staging/apps/app-1".to_string(),
            upload_uri: "http://cc/staging/droplets/app-1".to_string(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["app_id"], "app-1");
        assert_eq!(value["properties"]["resources"]["fds"], 16384);
        assert_eq!(value["properties"]["environment"][0], "A=1");
        assert!(value["properties"]["buildpack"].is_null());
    }
}
