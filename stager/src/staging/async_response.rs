//! Reply of an asynchronous staging request

use serde::Serialize;
use staging_wire::AsyncStagingReply;

use crate::errors::StagerError;

pub const NO_RESPONSE_ERROR: &str = "Did not receive staging response";

/// Correlation handle of a staging run that continues in the background
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AsyncResponse {
    pub task_id: Option<String>,
    pub streaming_log_url: Option<String>,
    pub error: Option<String>,
}

impl AsyncResponse {
    /// Decode the first reply, or synthesize the no-reply response
    pub fn from_reply(reply: Option<&[u8]>) -> Result<Self, StagerError> {
        let Some(payload) = reply else {
            return Ok(Self::no_response());
        };
        let reply: AsyncStagingReply = serde_json::from_slice(payload)
            .map_err(|e| StagerError::AsyncError(format!("malformed async staging reply: {}", e)))?;
        Ok(Self {
            task_id: reply.task_id,
            streaming_log_url: reply.streaming_log_url,
            error: reply.error,
        })
    }

    pub fn no_response() -> Self {
        Self {
            task_id: None,
            streaming_log_url: None,
            error: Some(NO_RESPONSE_ERROR.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_success() {
        let response = AsyncResponse::from_reply(Some(
            br#"{"task_id":"t1","streaming_log_url":"http://x/log","error":null}"#,
        ))
        .unwrap();
        assert_eq!(response.task_id.as_deref(), Some("t1"));
        assert_eq!(response.streaming_log_url.as_deref(), Some("http://x/log"));
        assert!(!response.is_error());
    }

    #[test]
    fn test_no_reply() {
        let response = AsyncResponse::from_reply(None).unwrap();
        assert_eq!(response, AsyncResponse::no_response());
        assert_eq!(response.error.as_deref(), Some("Did not receive staging response"));
        assert!(response.is_error());
    }

    #[test]
    fn test_malformed_reply() {
        assert!(matches!(
            AsyncResponse::from_reply(Some(b"[1,2]")),
            Err(StagerError::AsyncError(_))
        ));
    }
}
