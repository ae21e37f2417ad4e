//! Terminal outcome of one synchronous staging attempt

use staging_wire::StagingReply;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingOutcome {
    /// Worker finished; carries the task log
    Success(String),

    /// Worker or transport reported a failure
    RemoteError(String),

    /// Nothing arrived before the deadline
    NoResponse,
}

impl StagingOutcome {
    /// Decode a worker reply.
    ///
    /// An explicit `error` wins over a task log in the same reply.
    pub fn from_reply(payload: &[u8]) -> Self {
        match serde_json::from_slice::<StagingReply>(payload) {
            Ok(StagingReply {
                error: Some(error), ..
            }) => StagingOutcome::RemoteError(error),
            Ok(reply) => StagingOutcome::Success(reply.task_log.unwrap_or_default()),
            Err(e) => StagingOutcome::RemoteError(format!("malformed staging reply: {}", e)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StagingOutcome::Success(_))
    }
}
