//! Topic naming on the message bus

/// Maps staging queues and reply inboxes to broker topics
#[derive(Debug, Clone)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }

    /// Topic a queue's requests are published on
    pub fn queue(&self, queue: &str) -> String {
        format!("{}/{}", self.prefix, queue)
    }

    /// A fresh, unique reply inbox
    pub fn inbox(&self) -> String {
        format!("{}/_inbox/{}", self.prefix, uuid::Uuid::new_v4().simple())
    }

    /// Check if topic is a reply inbox
    pub fn is_inbox(&self, topic: &str) -> bool {
        topic
            .strip_prefix(&self.prefix)
            .is_some_and(|rest| rest.starts_with("/_inbox/"))
    }

    /// Parse a request topic to extract the queue name
    pub fn parse_queue<'a>(&self, topic: &'a str) -> Option<&'a str> {
        let queue = topic.strip_prefix(&self.prefix)?.strip_prefix('/')?;
        if queue.is_empty() || queue.starts_with("_inbox/") {
            None
        } else {
            Some(queue)
        }
    }
}
