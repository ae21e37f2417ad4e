//! Staging orchestration: request building, reply bridging and droplet registration

pub mod async_response;
pub mod bridge;
pub mod outcome;
pub mod request;
pub mod stager;
pub mod task_log;

pub use self::async_response::AsyncResponse;
pub use self::bridge::{DeliverySlot, StagingBridge};
pub use self::outcome::StagingOutcome;
pub use self::request::build_staging_request;
pub use self::stager::{AppStager, StagingConfig};
pub use self::task_log::{FileTaskLogStore, InMemoryTaskLogStore, StagingTaskLog, TaskLogStore};
