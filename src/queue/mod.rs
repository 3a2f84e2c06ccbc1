pub mod models;
pub mod store;

pub use models::{ItemOutcome, NewQueueItem, QueueCounts, QueueItem, QueueStatus};
pub use store::{QueueError, QueueStore};
