//! Job queue for the Clipnote backend, built on Redis Streams.
//!
//! Two priority streams (high, normal) feed one consumer group. Failed
//! attempts are re-enqueued through a delayed sorted set that a pump task
//! drains back onto the streams once the backoff elapses; exhausted jobs land
//! on a dead-letter stream.

pub mod error;
pub mod job;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::TranscribeClipJob;
pub use queue::{ConsumedJob, JobQueue, QueueConfig};
