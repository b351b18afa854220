pub mod classifier;
pub mod executor;
pub mod sse;
pub mod task;

pub use classifier::{classify_failure, UpstreamFailure};
pub use executor::{Executor, UpstreamResponse};
pub use task::{extract_task_id, map_task_status, TaskPoller, TaskState};
