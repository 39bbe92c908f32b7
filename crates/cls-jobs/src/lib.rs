//! Job registry: lock-protected map of training jobs keyed by job id.

mod registry;

pub use cls_types::{
    Job, JobResultsView, JobStatus, JobStatusView, LogEntry, ProgressUpdate, ResultBundle,
    MAX_LOG_ENTRIES,
};
pub use registry::JobRegistry;
