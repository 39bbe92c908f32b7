//! Training orchestrator: runs each training job on its own thread and reports
//! status, progress and results through the shared [`JobRegistry`](cls_jobs::JobRegistry).

mod artifacts;
mod error;
mod orchestrator;
mod progress;

pub use artifacts::{validate_model_name, ArtifactLayout, MAX_MODEL_NAME_CHARS};
pub use error::{TrainingError, TrainingResult};
pub use orchestrator::{OrchestratorConfig, TrainingOrchestrator};
pub use progress::ProgressReporter;
