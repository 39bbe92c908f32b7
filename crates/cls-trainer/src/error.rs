use cls_types::{JobStatus, ParseModelTypeError, ToolkitError};
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error(transparent)]
    UnknownModelType(#[from] ParseModelTypeError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("job {job_id} is not completed (status: {status})")]
    JobNotCompleted { job_id: String, status: JobStatus },

    #[error("job {0} has no result bundle to save")]
    MissingResults(String),

    #[error(transparent)]
    Toolkit(#[from] ToolkitError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("failed to spawn training thread: {0}")]
    Spawn(String),

    #[error("training panicked: {0}")]
    Panicked(String),
}

impl TrainingError {
    /// Caller mistakes (4xx) as opposed to pipeline or storage failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TrainingError::UnknownModelType(_)
                | TrainingError::InvalidRequest(_)
                | TrainingError::JobNotFound(_)
                | TrainingError::JobNotCompleted { .. }
                | TrainingError::MissingResults(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_distinguished_from_io() {
        assert!(TrainingError::JobNotFound("j".into()).is_validation());
        assert!(TrainingError::UnknownModelType(ParseModelTypeError("GRU".into())).is_validation());
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!TrainingError::from(io).is_validation());
        assert!(!TrainingError::Toolkit(ToolkitError::Training("nan".into())).is_validation());
    }

    #[test]
    fn not_completed_message_names_status() {
        let err = TrainingError::JobNotCompleted {
            job_id: "j1".into(),
            status: JobStatus::Running,
        };
        assert_eq!(err.to_string(), "job j1 is not completed (status: running)");
    }
}
