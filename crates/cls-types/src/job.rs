//! Training job record, progress snapshots, and the two-tier result storage.

use crate::{
    LabelEncoder, ModelMetadata, ModelType, TextEncoder, TextModel, TrainingHistory,
    TrainingMetrics,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Most recent log entries kept per job; older entries are evicted first.
pub const MAX_LOG_ENTRIES: usize = 1000;

/// Lifecycle: pending -> running -> completed | failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional scalar training metrics attached to a progress snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_auc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_precision: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_recall: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub val_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub val_accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub val_auc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub val_precision: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub val_recall: Option<f64>,
}

/// Latest reported epoch/batch/metric state of a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingProgress {
    pub current_epoch: u32,
    pub total_epochs: u32,
    /// Percent complete, 0 to 100.
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_batch: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_batches: Option<u32>,
    #[serde(flatten)]
    pub metrics: ProgressMetrics,
}

/// Argument of `update_progress`: the new snapshot plus an optional log line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub current_epoch: u32,
    pub total_epochs: u32,
    pub progress: f64,
    pub current_batch: Option<u32>,
    pub total_batches: Option<u32>,
    pub metrics: ProgressMetrics,
    pub log_message: Option<String>,
}

impl ProgressUpdate {
    pub fn new(current_epoch: u32, total_epochs: u32, progress: f64) -> Self {
        Self {
            current_epoch,
            total_epochs,
            progress,
            ..Default::default()
        }
    }

    pub fn with_batch(mut self, current_batch: u32, total_batches: u32) -> Self {
        self.current_batch = Some(current_batch);
        self.total_batches = Some(total_batches);
        self
    }

    pub fn with_metrics(mut self, metrics: ProgressMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_log(mut self, message: impl Into<String>) -> Self {
        self.log_message = Some(message.into());
        self
    }

    /// Split into the stored snapshot (percent clamped to 0..=100) and the log line.
    pub fn into_parts(self) -> (TrainingProgress, Option<String>) {
        let progress = if self.progress.is_nan() {
            0.0
        } else {
            self.progress.clamp(0.0, 100.0)
        };
        (
            TrainingProgress {
                current_epoch: self.current_epoch,
                total_epochs: self.total_epochs,
                progress,
                current_batch: self.current_batch,
                total_batches: self.total_batches,
                metrics: self.metrics,
            },
            self.log_message,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub message: String,
}

/// Serializable summary of a completed run; never contains the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicResults {
    pub metadata: ModelMetadata,
    pub metrics: TrainingMetrics,
    pub history: TrainingHistory,
}

/// Complete artifact set of a completed run, held only server-side.
#[derive(Clone)]
pub struct ResultBundle {
    pub model: Arc<dyn TextModel>,
    pub tokenizer: Arc<dyn TextEncoder>,
    pub label_binarizer: Arc<dyn LabelEncoder>,
    pub metadata: ModelMetadata,
    pub metrics: TrainingMetrics,
    pub history: TrainingHistory,
}

impl ResultBundle {
    pub fn public(&self) -> PublicResults {
        PublicResults {
            metadata: self.metadata.clone(),
            metrics: self.metrics.clone(),
            history: self.history.clone(),
        }
    }
}

impl std::fmt::Debug for ResultBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultBundle")
            .field("model", &self.model.kind())
            .field("classes", &self.label_binarizer.classes())
            .field("metadata", &self.metadata)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

/// One tracked training run.
///
/// `full_results` is only reachable through [`Job::full_results`] and is skipped by serde, so
/// no JSON projection of a job can carry the artifact bundle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: String,
    pub model_type: ModelType,
    pub status: JobStatus,
    pub progress: Option<TrainingProgress>,
    pub results: Option<PublicResults>,
    pub error: Option<String>,
    pub logs: VecDeque<LogEntry>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip)]
    full_results: Option<ResultBundle>,
}

impl Job {
    pub fn new(job_id: impl Into<String>, model_type: ModelType, now: String) -> Self {
        Self {
            job_id: job_id.into(),
            model_type,
            status: JobStatus::Pending,
            progress: None,
            results: None,
            error: None,
            logs: VecDeque::new(),
            created_at: now.clone(),
            updated_at: now,
            full_results: None,
        }
    }

    pub fn full_results(&self) -> Option<&ResultBundle> {
        self.full_results.as_ref()
    }

    pub fn set_status(&mut self, status: JobStatus, now: String) {
        self.status = status;
        self.updated_at = now;
    }

    pub fn set_progress(&mut self, progress: TrainingProgress, now: String) {
        self.progress = Some(progress);
        self.updated_at = now;
    }

    /// Append a log line, evicting the oldest entries beyond [`MAX_LOG_ENTRIES`].
    pub fn push_log(&mut self, message: String, now: String) {
        self.logs.push_back(LogEntry {
            timestamp: now.clone(),
            message,
        });
        while self.logs.len() > MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.updated_at = now;
    }

    /// Terminal transition to `completed`. Clears any earlier error.
    pub fn complete(&mut self, bundle: ResultBundle, now: String) {
        self.results = Some(bundle.public());
        self.full_results = Some(bundle);
        self.error = None;
        self.set_status(JobStatus::Completed, now);
    }

    /// Terminal transition to `failed`. Clears any earlier results.
    pub fn fail(&mut self, error: String, now: String) {
        self.error = Some(error);
        self.results = None;
        self.full_results = None;
        self.set_status(JobStatus::Failed, now);
    }

    /// Copy of this record without the heavyweight artifact bundle.
    pub fn without_full_results(&self) -> Job {
        Job {
            full_results: None,
            ..self.clone()
        }
    }

    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.job_id.clone(),
            status: self.status,
            progress: self.progress.clone(),
            error: self.error.clone(),
            logs: self.logs.iter().cloned().collect(),
        }
    }

    /// Results projection; `None` unless the job completed.
    pub fn results_view(&self) -> Option<JobResultsView> {
        if self.status != JobStatus::Completed {
            return None;
        }
        let results = self.results.as_ref()?;
        Some(JobResultsView {
            job_id: self.job_id.clone(),
            status: self.status,
            metrics: results.metrics.clone(),
            history: results.history.clone(),
        })
    }
}

/// Shape returned to status-polling clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: Option<TrainingProgress>,
    pub error: Option<String>,
    pub logs: Vec<LogEntry>,
}

/// Shape returned by the results endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResultsView {
    pub job_id: String,
    pub status: JobStatus,
    pub metrics: TrainingMetrics,
    pub history: TrainingHistory,
}
