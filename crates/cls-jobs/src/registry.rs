//! In-memory job registry shared by the HTTP layer and training threads.

use chrono::Utc;
use cls_types::{
    Job, JobResultsView, JobStatus, JobStatusView, ModelType, ProgressUpdate, ResultBundle,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Process-wide store of training jobs, guarded by a single mutex.
///
/// Every operation holds the lock only for the map access and the construction of the
/// returned copy. Unknown job ids are never an error: mutations become no-ops and reads
/// return `None`.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn now_iso() -> String {
        Utc::now().to_rfc3339()
    }

    // A panicking holder cannot leave a half-written record: every mutation below is a
    // sequence of plain field assignments on an existing entry.
    fn jobs(&self) -> MutexGuard<'_, HashMap<String, Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_job<F>(&self, job_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Job),
    {
        let mut guard = self.jobs();
        match guard.get_mut(job_id) {
            Some(job) => {
                f(job);
                true
            }
            None => false,
        }
    }

    /// Create (or silently replace) a job in `pending` state.
    pub fn create_job(&self, job_id: &str, model_type: ModelType) {
        let job = Job::new(job_id, model_type, Self::now_iso());
        let replaced = self.jobs().insert(job_id.to_string(), job).is_some();
        if replaced {
            tracing::warn!(job_id = %job_id, "job id reused; previous job replaced");
        }
        tracing::info!(job_id = %job_id, model_type = %model_type, "job created");
    }

    pub fn update_status(&self, job_id: &str, status: JobStatus) {
        let now = Self::now_iso();
        if self.with_job(job_id, |job| job.set_status(status, now)) {
            tracing::info!(job_id = %job_id, status = %status, "job status updated");
        }
    }

    /// Replace the progress snapshot and append the optional log line.
    pub fn update_progress(&self, job_id: &str, update: ProgressUpdate) {
        let now = Self::now_iso();
        let (progress, log_message) = update.into_parts();
        let (percent, epoch, total) = (progress.progress, progress.current_epoch, progress.total_epochs);
        let batch = progress.current_batch.zip(progress.total_batches);
        let found = self.with_job(job_id, |job| {
            job.set_progress(progress, now.clone());
            if let Some(message) = log_message {
                job.push_log(message, now);
            }
        });
        if !found {
            return;
        }
        match batch {
            Some((b, tb)) => tracing::debug!(
                job_id = %job_id,
                "progress {:.1}% (epoch {}/{}, batch {}/{})",
                percent, epoch, total, b, tb
            ),
            None => tracing::debug!(
                job_id = %job_id,
                "progress {:.1}% (epoch {}/{})",
                percent, epoch, total
            ),
        }
    }

    /// Mark the job completed, storing the public summary and retaining the full bundle.
    pub fn complete_job(&self, job_id: &str, bundle: ResultBundle) {
        let now = Self::now_iso();
        if self.with_job(job_id, |job| job.complete(bundle, now)) {
            tracing::info!(job_id = %job_id, "job completed");
        }
    }

    pub fn fail_job(&self, job_id: &str, error: &str) {
        let now = Self::now_iso();
        if self.with_job(job_id, |job| job.fail(error.to_string(), now)) {
            tracing::warn!(job_id = %job_id, error = %error, "job failed");
        }
    }

    /// Copy of the full record, including the artifact bundle when completed.
    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.jobs().get(job_id).cloned()
    }

    pub fn get_job_status(&self, job_id: &str) -> Option<JobStatusView> {
        self.jobs().get(job_id).map(Job::status_view)
    }

    /// Results projection; `None` unless the job exists and is completed.
    pub fn get_job_results(&self, job_id: &str) -> Option<JobResultsView> {
        self.jobs().get(job_id).and_then(Job::results_view)
    }

    /// All jobs, each without its artifact bundle.
    pub fn list_jobs(&self) -> HashMap<String, Job> {
        self.jobs()
            .iter()
            .map(|(id, job)| (id.clone(), job.without_full_results()))
            .collect()
    }

    pub fn delete_job(&self, job_id: &str) -> bool {
        let removed = self.jobs().remove(job_id).is_some();
        if removed {
            tracing::info!(job_id = %job_id, "job deleted");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs().is_empty()
    }
}
