//! Progress hook: turns fit events into registry progress snapshots and log lines.

use cls_jobs::{JobRegistry, ProgressUpdate};
use cls_types::{FitEvent, MetricLogs, ProgressMetrics};

/// Metric keys rendered in log lines, in display order.
const LOG_KEYS: [&str; 10] = [
    "loss",
    "binary_accuracy",
    "auc",
    "precision",
    "recall",
    "val_loss",
    "val_binary_accuracy",
    "val_auc",
    "val_precision",
    "val_recall",
];

/// Forwards fit events for one job into the registry.
///
/// Epoch ends are always reported. Batch ends are reported every `batch_interval`
/// batches plus the last batch of each epoch; `None` disables batch reporting.
pub struct ProgressReporter<'a> {
    registry: &'a JobRegistry,
    job_id: &'a str,
    total_epochs: usize,
    batch_interval: Option<usize>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(
        registry: &'a JobRegistry,
        job_id: &'a str,
        total_epochs: usize,
        batch_interval: Option<usize>,
    ) -> Self {
        Self {
            registry,
            job_id,
            total_epochs: total_epochs.max(1),
            batch_interval: batch_interval.filter(|n| *n > 0),
        }
    }

    pub fn on_event(&mut self, event: FitEvent<'_>) {
        match event {
            FitEvent::BatchEnd {
                epoch,
                batch,
                total_batches,
                logs,
            } => {
                let Some(interval) = self.batch_interval else {
                    return;
                };
                if !should_report_batch(batch, total_batches, interval) {
                    return;
                }
                let fraction = (batch + 1) as f64 / total_batches.max(1) as f64;
                let percent = (epoch as f64 + fraction) / self.total_epochs as f64 * 100.0;
                let message = format!(
                    "Epoch {}/{} - {}/{}{}",
                    epoch + 1,
                    self.total_epochs,
                    batch + 1,
                    total_batches,
                    format_logs(logs)
                );
                let update = ProgressUpdate::new(epoch as u32 + 1, self.total_epochs as u32, percent)
                    .with_batch(batch as u32 + 1, total_batches as u32)
                    .with_metrics(progress_metrics(logs))
                    .with_log(message);
                self.registry.update_progress(self.job_id, update);
            }
            FitEvent::EpochEnd { epoch, logs } => {
                let percent = (epoch + 1) as f64 / self.total_epochs as f64 * 100.0;
                let message = format!(
                    "Epoch {}/{}{}",
                    epoch + 1,
                    self.total_epochs,
                    format_logs(logs)
                );
                tracing::info!(job_id = %self.job_id, "{message}");
                let update = ProgressUpdate::new(epoch as u32 + 1, self.total_epochs as u32, percent)
                    .with_metrics(progress_metrics(logs))
                    .with_log(message);
                self.registry.update_progress(self.job_id, update);
            }
        }
    }
}

/// Every `interval`-th batch (1-based) and the last batch of the epoch.
pub(crate) fn should_report_batch(batch: usize, total_batches: usize, interval: usize) -> bool {
    (batch + 1) % interval == 0 || batch + 1 == total_batches
}

fn format_logs(logs: &MetricLogs) -> String {
    LOG_KEYS
        .iter()
        .filter_map(|key| logs.get(*key).map(|v| format!(" - {key}: {v:.4}")))
        .collect()
}

fn progress_metrics(logs: &MetricLogs) -> ProgressMetrics {
    let get = |key: &str| logs.get(key).copied();
    ProgressMetrics {
        current_loss: get("loss"),
        current_accuracy: get("binary_accuracy"),
        current_auc: get("auc"),
        current_precision: get("precision"),
        current_recall: get("recall"),
        val_loss: get("val_loss"),
        val_accuracy: get("val_binary_accuracy"),
        val_auc: get("val_auc"),
        val_precision: get("val_precision"),
        val_recall: get("val_recall"),
    }
}
