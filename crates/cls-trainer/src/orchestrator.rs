use crate::artifacts::{validate_model_name, ArtifactLayout};
use crate::error::{TrainingError, TrainingResult};
use crate::progress::ProgressReporter;
use cls_jobs::{JobRegistry, JobStatus, ResultBundle};
use cls_ml::metrics;
use cls_types::{
    FitOptions, Hyperparameters, LabelEncoder, ModelMetadata, ModelSpec, ModelType, TextEncoder,
    Toolkit, TrainingSample,
};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Root directory of exported artifacts.
    pub output_dir: PathBuf,
    /// Report every Nth batch (plus each epoch's last); `None` reports epochs only.
    pub progress_batch_interval: Option<usize>,
    /// Held-out fraction used for validation and final metrics.
    pub test_size: f64,
    /// Probability at or above which a label counts as predicted.
    pub threshold: f32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("ml_models"),
            progress_batch_interval: Some(10),
            test_size: 0.3,
            threshold: 0.5,
        }
    }
}

/// Runs training jobs off the calling thread and narrates them into the registry.
///
/// Cheap to clone; clones share the registry and toolkit.
#[derive(Clone)]
pub struct TrainingOrchestrator {
    registry: Arc<JobRegistry>,
    toolkit: Arc<dyn Toolkit>,
    config: OrchestratorConfig,
    layout: ArtifactLayout,
}

impl TrainingOrchestrator {
    pub fn new(
        registry: Arc<JobRegistry>,
        toolkit: Arc<dyn Toolkit>,
        config: OrchestratorConfig,
    ) -> Self {
        let layout = ArtifactLayout::new(config.output_dir.clone());
        Self {
            registry,
            toolkit,
            config,
            layout,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Validate the model type, then train on a dedicated thread named `train-<job_id>`.
    ///
    /// The job must already exist in the registry. Errors raised here (unknown model
    /// type, thread spawn failure) are recorded on the job before being returned.
    /// The handle may be dropped to detach the run.
    pub fn spawn_training(
        &self,
        job_id: &str,
        model_type: &str,
        samples: Vec<TrainingSample>,
        hyperparameters: Hyperparameters,
    ) -> TrainingResult<JoinHandle<TrainingResult<()>>> {
        let model_type = match model_type.parse::<ModelType>() {
            Ok(t) => t,
            Err(e) => return Err(self.record_failure(job_id, e.into())),
        };

        let this = self.clone();
        let id = job_id.to_string();
        std::thread::Builder::new()
            .name(thread_name(job_id))
            .spawn(move || this.train_model(&id, model_type, &samples, &hyperparameters))
            .map_err(|e| self.record_failure(job_id, TrainingError::Spawn(e.to_string())))
    }

    /// Run one training job to completion on the calling thread.
    pub fn train_model(
        &self,
        job_id: &str,
        model_type: ModelType,
        samples: &[TrainingSample],
        hyperparameters: &Hyperparameters,
    ) -> TrainingResult<()> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run(job_id, model_type, samples, hyperparameters)
        }))
        .unwrap_or_else(|payload| Err(TrainingError::Panicked(panic_message(payload.as_ref()))));
        outcome.map_err(|e| self.record_failure(job_id, e))
    }

    fn record_failure(&self, job_id: &str, err: TrainingError) -> TrainingError {
        tracing::error!(job_id = %job_id, error = %err, "training failed");
        self.registry.fail_job(job_id, &err.to_string());
        err
    }

    fn run(
        &self,
        job_id: &str,
        model_type: ModelType,
        samples: &[TrainingSample],
        hp: &Hyperparameters,
    ) -> TrainingResult<()> {
        hp.validate()
            .map_err(|e| TrainingError::InvalidRequest(e.to_string()))?;
        self.registry.update_status(job_id, JobStatus::Running);
        tracing::info!(
            job_id = %job_id,
            model_type = %model_type,
            samples = samples.len(),
            epochs = hp.epochs,
            "training started"
        );

        let data = self.toolkit.prepare_data(
            samples,
            hp.max_words as usize,
            hp.max_len as usize,
            self.config.test_size,
        )?;
        let num_classes = data.num_classes();
        let spec = ModelSpec {
            vocab_size: data.tokenizer.vocab_size(),
            max_len: hp.max_len as usize,
            num_classes,
            learning_rate: hp.learning_rate,
        };
        let mut model = self.toolkit.build_model(model_type, &spec)?;
        tracing::info!(
            job_id = %job_id,
            train = data.train.len(),
            test = data.test.len(),
            summary = %model.summary(),
            "model ready"
        );

        let options = FitOptions {
            epochs: hp.epochs as usize,
            batch_size: hp.batch_size as usize,
        };
        let mut reporter = ProgressReporter::new(
            &self.registry,
            job_id,
            options.epochs,
            self.config.progress_batch_interval,
        );
        let history = model.fit(&data.train, &data.test, &options, &mut |event| {
            reporter.on_event(event)
        })?;

        let evaluation = model.evaluate(&data.test)?;
        let predicted = metrics::binarize(&model.predict(&data.test.x), self.config.threshold);
        let classes = data.label_binarizer.classes().to_vec();
        let test_metrics =
            metrics::training_metrics(evaluation, &data.test.y, &predicted, &classes);
        tracing::info!(
            job_id = %job_id,
            test_loss = test_metrics.test_loss,
            test_accuracy = test_metrics.test_accuracy,
            f1_micro = test_metrics.f1_micro,
            "training completed"
        );

        let metadata = ModelMetadata {
            model_type,
            max_words: hp.max_words,
            max_len: hp.max_len,
            num_classes,
            classes,
            hyperparameters: hp.clone(),
            is_multilabel: true,
        };
        self.registry.complete_job(
            job_id,
            ResultBundle {
                model: model.into_trained(),
                tokenizer: data.tokenizer,
                label_binarizer: data.label_binarizer,
                metadata,
                metrics: test_metrics,
                history,
            },
        );
        Ok(())
    }

    /// Persist the artifacts of a completed job; returns the model file path.
    pub fn save_artifact(&self, job_id: &str, model_name: &str) -> TrainingResult<PathBuf> {
        validate_model_name(model_name)?;
        let job = self
            .registry
            .get_job(job_id)
            .ok_or_else(|| TrainingError::JobNotFound(job_id.to_string()))?;
        if job.status != JobStatus::Completed {
            return Err(TrainingError::JobNotCompleted {
                job_id: job_id.to_string(),
                status: job.status,
            });
        }
        let bundle = job
            .full_results()
            .ok_or_else(|| TrainingError::MissingResults(job_id.to_string()))?;

        let paths = self.layout.write_bundle(model_name, bundle)?;
        tracing::info!(
            job_id = %job_id,
            model = %paths.model.display(),
            "model artifacts saved"
        );
        Ok(paths.model)
    }
}

/// Thread names may not contain NUL; job ids are arbitrary caller strings.
fn thread_name(job_id: &str) -> String {
    format!("train-{}", job_id.replace('\0', "\u{fffd}"))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
