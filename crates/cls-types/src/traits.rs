//! Traits for the ML toolkit boundary: data preparation, model construction, fitting.

use crate::{ModelType, TrainingHistory, TrainingSample};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Scalar metrics keyed by name (`loss`, `binary_accuracy`, `val_loss`, ...).
pub type MetricLogs = BTreeMap<String, f64>;

/// Token id sequences and binarized label rows of one data split.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Split {
    pub x: Vec<Vec<u32>>,
    pub y: Vec<Vec<u8>>,
}

impl Split {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Output of data preparation: padded splits plus the fitted preprocessors.
pub struct PreparedData {
    pub train: Split,
    pub test: Split,
    pub tokenizer: Arc<dyn TextEncoder>,
    pub label_binarizer: Arc<dyn LabelEncoder>,
}

impl PreparedData {
    pub fn num_classes(&self) -> usize {
        self.label_binarizer.classes().len()
    }
}

/// Sizing parameters for model construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub vocab_size: usize,
    pub max_len: usize,
    pub num_classes: usize,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    pub epochs: usize,
    pub batch_size: usize,
}

/// Notification passed to the progress hook during `fit`. Epoch and batch are zero-based.
#[derive(Debug, Clone, Copy)]
pub enum FitEvent<'a> {
    BatchEnd {
        epoch: usize,
        batch: usize,
        total_batches: usize,
        logs: &'a MetricLogs,
    },
    EpochEnd {
        epoch: usize,
        logs: &'a MetricLogs,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    pub binary_accuracy: f64,
}

/// Fitted text tokenizer: text -> token id sequences (already padded).
pub trait TextEncoder: Send + Sync {
    fn texts_to_sequences(&self, texts: &[String]) -> Vec<Vec<u32>>;

    /// Number of embedding rows needed for the ids this encoder emits.
    fn vocab_size(&self) -> usize;

    fn save(&self, path: &Path) -> Result<(), ToolkitError>;
}

/// Fitted multi-label binarizer.
pub trait LabelEncoder: Send + Sync {
    fn classes(&self) -> &[String];

    fn transform(&self, labels: &[Vec<String>]) -> Vec<Vec<u8>>;

    fn save(&self, path: &Path) -> Result<(), ToolkitError>;
}

/// Trained, read-only model.
pub trait TextModel: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Per-label probabilities for each input row.
    fn predict(&self, x: &[Vec<u32>]) -> Vec<Vec<f32>>;

    fn save(&self, path: &Path) -> Result<(), ToolkitError>;
}

/// Model under training. Owned by exactly one training thread.
pub trait TrainableModel: Send {
    fn summary(&self) -> String;

    /// Train for `options.epochs`, invoking `hook` synchronously at batch and epoch boundaries.
    fn fit(
        &mut self,
        train: &Split,
        validation: &Split,
        options: &FitOptions,
        hook: &mut dyn FnMut(FitEvent<'_>),
    ) -> Result<TrainingHistory, ToolkitError>;

    fn evaluate(&self, data: &Split) -> Result<Evaluation, ToolkitError>;

    fn predict(&self, x: &[Vec<u32>]) -> Vec<Vec<f32>>;

    /// Freeze into a shareable trained model.
    fn into_trained(self: Box<Self>) -> Arc<dyn TextModel>;
}

/// ML toolkit: data preparation and model construction.
pub trait Toolkit: Send + Sync {
    fn prepare_data(
        &self,
        samples: &[TrainingSample],
        max_words: usize,
        max_len: usize,
        test_size: f64,
    ) -> Result<PreparedData, ToolkitError>;

    fn build_model(
        &self,
        model_type: ModelType,
        spec: &ModelSpec,
    ) -> Result<Box<dyn TrainableModel>, ToolkitError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolkitError {
    #[error("data preparation failed: {0}")]
    Data(String),
    #[error("model error: {0}")]
    Model(String),
    #[error("training failed: {0}")]
    Training(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
