//! Model architecture tags, hyperparameters, samples, and training result summaries.

use crate::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Architecture tag accepted by the retraining API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    #[serde(rename = "RNN")]
    Rnn,
    #[serde(rename = "LSTM")]
    Lstm,
    #[serde(rename = "BiLSTM")]
    BiLstm,
    #[serde(rename = "CNN")]
    Cnn,
    #[serde(rename = "BiLSTM+CNN")]
    BiLstmCnn,
}

impl ModelType {
    pub const ALL: [ModelType; 5] = [
        ModelType::Rnn,
        ModelType::Lstm,
        ModelType::BiLstm,
        ModelType::Cnn,
        ModelType::BiLstmCnn,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelType::Rnn => "RNN",
            ModelType::Lstm => "LSTM",
            ModelType::BiLstm => "BiLSTM",
            ModelType::Cnn => "CNN",
            ModelType::BiLstmCnn => "BiLSTM+CNN",
        }
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown model type: {0} (expected one of RNN, LSTM, BiLSTM, CNN, BiLSTM+CNN)")]
pub struct ParseModelTypeError(pub String);

impl FromStr for ModelType {
    type Err = ParseModelTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseModelTypeError(s.to_string()))
    }
}

/// Training hyperparameters; every field falls back to its default when omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    #[serde(default = "default_epochs")]
    pub epochs: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_max_words")]
    pub max_words: u32,
    #[serde(default = "default_max_len")]
    pub max_len: u32,
}

fn default_epochs() -> u32 {
    25
}

fn default_batch_size() -> u32 {
    32
}

fn default_learning_rate() -> f64 {
    0.0001
}

fn default_max_words() -> u32 {
    50_000
}

fn default_max_len() -> u32 {
    256
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            max_words: default_max_words(),
            max_len: default_max_len(),
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=100).contains(&self.epochs) {
            return Err(ValidationError::new("epochs must be between 1 and 100"));
        }
        if !(1..=256).contains(&self.batch_size) {
            return Err(ValidationError::new("batch_size must be between 1 and 256"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 || self.learning_rate > 1.0 {
            return Err(ValidationError::new("learning_rate must be in (0, 1]"));
        }
        if self.max_words < 1000 {
            return Err(ValidationError::new("max_words must be >= 1000"));
        }
        if !(50..=1000).contains(&self.max_len) {
            return Err(ValidationError::new("max_len must be between 50 and 1000"));
        }
        Ok(())
    }
}

/// One labelled training document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub labels: Vec<String>,
}

impl TrainingSample {
    /// Text fed to the tokenizer: title and content joined by a space.
    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.content)
    }
}

/// Descriptive metadata stored with a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_type: ModelType,
    pub max_words: u32,
    pub max_len: u32,
    pub num_classes: usize,
    pub classes: Vec<String>,
    pub hyperparameters: Hyperparameters,
    #[serde(default = "default_multilabel")]
    pub is_multilabel: bool,
}

fn default_multilabel() -> bool {
    true
}

/// Per-label (or averaged) row of a classification report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: u64,
}

/// Held-out evaluation metrics of a finished training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingMetrics {
    pub test_loss: f64,
    pub test_accuracy: f64,
    #[serde(default)]
    pub hamming_loss: f64,
    #[serde(default)]
    pub subset_accuracy: f64,
    #[serde(default)]
    pub f1_macro: f64,
    #[serde(default)]
    pub f1_micro: f64,
    #[serde(default)]
    pub f1_weighted: f64,
    #[serde(default)]
    pub classification_report: BTreeMap<String, ReportEntry>,
    /// Not computed for multi-label runs.
    #[serde(default)]
    pub confusion_matrix: Option<Vec<Vec<u64>>>,
}

/// Per-epoch training curves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    #[serde(default)]
    pub loss: Vec<f64>,
    #[serde(default)]
    pub accuracy: Vec<f64>,
    #[serde(default)]
    pub val_loss: Vec<f64>,
    #[serde(default)]
    pub val_accuracy: Vec<f64>,
}
