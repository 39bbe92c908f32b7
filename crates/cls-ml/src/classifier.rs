//! Inference over saved artifacts.

use crate::{read_json, LabelBinarizer, NeuralTextModel, Tokenizer};
use cls_types::{
    LabelEncoder, ModelInfo, ModelMetadata, PredictedLabel, TextEncoder, TextModel, ToolkitError,
    TrainingMetrics,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const LABEL_BINARIZER_FILE: &str = "label_binarizer.json";
pub const METADATA_FILE: &str = "model_metadata.json";

/// Contents of the metadata artifact: model metadata plus the held-out metrics of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    #[serde(flatten)]
    pub metadata: ModelMetadata,
    #[serde(rename = "test_metrics", default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TrainingMetrics>,
}

/// Locations of the four artifacts of one saved model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub model: PathBuf,
    pub tokenizer: PathBuf,
    pub label_binarizer: PathBuf,
    pub metadata: PathBuf,
}

impl ModelPaths {
    /// `<dir>/<name>.model.json` next to the shared preprocessor and metadata files.
    pub fn in_dir(dir: &Path, name: &str) -> Self {
        Self {
            model: dir.join(format!("{name}.model.json")),
            tokenizer: dir.join(TOKENIZER_FILE),
            label_binarizer: dir.join(LABEL_BINARIZER_FILE),
            metadata: dir.join(METADATA_FILE),
        }
    }
}

#[derive(Debug)]
pub struct Classifier {
    model: NeuralTextModel,
    tokenizer: Tokenizer,
    label_binarizer: LabelBinarizer,
    metadata: MetadataDocument,
}

impl Classifier {
    pub fn load(paths: &ModelPaths) -> Result<Self, ToolkitError> {
        let model = NeuralTextModel::load(&paths.model)?;
        let tokenizer = Tokenizer::load(&paths.tokenizer)?;
        let label_binarizer = LabelBinarizer::load(&paths.label_binarizer)?;
        let metadata: MetadataDocument = read_json(&paths.metadata)?;

        let classes = label_binarizer.classes().len();
        if classes != model.config().num_classes {
            return Err(ToolkitError::Model(format!(
                "label binarizer has {classes} classes but the model has {} outputs",
                model.config().num_classes
            )));
        }
        tracing::info!(
            model = %paths.model.display(),
            model_type = %model.model_type(),
            classes,
            "classifier loaded"
        );
        Ok(Self {
            model,
            tokenizer,
            label_binarizer,
            metadata,
        })
    }

    /// Labels scoring at least `threshold`, highest first; when none do, the single best label.
    pub fn predict(&self, title: &str, content: &str, threshold: f32) -> Vec<PredictedLabel> {
        let seq = self
            .tokenizer
            .texts_to_sequences(&[format!("{title} {content}")]);
        let Some(scores) = self.model.predict(&seq).into_iter().next() else {
            return Vec::new();
        };

        let mut ranked: Vec<(usize, f32)> = scores.into_iter().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        let passing = ranked.iter().take_while(|(_, p)| *p >= threshold).count();
        ranked.truncate(passing.max(1));

        let classes = self.label_binarizer.classes();
        ranked
            .into_iter()
            .filter_map(|(i, p)| {
                classes.get(i).map(|label| PredictedLabel {
                    label: label.clone(),
                    confidence: f64::from(p),
                })
            })
            .collect()
    }

    pub fn info(&self) -> ModelInfo {
        let meta = &self.metadata.metadata;
        ModelInfo {
            loaded: true,
            max_len: Some(meta.max_len),
            num_classes: Some(self.label_binarizer.classes().len()),
            classes: Some(self.label_binarizer.classes().to_vec()),
            is_multilabel: Some(meta.is_multilabel),
            model_type: Some(meta.model_type.to_string()),
        }
    }

    pub fn metadata(&self) -> &MetadataDocument {
        &self.metadata
    }
}
