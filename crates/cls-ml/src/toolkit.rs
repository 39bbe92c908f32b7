//! `Toolkit` implementation backed by the ndarray network.

use crate::data::prepare_data;
use crate::network::{NetworkConfig, NetworkTrainer, NeuralTextModel, Pooling};
use cls_types::{ModelSpec, ModelType, PreparedData, Toolkit, ToolkitError, TrainableModel, TrainingSample};
use rand::{rngs::StdRng, SeedableRng};
use std::sync::Arc;

/// Architecture settings an architecture tag maps to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preset {
    pub pooling: Pooling,
    pub hidden_units: Option<usize>,
    pub dropout: f32,
    /// Overrides the requested learning rate.
    pub fixed_learning_rate: Option<f32>,
}

pub fn preset(model_type: ModelType) -> Preset {
    match model_type {
        ModelType::Rnn => Preset {
            pooling: Pooling::Mean,
            hidden_units: None,
            dropout: 0.0,
            fixed_learning_rate: None,
        },
        ModelType::Lstm => Preset {
            pooling: Pooling::Mean,
            hidden_units: Some(128),
            dropout: 0.4,
            fixed_learning_rate: None,
        },
        ModelType::BiLstm => Preset {
            pooling: Pooling::MeanMax,
            hidden_units: Some(128),
            dropout: 0.5,
            fixed_learning_rate: None,
        },
        ModelType::Cnn => Preset {
            pooling: Pooling::Max,
            hidden_units: None,
            dropout: 0.5,
            fixed_learning_rate: None,
        },
        ModelType::BiLstmCnn => Preset {
            pooling: Pooling::MeanMax,
            hidden_units: Some(128),
            dropout: 0.4,
            fixed_learning_rate: Some(1e-3),
        },
    }
}

#[derive(Debug, Clone)]
pub struct NdarrayToolkit {
    seed: u64,
    embedding_dim: usize,
}

impl Default for NdarrayToolkit {
    fn default() -> Self {
        Self {
            seed: 42,
            embedding_dim: 128,
        }
    }
}

impl NdarrayToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_embedding_dim(mut self, embedding_dim: usize) -> Self {
        self.embedding_dim = embedding_dim;
        self
    }

    pub fn network_config(&self, model_type: ModelType, spec: &ModelSpec) -> NetworkConfig {
        let preset = preset(model_type);
        NetworkConfig {
            vocab_size: spec.vocab_size,
            max_len: spec.max_len,
            embedding_dim: self.embedding_dim,
            pooling: preset.pooling,
            hidden_units: preset.hidden_units,
            dropout: preset.dropout,
            num_classes: spec.num_classes,
            learning_rate: preset
                .fixed_learning_rate
                .unwrap_or(spec.learning_rate as f32),
        }
    }
}

impl Toolkit for NdarrayToolkit {
    fn prepare_data(
        &self,
        samples: &[TrainingSample],
        max_words: usize,
        max_len: usize,
        test_size: f64,
    ) -> Result<PreparedData, ToolkitError> {
        let prepared = prepare_data(samples, max_words, max_len, test_size)?;
        Ok(PreparedData {
            train: prepared.train,
            test: prepared.test,
            tokenizer: Arc::new(prepared.tokenizer),
            label_binarizer: Arc::new(prepared.label_binarizer),
        })
    }

    fn build_model(
        &self,
        model_type: ModelType,
        spec: &ModelSpec,
    ) -> Result<Box<dyn TrainableModel>, ToolkitError> {
        let config = self.network_config(model_type, spec);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let model = NeuralTextModel::new(model_type, config, &mut rng)?;
        tracing::info!(summary = %model.summary(), "model built");
        Ok(Box::new(NetworkTrainer::new(model, rng)))
    }
}
