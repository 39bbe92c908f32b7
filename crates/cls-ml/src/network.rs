//! Embedding-pooling text network: token embeddings pooled over the sequence, an optional
//! ReLU hidden layer, dropout, and one sigmoid output per label.

use crate::adam::{Adam, RowAdam};
use crate::metrics::BinaryScores;
use crate::{read_json, write_json};
use cls_types::{
    Evaluation, FitEvent, FitOptions, MetricLogs, ModelType, Split, TextModel, ToolkitError,
    TrainableModel, TrainingHistory,
};
use ndarray::{s, Array1, Array2, Axis, Zip};
use rand::{rngs::StdRng, seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Rows per forward pass during inference and evaluation.
const PREDICT_CHUNK: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pooling {
    Mean,
    Max,
    MeanMax,
}

impl Pooling {
    fn width(self, dim: usize) -> usize {
        match self {
            Pooling::MeanMax => 2 * dim,
            _ => dim,
        }
    }

    fn mean_offset(self) -> Option<usize> {
        match self {
            Pooling::Mean | Pooling::MeanMax => Some(0),
            Pooling::Max => None,
        }
    }

    fn max_offset(self, dim: usize) -> Option<usize> {
        match self {
            Pooling::Max => Some(0),
            Pooling::MeanMax => Some(dim),
            Pooling::Mean => None,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Pooling::Mean => "mean",
            Pooling::Max => "max",
            Pooling::MeanMax => "mean+max",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub vocab_size: usize,
    pub max_len: usize,
    pub embedding_dim: usize,
    pub pooling: Pooling,
    pub hidden_units: Option<usize>,
    pub dropout: f32,
    pub num_classes: usize,
    pub learning_rate: f32,
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), ToolkitError> {
        if self.vocab_size == 0 || self.embedding_dim == 0 || self.num_classes == 0 {
            return Err(ToolkitError::Model(format!(
                "invalid network shape: vocab {} x dim {} -> {} classes",
                self.vocab_size, self.embedding_dim, self.num_classes
            )));
        }
        if self.hidden_units == Some(0) {
            return Err(ToolkitError::Model("hidden layer must have units".to_string()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ToolkitError::Model(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if !(self.learning_rate > 0.0) {
            return Err(ToolkitError::Model(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Dense {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl Dense {
    /// Xavier-uniform weights, zero bias.
    fn xavier(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (inputs + outputs) as f32).sqrt();
        Self {
            weights: Array2::from_shape_simple_fn((inputs, outputs), || {
                rng.random_range(-limit..limit)
            }),
            bias: Array1::zeros(outputs),
        }
    }

    fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.weights) + &self.bias
    }

    fn param_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }
}

/// Trained network; the serialized form is the model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralTextModel {
    model_type: ModelType,
    config: NetworkConfig,
    embedding: Array2<f32>,
    hidden: Option<Dense>,
    output: Dense,
}

/// Intermediate activations of one forward pass, kept for backpropagation.
struct Forward {
    pooled: Array2<f32>,
    tokens: Vec<Vec<u32>>,
    argmax: Vec<Vec<u32>>,
    hidden_pre: Option<Array2<f32>>,
    features: Array2<f32>,
    mask: Option<Array2<f32>>,
    probs: Array2<f32>,
}

impl NeuralTextModel {
    pub fn new(
        model_type: ModelType,
        config: NetworkConfig,
        rng: &mut StdRng,
    ) -> Result<Self, ToolkitError> {
        config.validate()?;
        let dim = config.embedding_dim;
        let embedding: Array2<f32> =
            Array2::from_shape_simple_fn((config.vocab_size, dim), || rng.random_range(-0.05..0.05));
        let pooled_width = config.pooling.width(dim);
        let hidden = config
            .hidden_units
            .map(|units| Dense::xavier(pooled_width, units, rng));
        let output_inputs = config.hidden_units.unwrap_or(pooled_width);
        let output = Dense::xavier(output_inputs, config.num_classes, rng);
        Ok(Self {
            model_type,
            config,
            embedding,
            hidden,
            output,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ToolkitError> {
        let model: Self = read_json(path)?;
        model.config.validate()?;
        if model.embedding.dim() != (model.config.vocab_size, model.config.embedding_dim)
            || model.output.weights.ncols() != model.config.num_classes
        {
            return Err(ToolkitError::Model(format!(
                "model file {} does not match its configuration",
                path.display()
            )));
        }
        Ok(model)
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn param_count(&self) -> usize {
        self.embedding.len()
            + self.hidden.as_ref().map_or(0, Dense::param_count)
            + self.output.param_count()
    }

    pub fn summary(&self) -> String {
        let hidden = self
            .config
            .hidden_units
            .map_or_else(|| "none".to_string(), |u| u.to_string());
        format!(
            "{}: embedding {}x{}, pooling {}, hidden {}, dropout {}, output {} (sigmoid), {} params",
            self.model_type,
            self.config.vocab_size,
            self.config.embedding_dim,
            self.config.pooling.describe(),
            hidden,
            self.config.dropout,
            self.config.num_classes,
            self.param_count()
        )
    }

    /// Pool the embeddings of each row. Padding (0) and out-of-range ids are skipped;
    /// rows without any valid token pool to zeros.
    fn pool(&self, x: &[Vec<u32>]) -> (Array2<f32>, Vec<Vec<u32>>, Vec<Vec<u32>>) {
        let dim = self.config.embedding_dim;
        let pooling = self.config.pooling;
        let vocab = self.embedding.nrows();
        let mut pooled = Array2::zeros((x.len(), pooling.width(dim)));
        let mut tokens = Vec::with_capacity(x.len());
        let mut argmax = Vec::with_capacity(x.len());

        for (b, row) in x.iter().enumerate() {
            let ids: Vec<u32> = row
                .iter()
                .copied()
                .filter(|&id| id != 0 && (id as usize) < vocab)
                .collect();
            let mut arg = Vec::new();
            if let Some(&first) = ids.first() {
                let mut out = pooled.row_mut(b);
                if let Some(offset) = pooling.mean_offset() {
                    let mut mean = out.slice_mut(s![offset..offset + dim]);
                    for &id in &ids {
                        mean += &self.embedding.row(id as usize);
                    }
                    mean /= ids.len() as f32;
                }
                if let Some(offset) = pooling.max_offset(dim) {
                    let mut max = out.slice_mut(s![offset..offset + dim]);
                    max.assign(&self.embedding.row(first as usize));
                    arg = vec![first; dim];
                    for &id in &ids[1..] {
                        let e = self.embedding.row(id as usize);
                        for k in 0..dim {
                            if e[k] > max[k] {
                                max[k] = e[k];
                                arg[k] = id;
                            }
                        }
                    }
                }
            }
            tokens.push(ids);
            argmax.push(arg);
        }
        (pooled, tokens, argmax)
    }

    /// Dropout is applied only when an rng is supplied (training).
    fn forward(&self, x: &[Vec<u32>], dropout_rng: Option<&mut StdRng>) -> Forward {
        let (pooled, tokens, argmax) = self.pool(x);
        let (hidden_pre, mut features) = match &self.hidden {
            Some(hidden) => {
                let pre = hidden.forward(&pooled);
                let act = pre.mapv(|v| v.max(0.0));
                (Some(pre), act)
            }
            None => (None, pooled.clone()),
        };

        let mask = match dropout_rng {
            Some(rng) if self.config.dropout > 0.0 => {
                let keep = 1.0 - self.config.dropout;
                let mask = Array2::from_shape_simple_fn(features.dim(), || {
                    if rng.random::<f32>() < keep {
                        1.0 / keep
                    } else {
                        0.0
                    }
                });
                features *= &mask;
                Some(mask)
            }
            _ => None,
        };

        let probs = self.output.forward(&features).mapv(sigmoid);
        Forward {
            pooled,
            tokens,
            argmax,
            hidden_pre,
            features,
            mask,
            probs,
        }
    }

    /// Per-label probabilities, computed in fixed-size chunks.
    pub fn predict_proba(&self, x: &[Vec<u32>]) -> Vec<Vec<f32>> {
        x.chunks(PREDICT_CHUNK)
            .flat_map(|chunk| rows(&self.forward(chunk, None).probs))
            .collect()
    }

    /// Sparse embedding gradients from the gradient w.r.t. the pooled features.
    fn embedding_grads(&self, fwd: &Forward, dpooled: &Array2<f32>) -> HashMap<u32, Array1<f32>> {
        let dim = self.config.embedding_dim;
        let pooling = self.config.pooling;
        let mut grads: HashMap<u32, Array1<f32>> = HashMap::new();
        for (b, ids) in fwd.tokens.iter().enumerate() {
            if ids.is_empty() {
                continue;
            }
            if let Some(offset) = pooling.mean_offset() {
                let g = dpooled.slice(s![b, offset..offset + dim]);
                let scale = 1.0 / ids.len() as f32;
                for &id in ids {
                    grads
                        .entry(id)
                        .or_insert_with(|| Array1::zeros(dim))
                        .scaled_add(scale, &g);
                }
            }
            if let Some(offset) = pooling.max_offset(dim) {
                for (k, &id) in fwd.argmax[b].iter().enumerate() {
                    grads.entry(id).or_insert_with(|| Array1::zeros(dim))[k] +=
                        dpooled[[b, offset + k]];
                }
            }
        }
        grads
    }
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

fn rows(a: &Array2<f32>) -> Vec<Vec<f32>> {
    a.outer_iter().map(|r| r.to_vec()).collect()
}

impl TextModel for NeuralTextModel {
    fn kind(&self) -> &'static str {
        "neural-text"
    }

    fn predict(&self, x: &[Vec<u32>]) -> Vec<Vec<f32>> {
        self.predict_proba(x)
    }

    fn save(&self, path: &Path) -> Result<(), ToolkitError> {
        write_json(path, self)
    }
}

struct DenseOptimizer {
    weights: Adam,
    bias: Adam,
}

impl DenseOptimizer {
    fn for_layer(layer: &Dense, learning_rate: f32) -> Self {
        Self {
            weights: Adam::new(layer.weights.len(), learning_rate),
            bias: Adam::new(layer.bias.len(), learning_rate),
        }
    }

    fn step(
        &mut self,
        layer: &mut Dense,
        grad_w: &Array2<f32>,
        grad_b: &Array1<f32>,
    ) -> Result<(), ToolkitError> {
        self.weights.update_tensor(grad_w, &mut layer.weights)?;
        self.bias.update_tensor(grad_b, &mut layer.bias)
    }
}

/// A network together with its optimizer state and shuffling rng.
pub struct NetworkTrainer {
    model: NeuralTextModel,
    rng: StdRng,
    embedding_opt: RowAdam,
    hidden_opt: Option<DenseOptimizer>,
    output_opt: DenseOptimizer,
}

impl NetworkTrainer {
    pub fn new(model: NeuralTextModel, rng: StdRng) -> Self {
        let lr = model.config.learning_rate;
        let embedding_opt = RowAdam::new(model.embedding.nrows(), model.embedding.ncols(), lr);
        let hidden_opt = model
            .hidden
            .as_ref()
            .map(|h| DenseOptimizer::for_layer(h, lr));
        let output_opt = DenseOptimizer::for_layer(&model.output, lr);
        Self {
            model,
            rng,
            embedding_opt,
            hidden_opt,
            output_opt,
        }
    }

    pub fn model(&self) -> &NeuralTextModel {
        &self.model
    }

    /// One mini-batch of Adam on mean binary cross-entropy; returns the batch probabilities.
    fn train_step(&mut self, x: &[Vec<u32>], y: &[Vec<u8>]) -> Result<Vec<Vec<f32>>, ToolkitError> {
        let fwd = self.model.forward(x, Some(&mut self.rng));
        let (batch, classes) = fwd.probs.dim();
        let targets = Array2::from_shape_fn((batch, classes), |(i, j)| f32::from(y[i][j]));
        let dlogits = (&fwd.probs - &targets) * (1.0 / (batch * classes) as f32);

        let grad_out_w = fwd.features.t().dot(&dlogits);
        let grad_out_b = dlogits.sum_axis(Axis(0));
        let mut dfeatures = dlogits.dot(&self.model.output.weights.t());
        if let Some(mask) = &fwd.mask {
            dfeatures *= mask;
        }

        let (dpooled, hidden_grads) = match (&self.model.hidden, &fwd.hidden_pre) {
            (Some(hidden), Some(pre)) => {
                let mut dpre = dfeatures;
                Zip::from(&mut dpre).and(pre).for_each(|g, &h| {
                    if h <= 0.0 {
                        *g = 0.0;
                    }
                });
                let grad_w = fwd.pooled.t().dot(&dpre);
                let grad_b = dpre.sum_axis(Axis(0));
                (dpre.dot(&hidden.weights.t()), Some((grad_w, grad_b)))
            }
            _ => (dfeatures, None),
        };
        let embedding_grads = self.model.embedding_grads(&fwd, &dpooled);

        self.output_opt
            .step(&mut self.model.output, &grad_out_w, &grad_out_b)?;
        if let (Some(opt), Some(layer), Some((grad_w, grad_b))) =
            (&mut self.hidden_opt, &mut self.model.hidden, hidden_grads)
        {
            opt.step(layer, &grad_w, &grad_b)?;
        }
        self.embedding_opt
            .update_rows(&embedding_grads, &mut self.model.embedding)?;

        Ok(rows(&fwd.probs))
    }

    fn scores(&self, data: &Split) -> BinaryScores {
        let mut scores = BinaryScores::new();
        scores.update(&self.model.predict_proba(&data.x), &data.y);
        scores
    }

    fn check_split(&self, name: &str, data: &Split) -> Result<(), ToolkitError> {
        if data.x.len() != data.y.len() {
            return Err(ToolkitError::Training(format!(
                "{name}: {} rows but {} label rows",
                data.x.len(),
                data.y.len()
            )));
        }
        let classes = self.model.config.num_classes;
        if let Some(row) = data.y.iter().find(|row| row.len() != classes) {
            return Err(ToolkitError::Training(format!(
                "{name}: label row has {} columns, model has {classes} outputs",
                row.len()
            )));
        }
        Ok(())
    }
}

impl TrainableModel for NetworkTrainer {
    fn summary(&self) -> String {
        self.model.summary()
    }

    fn fit(
        &mut self,
        train: &Split,
        validation: &Split,
        options: &FitOptions,
        hook: &mut dyn FnMut(FitEvent<'_>),
    ) -> Result<TrainingHistory, ToolkitError> {
        self.check_split("train", train)?;
        self.check_split("validation", validation)?;
        if train.is_empty() {
            return Err(ToolkitError::Training("no training rows".to_string()));
        }
        if options.batch_size == 0 {
            return Err(ToolkitError::Training("batch size must be positive".to_string()));
        }

        let total_batches = train.len().div_ceil(options.batch_size);
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut history = TrainingHistory::default();

        for epoch in 0..options.epochs {
            order.shuffle(&mut self.rng);
            let mut scores = BinaryScores::new();
            for (batch, idx) in order.chunks(options.batch_size).enumerate() {
                let x: Vec<Vec<u32>> = idx.iter().map(|&i| train.x[i].clone()).collect();
                let y: Vec<Vec<u8>> = idx.iter().map(|&i| train.y[i].clone()).collect();
                let probs = self.train_step(&x, &y)?;
                scores.update(&probs, &y);

                let mut logs = MetricLogs::new();
                scores.write_logs("", &mut logs);
                hook(FitEvent::BatchEnd {
                    epoch,
                    batch,
                    total_batches,
                    logs: &logs,
                });
            }

            let mut logs = MetricLogs::new();
            scores.write_logs("", &mut logs);
            history.loss.push(scores.loss());
            history.accuracy.push(scores.binary_accuracy());
            if !validation.is_empty() {
                let val = self.scores(validation);
                val.write_logs("val_", &mut logs);
                history.val_loss.push(val.loss());
                history.val_accuracy.push(val.binary_accuracy());
            }
            tracing::debug!(epoch, loss = scores.loss(), "epoch finished");
            hook(FitEvent::EpochEnd { epoch, logs: &logs });
        }
        Ok(history)
    }

    fn evaluate(&self, data: &Split) -> Result<Evaluation, ToolkitError> {
        self.check_split("evaluation", data)?;
        if data.is_empty() {
            return Err(ToolkitError::Training("evaluation set is empty".to_string()));
        }
        Ok(self.scores(data).evaluation())
    }

    fn predict(&self, x: &[Vec<u32>]) -> Vec<Vec<f32>> {
        self.model.predict_proba(x)
    }

    fn into_trained(self: Box<Self>) -> Arc<dyn TextModel> {
        Arc::new(self.model)
    }
}
