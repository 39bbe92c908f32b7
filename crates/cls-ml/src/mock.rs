//! Deterministic toolkit for tests: real data preparation, instant training,
//! optional per-epoch delay and injected failures.

use crate::data::prepare_data;
use crate::write_json;
use cls_types::{
    Evaluation, FitEvent, FitOptions, MetricLogs, ModelSpec, ModelType, PreparedData, Split,
    TextModel, Toolkit, ToolkitError, TrainableModel, TrainingHistory, TrainingSample,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Test loss reported by every mock evaluation.
pub const MOCK_TEST_LOSS: f64 = 0.37;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Prepare,
    Build,
    /// After the first batch of the first epoch.
    Fit,
}

#[derive(Debug, Clone, Default)]
pub struct MockToolkit {
    fail_at: Option<FailAt>,
    epoch_delay: Duration,
}

impl MockToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(mut self, stage: FailAt) -> Self {
        self.fail_at = Some(stage);
        self
    }

    pub fn with_epoch_delay(mut self, delay: Duration) -> Self {
        self.epoch_delay = delay;
        self
    }

    fn injected(&self, stage: FailAt) -> bool {
        self.fail_at == Some(stage)
    }
}

impl Toolkit for MockToolkit {
    fn prepare_data(
        &self,
        samples: &[TrainingSample],
        max_words: usize,
        max_len: usize,
        test_size: f64,
    ) -> Result<PreparedData, ToolkitError> {
        if self.injected(FailAt::Prepare) {
            return Err(ToolkitError::Data("injected failure".to_string()));
        }
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
        if self.injected(FailAt::Build) {
            return Err(ToolkitError::Model("injected failure".to_string()));
        }
        Ok(Box::new(MockModel {
            trained: MockTextModel {
                model_type,
                num_classes: spec.num_classes,
            },
            fail_in_fit: self.injected(FailAt::Fit),
            epoch_delay: self.epoch_delay,
        }))
    }
}

struct MockModel {
    trained: MockTextModel,
    fail_in_fit: bool,
    epoch_delay: Duration,
}

impl TrainableModel for MockModel {
    fn summary(&self) -> String {
        format!("{}: mock, {} outputs", self.trained.model_type, self.trained.num_classes)
    }

    fn fit(
        &mut self,
        train: &Split,
        _validation: &Split,
        options: &FitOptions,
        hook: &mut dyn FnMut(FitEvent<'_>),
    ) -> Result<TrainingHistory, ToolkitError> {
        let total_batches = train.len().div_ceil(options.batch_size.max(1));
        let mut history = TrainingHistory::default();
        for epoch in 0..options.epochs {
            let loss = 1.0 / (epoch + 2) as f64;
            let mut logs = MetricLogs::new();
            logs.insert("loss".to_string(), loss);
            logs.insert("binary_accuracy".to_string(), 1.0 - loss);
            for batch in 0..total_batches {
                hook(FitEvent::BatchEnd {
                    epoch,
                    batch,
                    total_batches,
                    logs: &logs,
                });
                if self.fail_in_fit {
                    return Err(ToolkitError::Training("injected failure".to_string()));
                }
            }
            if !self.epoch_delay.is_zero() {
                std::thread::sleep(self.epoch_delay);
            }
            logs.insert("val_loss".to_string(), loss * 1.1);
            logs.insert("val_binary_accuracy".to_string(), 1.0 - loss * 1.1);
            history.loss.push(loss);
            history.accuracy.push(1.0 - loss);
            history.val_loss.push(loss * 1.1);
            history.val_accuracy.push(1.0 - loss * 1.1);
            hook(FitEvent::EpochEnd { epoch, logs: &logs });
        }
        Ok(history)
    }

    fn evaluate(&self, _data: &Split) -> Result<Evaluation, ToolkitError> {
        Ok(Evaluation {
            loss: MOCK_TEST_LOSS,
            binary_accuracy: 0.9,
        })
    }

    fn predict(&self, x: &[Vec<u32>]) -> Vec<Vec<f32>> {
        self.trained.predict(x)
    }

    fn into_trained(self: Box<Self>) -> Arc<dyn TextModel> {
        Arc::new(self.trained)
    }
}

/// Scores the first label 0.9 and every other label 0.1.
#[derive(Debug, Clone, Serialize)]
pub struct MockTextModel {
    model_type: ModelType,
    num_classes: usize,
}

impl TextModel for MockTextModel {
    fn kind(&self) -> &'static str {
        "mock"
    }

    fn predict(&self, x: &[Vec<u32>]) -> Vec<Vec<f32>> {
        x.iter()
            .map(|_| {
                (0..self.num_classes)
                    .map(|c| if c == 0 { 0.9 } else { 0.1 })
                    .collect()
            })
            .collect()
    }

    fn save(&self, path: &Path) -> Result<(), ToolkitError> {
        write_json(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cls_types::TextEncoder;

    fn samples(n: usize) -> Vec<TrainingSample> {
        (0..n)
            .map(|i| TrainingSample {
                id: i as i64,
                title: format!("t{i}"),
                content: "body".into(),
                labels: vec![if i % 2 == 0 { "a".into() } else { "b".into() }],
            })
            .collect()
    }

    #[test]
    fn mock_fit_reports_batches_and_epochs() {
        let toolkit = MockToolkit::new();
        let data = toolkit.prepare_data(&samples(10), 100, 8, 0.3).unwrap();
        let spec = ModelSpec {
            vocab_size: data.tokenizer.vocab_size(),
            max_len: 8,
            num_classes: data.num_classes(),
            learning_rate: 1e-3,
        };
        let mut model = toolkit.build_model(ModelType::Cnn, &spec).unwrap();
        let mut events = 0;
        let options = FitOptions {
            epochs: 2,
            batch_size: 4,
        };
        let history = model
            .fit(&data.train, &data.test, &options, &mut |_| events += 1)
            .unwrap();
        // 7 training rows -> 2 batches per epoch, plus one epoch event each
        assert_eq!(events, 6);
        assert_eq!(history.loss.len(), 2);
        assert_eq!(model.evaluate(&data.test).unwrap().loss, MOCK_TEST_LOSS);
    }

    #[test]
    fn injected_failures_surface_at_their_stage() {
        let prep = MockToolkit::new().failing_at(FailAt::Prepare);
        assert!(prep.prepare_data(&samples(10), 100, 8, 0.3).is_err());

        let spec = ModelSpec {
            vocab_size: 10,
            max_len: 8,
            num_classes: 2,
            learning_rate: 1e-3,
        };
        let build = MockToolkit::new().failing_at(FailAt::Build);
        assert!(build.build_model(ModelType::Rnn, &spec).is_err());

        let fit = MockToolkit::new().failing_at(FailAt::Fit);
        let mut model = fit.build_model(ModelType::Rnn, &spec).unwrap();
        let split = Split {
            x: vec![vec![1]],
            y: vec![vec![1, 0]],
        };
        let options = FitOptions {
            epochs: 1,
            batch_size: 1,
        };
        assert!(model.fit(&split, &split, &options, &mut |_| {}).is_err());
    }
}
