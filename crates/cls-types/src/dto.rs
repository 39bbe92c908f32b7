//! Request and response DTOs of the classification and retraining API.

use crate::{Hyperparameters, ModelType, TrainingSample, ValidationError};
use serde::{Deserialize, Serialize};

/// Minimum number of samples accepted by a retrain request.
pub const MIN_TRAINING_SAMPLES: usize = 10;

/// Maximum length of a classify request title, in characters.
pub const MAX_TITLE_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrainRequest {
    pub job_id: String,
    pub model_type: String,
    /// Accepted for compatibility; retraining always starts from scratch.
    #[serde(default)]
    pub model_path: Option<String>,
    pub samples: Vec<TrainingSample>,
    #[serde(default)]
    pub hyperparameters: Hyperparameters,
}

impl RetrainRequest {
    /// Validate the request; returns the parsed model type.
    pub fn validate(&self) -> Result<ModelType, ValidationError> {
        if self.job_id.trim().is_empty() {
            return Err(ValidationError::new("jobId is required"));
        }
        let model_type = self
            .model_type
            .parse::<ModelType>()
            .map_err(|e| ValidationError(e.to_string()))?;
        if self.samples.len() < MIN_TRAINING_SAMPLES {
            return Err(ValidationError(format!(
                "at least {} samples are required, got {}",
                MIN_TRAINING_SAMPLES,
                self.samples.len()
            )));
        }
        if let Some(s) = self.samples.iter().find(|s| s.labels.is_empty()) {
            return Err(ValidationError(format!(
                "sample {} has an empty labels list",
                s.id
            )));
        }
        self.hyperparameters.validate()?;
        Ok(model_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrainResponse {
    pub job_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveModelRequest {
    pub model_name: String,
    /// Optional; the job id in the path takes precedence.
    #[serde(default)]
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveModelResponse {
    pub success: bool,
    pub model_path: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub title: String,
    pub content: String,
}

impl ClassifyRequest {
    /// Trimmed (title, content), rejecting blank fields and overlong titles.
    pub fn validate(&self) -> Result<(String, String), ValidationError> {
        let title = self.title.trim();
        let content = self.content.trim();
        if title.is_empty() {
            return Err(ValidationError::new("title cannot be empty or whitespace only"));
        }
        if content.is_empty() {
            return Err(ValidationError::new("content cannot be empty or whitespace only"));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(ValidationError(format!(
                "title must be at most {} characters",
                MAX_TITLE_CHARS
            )));
        }
        Ok((title.to_string(), content.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedLabel {
    pub label: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub labels: Vec<PredictedLabel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

/// Information about the loaded classifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_len: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_classes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_multilabel: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteJobResponse {
    pub job_id: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: i64, labels: &[&str]) -> TrainingSample {
        TrainingSample {
            id,
            title: format!("title {id}"),
            content: "content".to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    fn request(n: usize) -> RetrainRequest {
        RetrainRequest {
            job_id: "job-1".to_string(),
            model_type: "CNN".to_string(),
            model_path: None,
            samples: (0..n as i64).map(|i| sample(i, &["work"])).collect(),
            hyperparameters: Hyperparameters::default(),
        }
    }

    #[test]
    fn retrain_request_parses_camel_case() {
        let req: RetrainRequest = serde_json::from_value(serde_json::json!({
            "jobId": "42",
            "modelType": "LSTM",
            "samples": [{"id": 1, "title": "t", "content": "c", "labels": ["a"]}],
            "hyperparameters": {"epochs": 2}
        }))
        .unwrap();
        assert_eq!(req.job_id, "42");
        assert_eq!(req.hyperparameters.epochs, 2);
        assert_eq!(req.hyperparameters.batch_size, 32);
    }

    #[test]
    fn retrain_request_validation() {
        assert_eq!(request(10).validate().unwrap(), ModelType::Cnn);
        assert!(request(9).validate().is_err());

        let mut bad_type = request(10);
        bad_type.model_type = "GPT".to_string();
        assert!(bad_type.validate().unwrap_err().0.contains("GPT"));

        let mut empty_labels = request(10);
        empty_labels.samples[3].labels.clear();
        assert!(empty_labels.validate().is_err());
    }

    #[test]
    fn classify_request_trims_and_rejects_blank() {
        let req = ClassifyRequest {
            title: "  Meeting  ".to_string(),
            content: " tomorrow ".to_string(),
        };
        assert_eq!(
            req.validate().unwrap(),
            ("Meeting".to_string(), "tomorrow".to_string())
        );
        let blank = ClassifyRequest {
            title: "   ".to_string(),
            content: "x".to_string(),
        };
        assert!(blank.validate().is_err());
    }
}
