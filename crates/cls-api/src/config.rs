//! Environment-driven service configuration.

use cls_ml::ModelPaths;
use cls_trainer::OrchestratorConfig;
use std::path::PathBuf;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8000";
pub const DEFAULT_API_KEY: &str = "dev-secret-key-12345";
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen: String,
    pub api_key: String,
    /// Artifacts loaded at startup unless the active-model lookup overrides the model path.
    pub model_paths: ModelPaths,
    pub output_dir: PathBuf,
    pub progress_batch_interval: Option<usize>,
    pub max_body_bytes: usize,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub active_model_db: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source; unset or unparsable values fall back to defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str, default: &str| PathBuf::from(get(key).unwrap_or_else(|| default.to_string()));
        let number = |key: &str, default: usize| match get(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(key, value = %raw, default, "ignoring unparsable setting");
                default
            }),
            None => default,
        };

        let interval = number("PROGRESS_BATCH_INTERVAL", 10);
        Self {
            listen: get("CLS_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
            api_key: get("API_KEY").unwrap_or_else(|| DEFAULT_API_KEY.to_string()),
            model_paths: ModelPaths {
                model: path("MODEL_PATH", "ml_models/email_cnn_model.model.json"),
                tokenizer: path("TOKENIZER_PATH", "ml_models/tokenizer.json"),
                label_binarizer: path("LABEL_BINARIZER_PATH", "ml_models/label_binarizer.json"),
                metadata: path("METADATA_PATH", "ml_models/model_metadata.json"),
            },
            output_dir: path("MODEL_OUTPUT_DIR", "ml_models"),
            progress_batch_interval: (interval > 0).then_some(interval),
            max_body_bytes: number("MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES),
            allowed_origins: get("ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            active_model_db: get("ACTIVE_MODEL_DB").map(PathBuf::from),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            output_dir: self.output_dir.clone(),
            progress_batch_interval: self.progress_batch_interval,
            ..OrchestratorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ServiceConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]);
        assert_eq!(cfg.listen, DEFAULT_LISTEN);
        assert_eq!(cfg.api_key, DEFAULT_API_KEY);
        assert_eq!(cfg.progress_batch_interval, Some(10));
        assert_eq!(cfg.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(cfg.output_dir, PathBuf::from("ml_models"));
        assert!(cfg.allowed_origins.is_empty());
        assert!(cfg.active_model_db.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("API_KEY", "k"),
            ("PROGRESS_BATCH_INTERVAL", "0"),
            ("ALLOWED_ORIGINS", "http://a.test, ,http://b.test"),
            ("MODEL_OUTPUT_DIR", "/tmp/models"),
        ]);
        assert_eq!(cfg.api_key, "k");
        assert_eq!(cfg.progress_batch_interval, None);
        assert_eq!(cfg.allowed_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(cfg.orchestrator_config().output_dir, PathBuf::from("/tmp/models"));
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let cfg = config(&[("MAX_BODY_BYTES", "lots")]);
        assert_eq!(cfg.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
    }
}
