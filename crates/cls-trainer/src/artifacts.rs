use crate::error::{TrainingError, TrainingResult};
use cls_jobs::ResultBundle;
use cls_ml::{MetadataDocument, ModelPaths};
use cls_types::{LabelEncoder, TextEncoder, TextModel};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const MAX_MODEL_NAME_CHARS: usize = 100;

/// Model names become file names: 1..=100 chars, no path separators or `..`.
pub fn validate_model_name(name: &str) -> TrainingResult<()> {
    let len = name.chars().count();
    if len == 0 || len > MAX_MODEL_NAME_CHARS {
        return Err(TrainingError::InvalidRequest(format!(
            "model name must be 1 to {MAX_MODEL_NAME_CHARS} characters"
        )));
    }
    if name.contains(['/', '\\']) || name.contains("..") || name.trim() != name {
        return Err(TrainingError::InvalidRequest(format!(
            "model name {name:?} is not a valid file name"
        )));
    }
    Ok(())
}

/// Filesystem layout of exported models: every artifact lives directly under `root`.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn paths(&self, model_name: &str) -> ModelPaths {
        ModelPaths::in_dir(&self.root, model_name)
    }

    /// Write the four artifacts of `bundle`. Not transactional: a failure part way
    /// leaves the files written so far in place.
    pub fn write_bundle(&self, model_name: &str, bundle: &ResultBundle) -> TrainingResult<ModelPaths> {
        std::fs::create_dir_all(&self.root)?;
        let paths = self.paths(model_name);

        bundle.model.save(&paths.model)?;
        bundle.tokenizer.save(&paths.tokenizer)?;
        bundle.label_binarizer.save(&paths.label_binarizer)?;

        let document = MetadataDocument {
            metadata: bundle.metadata.clone(),
            metrics: Some(bundle.metrics.clone()),
        };
        let mut writer = BufWriter::new(std::fs::File::create(&paths.metadata)?);
        serde_json::to_writer_pretty(&mut writer, &document)?;
        writer.flush()?;

        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_are_checked() {
        assert!(validate_model_name("email_cnn_v2").is_ok());
        assert!(validate_model_name("").is_err());
        assert!(validate_model_name(&"x".repeat(101)).is_err());
        assert!(validate_model_name("../escape").is_err());
        assert!(validate_model_name("a/b").is_err());
        assert!(validate_model_name(" padded").is_err());
    }

    #[test]
    fn paths_are_rooted_in_the_layout() {
        let layout = ArtifactLayout::new(PathBuf::from("ml_models"));
        let paths = layout.paths("email_cnn");
        assert_eq!(paths.model, Path::new("ml_models/email_cnn.model.json"));
        assert_eq!(paths.tokenizer, Path::new("ml_models/tokenizer.json"));
        assert_eq!(paths.label_binarizer, Path::new("ml_models/label_binarizer.json"));
    }
}
