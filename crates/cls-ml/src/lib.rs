//! ML toolkit: text preprocessing, an embedding-pooling network trained with Adam, and
//! multi-label evaluation metrics.

mod adam;
pub mod binarizer;
pub mod classifier;
pub mod data;
pub mod metrics;
#[cfg(feature = "test-util")]
pub mod mock;
pub mod network;
pub mod tokenizer;
mod toolkit;

pub use binarizer::LabelBinarizer;
pub use classifier::{Classifier, MetadataDocument, ModelPaths};
pub use cls_types::{Toolkit, ToolkitError};
pub use network::{NetworkConfig, NeuralTextModel, Pooling};
pub use tokenizer::Tokenizer;
pub use toolkit::{preset, NdarrayToolkit, Preset};

#[cfg(feature = "test-util")]
pub use mock::{FailAt, MockToolkit};

use serde::{de::DeserializeOwned, Serialize};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ToolkitError> {
    let mut writer = BufWriter::new(std::fs::File::create(path)?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ToolkitError> {
    let reader = BufReader::new(std::fs::File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
