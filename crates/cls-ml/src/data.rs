//! Data preparation: seeded train/test split, tokenization, label binarization.

use crate::{LabelBinarizer, Tokenizer};
use cls_types::{LabelEncoder, Split, TextEncoder, ToolkitError, TrainingSample};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Seed of the train/test shuffle, fixed so that a retrain on the same data is reproducible.
pub const SPLIT_SEED: u64 = 42;

/// Shuffled (train, test) index sets; the test side gets `ceil(test_size * n)` rows.
pub fn train_test_split(
    n: usize,
    test_size: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), ToolkitError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(ToolkitError::Data(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }
    let n_test = (test_size * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(ToolkitError::Data(format!(
            "cannot split {n} samples with test_size {test_size}"
        )));
    }
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = indices.split_off(n_test);
    Ok((train, indices))
}

/// Prepared splits together with the concrete fitted preprocessors.
pub struct Prepared {
    pub train: Split,
    pub test: Split,
    pub tokenizer: Tokenizer,
    pub label_binarizer: LabelBinarizer,
}

/// Split samples, fit the tokenizer on all texts and the binarizer on training labels.
pub fn prepare_data(
    samples: &[TrainingSample],
    max_words: usize,
    max_len: usize,
    test_size: f64,
) -> Result<Prepared, ToolkitError> {
    if max_len == 0 {
        return Err(ToolkitError::Data("max_len must be positive".to_string()));
    }
    let (train_idx, test_idx) = train_test_split(samples.len(), test_size, SPLIT_SEED)?;

    let texts = |idx: &[usize]| -> Vec<String> { idx.iter().map(|&i| samples[i].text()).collect() };
    let labels = |idx: &[usize]| -> Vec<Vec<String>> {
        idx.iter().map(|&i| samples[i].labels.clone()).collect()
    };
    let (train_texts, test_texts) = (texts(&train_idx), texts(&test_idx));
    let (train_labels, test_labels) = (labels(&train_idx), labels(&test_idx));

    let mut tokenizer = Tokenizer::new(max_words, max_len);
    let all_texts: Vec<String> = train_texts.iter().chain(&test_texts).cloned().collect();
    tokenizer.fit_on_texts(&all_texts);

    let label_binarizer = LabelBinarizer::fit(&train_labels);
    if label_binarizer.classes().is_empty() {
        return Err(ToolkitError::Data("training split has no labels".to_string()));
    }

    let train = Split {
        x: tokenizer.texts_to_sequences(&train_texts),
        y: label_binarizer.transform(&train_labels),
    };
    let test = Split {
        x: tokenizer.texts_to_sequences(&test_texts),
        y: label_binarizer.transform(&test_labels),
    };
    Ok(Prepared {
        train,
        test,
        tokenizer,
        label_binarizer,
    })
}
