//! Multi-label binarizer: label name sets <-> 0/1 indicator rows.

use crate::{read_json, write_json};
use cls_types::{LabelEncoder, ToolkitError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelBinarizer {
    classes: Vec<String>,
}

impl LabelBinarizer {
    /// Fit on label sets; classes are sorted lexicographically.
    pub fn fit(labels: &[Vec<String>]) -> Self {
        let classes: BTreeSet<&String> = labels.iter().flatten().collect();
        Self {
            classes: classes.into_iter().cloned().collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ToolkitError> {
        read_json(path)
    }

    fn index_of(&self, label: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .ok()
    }
}

impl LabelEncoder for LabelBinarizer {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Unknown labels are ignored.
    fn transform(&self, labels: &[Vec<String>]) -> Vec<Vec<u8>> {
        let mut unknown = BTreeSet::new();
        let rows = labels
            .iter()
            .map(|set| {
                let mut row = vec![0u8; self.classes.len()];
                for label in set {
                    match self.index_of(label) {
                        Some(i) => row[i] = 1,
                        None => {
                            unknown.insert(label.as_str());
                        }
                    }
                }
                row
            })
            .collect();
        if !unknown.is_empty() {
            tracing::warn!(labels = ?unknown, "ignoring labels unseen during fit");
        }
        rows
    }

    fn save(&self, path: &Path) -> Result<(), ToolkitError> {
        write_json(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sets(items: &[&[&str]]) -> Vec<Vec<String>> {
        items
            .iter()
            .map(|s| s.iter().map(|l| l.to_string()).collect())
            .collect()
    }

    #[test]
    fn classes_are_sorted_and_unique() {
        let mlb = LabelBinarizer::fit(&sets(&[&["work", "study"], &["spam"], &["work"]]));
        assert_eq!(mlb.classes(), ["spam", "study", "work"]);
    }

    #[test]
    fn transform_sets_indicator_bits_and_skips_unknown() {
        let mlb = LabelBinarizer::fit(&sets(&[&["a", "b"], &["c"]]));
        let rows = mlb.transform(&sets(&[&["c", "a"], &["z"], &[]]));
        assert_eq!(rows, vec![vec![1, 0, 1], vec![0, 0, 0], vec![0, 0, 0]]);
    }
}
