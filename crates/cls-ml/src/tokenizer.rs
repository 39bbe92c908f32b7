//! Word-level tokenizer with frequency-ranked vocabulary and fixed-length output.

use crate::{read_json, write_json};
use cls_types::{TextEncoder, ToolkitError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Characters replaced by whitespace before splitting.
const FILTERS: &str = "!\"#$%&()*+,-./:;<=>?@[\\]^_`{|}~\t\n";

/// Maps words to ids ranked by frequency (1 = most frequent; 0 is padding).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tokenizer {
    num_words: usize,
    max_len: usize,
    word_index: HashMap<String, u32>,
}

impl Tokenizer {
    /// `num_words` bounds the emitted ids to `1..num_words`; output is padded to `max_len`.
    pub fn new(num_words: usize, max_len: usize) -> Self {
        Self {
            num_words,
            max_len,
            word_index: HashMap::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ToolkitError> {
        read_json(path)
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn word_index(&self) -> &HashMap<String, u32> {
        &self.word_index
    }

    fn words(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| c.is_whitespace() || FILTERS.contains(c))
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
    }

    /// Build the vocabulary, replacing any previous one. Ties keep first-seen order.
    pub fn fit_on_texts(&mut self, texts: &[String]) {
        let mut counts: HashMap<String, (u64, usize)> = HashMap::new();
        for text in texts {
            for word in Self::words(text) {
                let next = counts.len();
                counts.entry(word).or_insert((0, next)).0 += 1;
            }
        }
        let mut ranked: Vec<(String, u64, usize)> = counts
            .into_iter()
            .map(|(w, (count, first))| (w, count, first))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        self.word_index = ranked
            .into_iter()
            .enumerate()
            .map(|(i, (w, _, _))| (w, i as u32 + 1))
            .collect();
    }

    /// Unpadded id sequence; out-of-vocabulary and beyond-`num_words` words are dropped.
    pub fn sequence(&self, text: &str) -> Vec<u32> {
        Self::words(text)
            .filter_map(|w| self.word_index.get(&w).copied())
            .filter(|&id| (id as usize) < self.num_words)
            .collect()
    }
}

/// Truncate or zero-pad at the end to exactly `max_len` ids.
pub fn pad_sequence(mut seq: Vec<u32>, max_len: usize) -> Vec<u32> {
    seq.resize(max_len, 0);
    seq
}

impl TextEncoder for Tokenizer {
    fn texts_to_sequences(&self, texts: &[String]) -> Vec<Vec<u32>> {
        texts
            .iter()
            .map(|t| pad_sequence(self.sequence(t), self.max_len))
            .collect()
    }

    fn vocab_size(&self) -> usize {
        self.num_words.min(self.word_index.len() + 1)
    }

    fn save(&self, path: &Path) -> Result<(), ToolkitError> {
        write_json(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ranks_words_by_frequency_then_first_occurrence() {
        let mut tok = Tokenizer::new(100, 8);
        tok.fit_on_texts(&texts(&["b a a", "c b a"]));
        assert_eq!(tok.word_index()["a"], 1);
        assert_eq!(tok.word_index()["b"], 2);
        assert_eq!(tok.word_index()["c"], 3);
    }

    #[test]
    fn strips_punctuation_and_lowercases() {
        let mut tok = Tokenizer::new(100, 8);
        tok.fit_on_texts(&texts(&["Hello, World! hello"]));
        assert_eq!(tok.sequence("HELLO world?"), vec![1, 2]);
        assert_eq!(tok.word_index().len(), 2);
    }

    #[test]
    fn keeps_unicode_words_intact() {
        let mut tok = Tokenizer::new(100, 4);
        tok.fit_on_texts(&texts(&["Công việc học tập"]));
        assert_eq!(tok.sequence("công VIỆC"), vec![1, 2]);
    }

    #[test]
    fn num_words_limits_emitted_ids() {
        let mut tok = Tokenizer::new(3, 8);
        tok.fit_on_texts(&texts(&["a a a b b c"]));
        assert_eq!(tok.sequence("a b c"), vec![1, 2]);
        assert_eq!(tok.vocab_size(), 3);
    }

    #[test]
    fn pads_and_truncates_at_the_end() {
        assert_eq!(pad_sequence(vec![1, 2], 4), vec![1, 2, 0, 0]);
        assert_eq!(pad_sequence(vec![1, 2, 3, 4, 5], 3), vec![1, 2, 3]);

        let mut tok = Tokenizer::new(100, 3);
        tok.fit_on_texts(&texts(&["x y z w"]));
        assert_eq!(
            tok.texts_to_sequences(&texts(&["x", "x y z w"])),
            vec![vec![1, 0, 0], vec![1, 2, 3]]
        );
    }

    #[test]
    fn save_and_load_preserve_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        let mut tok = Tokenizer::new(50, 10);
        tok.fit_on_texts(&texts(&["alpha beta beta"]));
        tok.save(&path).unwrap();
        assert_eq!(Tokenizer::load(&path).unwrap(), tok);
    }
}
