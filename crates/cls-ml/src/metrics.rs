//! Multi-label metrics: binary cross-entropy, running batch scores with a bucketed ROC AUC,
//! F1 averages and the per-label classification report.

use cls_types::{Evaluation, MetricLogs, ReportEntry, TrainingMetrics};
use std::collections::BTreeMap;

/// Probabilities are clipped to `[EPSILON, 1 - EPSILON]` before taking logs.
pub const EPSILON: f64 = 1e-7;

pub fn binary_cross_entropy(p: f32, y: u8) -> f64 {
    let p = (p as f64).clamp(EPSILON, 1.0 - EPSILON);
    if y > 0 {
        -p.ln()
    } else {
        -(1.0 - p).ln()
    }
}

/// Score buckets used by the running AUC estimate.
const AUC_BINS: usize = 200;

/// Running accumulator of the per-cell scores reported during fit and evaluation.
#[derive(Debug, Clone)]
pub struct BinaryScores {
    loss_sum: f64,
    cells: u64,
    correct: u64,
    tp: u64,
    fp: u64,
    fn_: u64,
    positives: Vec<u64>,
    negatives: Vec<u64>,
}

impl Default for BinaryScores {
    fn default() -> Self {
        Self {
            loss_sum: 0.0,
            cells: 0,
            correct: 0,
            tp: 0,
            fp: 0,
            fn_: 0,
            positives: vec![0; AUC_BINS],
            negatives: vec![0; AUC_BINS],
        }
    }
}

impl BinaryScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, probs: &[Vec<f32>], targets: &[Vec<u8>]) {
        for (row, truth) in probs.iter().zip(targets) {
            for (&p, &y) in row.iter().zip(truth) {
                self.loss_sum += binary_cross_entropy(p, y);
                self.cells += 1;
                let predicted = p >= 0.5;
                let actual = y > 0;
                if predicted == actual {
                    self.correct += 1;
                }
                match (predicted, actual) {
                    (true, true) => self.tp += 1,
                    (true, false) => self.fp += 1,
                    (false, true) => self.fn_ += 1,
                    (false, false) => {}
                }
                let bin = ((p.clamp(0.0, 1.0) * AUC_BINS as f32) as usize).min(AUC_BINS - 1);
                if actual {
                    self.positives[bin] += 1;
                } else {
                    self.negatives[bin] += 1;
                }
            }
        }
    }

    pub fn loss(&self) -> f64 {
        ratio(self.loss_sum, self.cells as f64)
    }

    pub fn binary_accuracy(&self) -> f64 {
        ratio(self.correct as f64, self.cells as f64)
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp as f64, (self.tp + self.fp) as f64)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp as f64, (self.tp + self.fn_) as f64)
    }

    /// ROC AUC with scores bucketed into `AUC_BINS` ranges; pairs sharing a bucket count as ties.
    /// 0.0 when only one class has been seen.
    pub fn auc(&self) -> f64 {
        let total_pos: u64 = self.positives.iter().sum();
        let total_neg: u64 = self.negatives.iter().sum();
        if total_pos == 0 || total_neg == 0 {
            return 0.0;
        }
        let mut negatives_below = 0u64;
        let mut area = 0.0;
        for (pos, neg) in self.positives.iter().zip(&self.negatives) {
            area += *pos as f64 * (negatives_below as f64 + *neg as f64 / 2.0);
            negatives_below += neg;
        }
        area / (total_pos as f64 * total_neg as f64)
    }

    pub fn evaluation(&self) -> Evaluation {
        Evaluation {
            loss: self.loss(),
            binary_accuracy: self.binary_accuracy(),
        }
    }

    /// Write `loss`, `binary_accuracy`, `auc`, `precision`, `recall` under `prefix`.
    pub fn write_logs(&self, prefix: &str, logs: &mut MetricLogs) {
        logs.insert(format!("{prefix}loss"), self.loss());
        logs.insert(format!("{prefix}binary_accuracy"), self.binary_accuracy());
        logs.insert(format!("{prefix}auc"), self.auc());
        logs.insert(format!("{prefix}precision"), self.precision());
        logs.insert(format!("{prefix}recall"), self.recall());
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// Threshold probabilities into 0/1 indicator rows.
pub fn binarize(probs: &[Vec<f32>], threshold: f32) -> Vec<Vec<u8>> {
    probs
        .iter()
        .map(|row| row.iter().map(|&p| u8::from(p >= threshold)).collect())
        .collect()
}

/// Fraction of label cells predicted wrongly.
pub fn hamming_loss(y_true: &[Vec<u8>], y_pred: &[Vec<u8>]) -> f64 {
    let mut cells = 0usize;
    let mut wrong = 0usize;
    for (t, p) in y_true.iter().zip(y_pred) {
        cells += t.len();
        wrong += t.iter().zip(p).filter(|(a, b)| a != b).count();
    }
    ratio(wrong as f64, cells as f64)
}

/// Fraction of rows whose full label set is predicted exactly.
pub fn subset_accuracy(y_true: &[Vec<u8>], y_pred: &[Vec<u8>]) -> f64 {
    let exact = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    ratio(exact as f64, y_true.len() as f64)
}

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    tp: u64,
    fp: u64,
    fn_: u64,
}

impl Counts {
    fn entry(self) -> ReportEntry {
        let precision = ratio(self.tp as f64, (self.tp + self.fp) as f64);
        let recall = ratio(self.tp as f64, (self.tp + self.fn_) as f64);
        ReportEntry {
            precision,
            recall,
            f1_score: f1(precision, recall),
            support: self.tp + self.fn_,
        }
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    ratio(2.0 * precision * recall, precision + recall)
}

fn per_label_counts(y_true: &[Vec<u8>], y_pred: &[Vec<u8>], num_classes: usize) -> Vec<Counts> {
    let mut counts = vec![Counts::default(); num_classes];
    for (t, p) in y_true.iter().zip(y_pred) {
        for (c, (&a, &b)) in t.iter().zip(p).enumerate().take(num_classes) {
            match (b > 0, a > 0) {
                (true, true) => counts[c].tp += 1,
                (true, false) => counts[c].fp += 1,
                (false, true) => counts[c].fn_ += 1,
                (false, false) => {}
            }
        }
    }
    counts
}

/// Averaged F1 scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct F1Scores {
    pub macro_avg: f64,
    pub micro_avg: f64,
    pub weighted_avg: f64,
}

pub fn f1_scores(y_true: &[Vec<u8>], y_pred: &[Vec<u8>], num_classes: usize) -> F1Scores {
    let counts = per_label_counts(y_true, y_pred, num_classes);
    let entries: Vec<ReportEntry> = counts.iter().map(|c| c.entry()).collect();
    let support: u64 = entries.iter().map(|e| e.support).sum();
    F1Scores {
        macro_avg: ratio(entries.iter().map(|e| e.f1_score).sum(), entries.len() as f64),
        micro_avg: pool(&counts).entry().f1_score,
        weighted_avg: ratio(
            entries.iter().map(|e| e.f1_score * e.support as f64).sum(),
            support as f64,
        ),
    }
}

fn pool(counts: &[Counts]) -> Counts {
    counts.iter().fold(Counts::default(), |acc, c| Counts {
        tp: acc.tp + c.tp,
        fp: acc.fp + c.fp,
        fn_: acc.fn_ + c.fn_,
    })
}

pub const MICRO_AVG: &str = "micro avg";
pub const MACRO_AVG: &str = "macro avg";
pub const WEIGHTED_AVG: &str = "weighted avg";
pub const SAMPLES_AVG: &str = "samples avg";

/// One entry per class name plus the micro/macro/weighted/samples averages.
/// Zero divisions yield 0.
pub fn classification_report(
    y_true: &[Vec<u8>],
    y_pred: &[Vec<u8>],
    classes: &[String],
) -> BTreeMap<String, ReportEntry> {
    let counts = per_label_counts(y_true, y_pred, classes.len());
    let entries: Vec<ReportEntry> = counts.iter().map(|c| c.entry()).collect();
    let total_support: u64 = entries.iter().map(|e| e.support).sum();

    let mut report = BTreeMap::new();
    for (name, entry) in classes.iter().zip(&entries) {
        report.insert(name.clone(), entry.clone());
    }
    report.insert(MICRO_AVG.to_string(), pool(&counts).entry());

    let n = entries.len() as f64;
    report.insert(
        MACRO_AVG.to_string(),
        ReportEntry {
            precision: ratio(entries.iter().map(|e| e.precision).sum(), n),
            recall: ratio(entries.iter().map(|e| e.recall).sum(), n),
            f1_score: ratio(entries.iter().map(|e| e.f1_score).sum(), n),
            support: total_support,
        },
    );

    let weighted = |f: fn(&ReportEntry) -> f64| {
        ratio(
            entries.iter().map(|e| f(e) * e.support as f64).sum(),
            total_support as f64,
        )
    };
    report.insert(
        WEIGHTED_AVG.to_string(),
        ReportEntry {
            precision: weighted(|e| e.precision),
            recall: weighted(|e| e.recall),
            f1_score: weighted(|e| e.f1_score),
            support: total_support,
        },
    );

    report.insert(SAMPLES_AVG.to_string(), samples_average(y_true, y_pred, total_support));
    report
}

fn samples_average(y_true: &[Vec<u8>], y_pred: &[Vec<u8>], support: u64) -> ReportEntry {
    let (mut precision, mut recall, mut f1_sum) = (0.0, 0.0, 0.0);
    for (t, p) in y_true.iter().zip(y_pred) {
        let tp = t.iter().zip(p).filter(|&(&a, &b)| a > 0 && b > 0).count() as f64;
        let predicted = p.iter().filter(|&&b| b > 0).count() as f64;
        let actual = t.iter().filter(|&&a| a > 0).count() as f64;
        let (row_p, row_r) = (ratio(tp, predicted), ratio(tp, actual));
        precision += row_p;
        recall += row_r;
        f1_sum += f1(row_p, row_r);
    }
    let n = y_true.len() as f64;
    ReportEntry {
        precision: ratio(precision, n),
        recall: ratio(recall, n),
        f1_score: ratio(f1_sum, n),
        support,
    }
}

/// Full held-out metric set from an evaluation and thresholded predictions.
pub fn training_metrics(
    evaluation: Evaluation,
    y_true: &[Vec<u8>],
    y_pred: &[Vec<u8>],
    classes: &[String],
) -> TrainingMetrics {
    let report = classification_report(y_true, y_pred, classes);
    let f1_of = |key: &str| report.get(key).map(|e| e.f1_score).unwrap_or(0.0);
    TrainingMetrics {
        test_loss: evaluation.loss,
        test_accuracy: evaluation.binary_accuracy,
        hamming_loss: hamming_loss(y_true, y_pred),
        subset_accuracy: subset_accuracy(y_true, y_pred),
        f1_macro: f1_of(MACRO_AVG),
        f1_micro: f1_of(MICRO_AVG),
        f1_weighted: f1_of(WEIGHTED_AVG),
        classification_report: report,
        confusion_matrix: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn cross_entropy_is_clipped() {
        assert!(binary_cross_entropy(0.0, 1).is_finite());
        assert!(close(binary_cross_entropy(0.5, 1), std::f64::consts::LN_2));
        assert!(binary_cross_entropy(0.99, 1) < binary_cross_entropy(0.6, 1));
    }

    fn auc_of(probs: &[f32], labels: &[u8]) -> f64 {
        let mut scores = BinaryScores::new();
        scores.update(&[probs.to_vec()], &[labels.to_vec()]);
        scores.auc()
    }

    #[test]
    fn auc_handles_perfect_inverse_and_ties() {
        assert!(close(auc_of(&[0.1, 0.2, 0.8, 0.9], &[0, 0, 1, 1]), 1.0));
        assert!(close(auc_of(&[0.9, 0.1], &[0, 1]), 0.0));
        assert!(close(auc_of(&[0.5, 0.5], &[0, 1]), 0.5));
        assert_eq!(auc_of(&[0.3, 0.7], &[1, 1]), 0.0);
    }

    #[test]
    fn running_scores_track_confusion_counts() {
        let mut scores = BinaryScores::new();
        scores.update(&[vec![0.9, 0.2], vec![0.4, 0.7]], &[vec![1, 0], vec![1, 0]]);
        assert!(close(scores.binary_accuracy(), 0.5));
        assert!(close(scores.precision(), 0.5));
        assert!(close(scores.recall(), 0.5));

        let mut logs = MetricLogs::new();
        scores.write_logs("val_", &mut logs);
        assert_eq!(
            logs.keys().map(String::as_str).collect::<Vec<_>>(),
            ["val_auc", "val_binary_accuracy", "val_loss", "val_precision", "val_recall"]
        );
    }

    #[test]
    fn hamming_and_subset_accuracy() {
        let t = vec![vec![1, 0, 1], vec![0, 1, 0]];
        let p = vec![vec![1, 0, 0], vec![0, 1, 0]];
        assert!(close(hamming_loss(&t, &p), 1.0 / 6.0));
        assert!(close(subset_accuracy(&t, &p), 0.5));
    }

    #[test]
    fn report_has_per_label_and_average_rows() {
        let classes = vec!["a".to_string(), "b".to_string()];
        let t = vec![vec![1, 0], vec![1, 1], vec![0, 1]];
        let p = vec![vec![1, 0], vec![1, 0], vec![0, 0]];
        let report = classification_report(&t, &p, &classes);

        let a = &report["a"];
        assert!(close(a.precision, 1.0) && close(a.recall, 1.0) && a.support == 2);
        let b = &report["b"];
        assert!(close(b.f1_score, 0.0) && b.support == 2);

        assert!(close(report[MACRO_AVG].f1_score, 0.5));
        // micro: tp 2, fp 0, fn 2
        assert!(close(report[MICRO_AVG].f1_score, 2.0 / 3.0));
        assert!(close(report[WEIGHTED_AVG].f1_score, 0.5));
        assert_eq!(report[SAMPLES_AVG].support, 4);
        assert_eq!(report.len(), 6);

        let f1 = f1_scores(&t, &p, 2);
        assert!(close(f1.macro_avg, 0.5));
        assert!(close(f1.micro_avg, 2.0 / 3.0));
    }

    #[test]
    fn training_metrics_combine_evaluation_and_report() {
        let classes = vec!["x".to_string()];
        let t = vec![vec![1], vec![0]];
        let p = binarize(&[vec![0.8], vec![0.3]], 0.5);
        let metrics = training_metrics(
            Evaluation { loss: 0.37, binary_accuracy: 1.0 },
            &t,
            &p,
            &classes,
        );
        assert_eq!(metrics.test_loss, 0.37);
        assert!(close(metrics.subset_accuracy, 1.0));
        assert!(close(metrics.f1_micro, 1.0));
        assert!(metrics.confusion_matrix.is_none());
    }
}
