use std::fmt;

/// Fraction of positions where `predicted` matches `truth`.
pub fn accuracy(truth: &[usize], predicted: &[usize]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let hits = truth
        .iter()
        .zip(predicted)
        .filter(|(t, p)| t == p)
        .count();
    hits as f64 / truth.len() as f64
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class precision, recall and F1 with macro and weighted averages.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    /// `labels[i]` names class `i`. Undefined ratios (no predictions or no
    /// support) count as 0.
    pub fn new(truth: &[usize], predicted: &[usize], labels: &[String]) -> Self {
        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

        let classes = labels
            .iter()
            .enumerate()
            .map(|(class, label)| {
                let tp = truth
                    .iter()
                    .zip(predicted)
                    .filter(|(t, p)| **t == class && **p == class)
                    .count();
                let predicted_n = predicted.iter().filter(|p| **p == class).count();
                let support = truth.iter().filter(|t| **t == class).count();
                let precision = ratio(tp, predicted_n);
                let recall = ratio(tp, support);
                let f1 = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                ClassMetrics {
                    label: label.clone(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect::<Vec<_>>();

        let unit = vec![1.0; classes.len()];
        let by_support = classes.iter().map(|c| c.support as f64).collect::<Vec<_>>();
        let macro_avg = weighted_average("macro avg", &classes, &unit);
        let weighted_avg = weighted_average("weighted avg", &classes, &by_support);

        Self {
            classes,
            accuracy: accuracy(truth, predicted),
            macro_avg,
            weighted_avg,
        }
    }
}

fn weighted_average(label: &str, classes: &[ClassMetrics], weights: &[f64]) -> ClassMetrics {
    let norm = weights.iter().sum::<f64>();
    let avg = |metric: fn(&ClassMetrics) -> f64| {
        if norm == 0.0 {
            return 0.0;
        }
        classes
            .iter()
            .zip(weights)
            .map(|(c, w)| metric(c) * w)
            .sum::<f64>()
            / norm
    };
    ClassMetrics {
        label: label.to_string(),
        precision: avg(|c| c.precision),
        recall: avg(|c| c.recall),
        f1: avg(|c| c.f1),
        support: classes.iter().map(|c| c.support).sum(),
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, m: &ClassMetrics, width: usize) -> fmt::Result {
    writeln!(
        f,
        "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
        m.label, m.precision, m.recall, m.f1, m.support
    )
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.label.len())
            .chain([self.weighted_avg.label.len()])
            .max()
            .unwrap_or(0);
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for class in &self.classes {
            write_row(f, class, width)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        write_row(f, &self.macro_avg, width)?;
        write_row(f, &self.weighted_avg, width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["neg".into(), "pos".into()]
    }

    #[test]
    fn accuracy_counts_exact_matches() {
        assert_eq!(accuracy(&[0, 1, 1, 0], &[0, 1, 0, 0]), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn per_class_scores() {
        let report = ClassificationReport::new(&[0, 0, 1, 1], &[0, 1, 1, 1], &labels());
        let neg = &report.classes[0];
        assert_eq!((neg.precision, neg.recall, neg.support), (1.0, 0.5, 2));
        let pos = &report.classes[1];
        assert!((pos.precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(pos.recall, 1.0);
        assert_eq!(report.accuracy, 0.75);
        assert_eq!(report.macro_avg.support, 4);
    }

    #[test]
    fn class_never_predicted_scores_zero() {
        let report = ClassificationReport::new(&[0, 1], &[0, 0], &labels());
        assert_eq!(report.classes[1].precision, 0.0);
        assert_eq!(report.classes[1].f1, 0.0);
    }

    #[test]
    fn renders_a_table() {
        let report = ClassificationReport::new(&[0, 1], &[0, 1], &labels());
        let text = report.to_string();
        assert!(text.contains("precision"));
        assert!(text.contains("weighted avg"));
        assert!(text.lines().any(|l| l.trim_start().starts_with("pos")));
    }
}
