use features::FeatureVector;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::{info, warn};

use crate::{LabelEncoder, LabeledDataset, TrainingError};

pub const SPLIT_SEED: u64 = 42;

/// How a train/test split was produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitStrategy {
    /// Class proportions preserved; `test_fraction` is the fraction actually
    /// requested after clamping.
    Stratified { test_fraction: f64 },
    /// Some class had fewer than two samples, so labels were ignored.
    Random,
}

/// A dataset with encoded labels and a disjoint train/test partition.
#[derive(Debug, Clone)]
pub struct EncodedDataset {
    pub encoder: LabelEncoder,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub train_features: Vec<FeatureVector>,
    pub train_labels: Vec<usize>,
    pub test_features: Vec<FeatureVector>,
    pub test_labels: Vec<usize>,
    pub strategy: SplitStrategy,
}

impl EncodedDataset {
    pub fn is_stratified(&self) -> bool {
        matches!(self.strategy, SplitStrategy::Stratified { .. })
    }

    pub fn len(&self) -> usize {
        self.train_indices.len() + self.test_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Splits `dataset` into train and test sets with a fixed seed.
///
/// Stratifies whenever every class has at least two samples, raising
/// `test_fraction` to `n_classes / n_samples` so each class lands in the
/// test set at least once. Otherwise falls back to a plain shuffled split
/// and reports it through [`EncodedDataset::strategy`].
pub fn partition(
    dataset: &LabeledDataset,
    test_fraction: f64,
) -> Result<EncodedDataset, TrainingError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(TrainingError::InvalidInput(format!(
            "test fraction must be in (0, 1), got {test_fraction}"
        )));
    }
    if dataset.len() < 2 {
        return Err(TrainingError::InvalidInput(format!(
            "need at least 2 samples to split, got {}",
            dataset.len()
        )));
    }

    let encoder = LabelEncoder::fit(dataset.labels());
    let codes = dataset
        .labels()
        .iter()
        .map(|l| encoder.encode(l))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| TrainingError::InvalidInput("label missing from encoder".into()))?;

    let mut by_class = vec![Vec::new(); encoder.n_classes()];
    for (index, &code) in codes.iter().enumerate() {
        by_class[code].push(index);
    }
    let min_class_count = by_class.iter().map(Vec::len).min().unwrap_or(0);

    let n = dataset.len();
    let mut rng = StdRng::seed_from_u64(SPLIT_SEED);
    let (train_indices, test_indices, strategy) = if min_class_count < 2 {
        warn!(
            min_class_count,
            "not enough samples per class for stratified split, using random split"
        );
        let n_test = test_count(test_fraction, n).clamp(1, n - 1);
        let mut order = (0..n).collect::<Vec<_>>();
        order.shuffle(&mut rng);
        let train = order.split_off(n_test);
        (train, order, SplitStrategy::Random)
    } else {
        let min_fraction = encoder.n_classes() as f64 / n as f64;
        let actual_fraction = test_fraction.max(min_fraction);
        let counts = by_class.iter().map(Vec::len).collect::<Vec<_>>();
        let allocation = allocate_test_counts(&counts, test_count(actual_fraction, n));

        let mut train = Vec::new();
        let mut test = Vec::new();
        for (members, n_test) in by_class.iter_mut().zip(allocation) {
            members.shuffle(&mut rng);
            test.extend_from_slice(&members[..n_test]);
            train.extend_from_slice(&members[n_test..]);
        }
        train.shuffle(&mut rng);
        test.shuffle(&mut rng);
        (
            train,
            test,
            SplitStrategy::Stratified {
                test_fraction: actual_fraction,
            },
        )
    };

    let gather = |indices: &[usize]| {
        (
            indices
                .iter()
                .map(|&i| dataset.features()[i])
                .collect::<Vec<_>>(),
            indices.iter().map(|&i| codes[i]).collect::<Vec<_>>(),
        )
    };
    let (train_features, train_labels) = gather(&train_indices);
    let (test_features, test_labels) = gather(&test_indices);

    info!(
        n_train = train_indices.len(),
        n_test = test_indices.len(),
        "data split"
    );
    info!(classes = ?encoder.classes(), ?strategy, "resolved classes");

    Ok(EncodedDataset {
        encoder,
        train_indices,
        test_indices,
        train_features,
        train_labels,
        test_features,
        test_labels,
        strategy,
    })
}

/// `ceil(fraction * n)`, tolerant of float noise such as `0.3 * 30`.
fn test_count(fraction: f64, n: usize) -> usize {
    (fraction * n as f64 - 1e-9).ceil().max(0.0) as usize
}

/// Splits `n_test` across classes proportionally to `counts`, handing out
/// the rounding remainder by largest fractional part. Every class keeps at
/// least one sample on each side of the split.
fn allocate_test_counts(counts: &[usize], n_test: usize) -> Vec<usize> {
    let total = counts.iter().sum::<usize>();
    let k = counts.len();
    let n_test = n_test.clamp(k, total.saturating_sub(k).max(k));

    let ideal = counts
        .iter()
        .map(|&c| n_test as f64 * c as f64 / total as f64)
        .collect::<Vec<_>>();
    let mut alloc = counts
        .iter()
        .zip(&ideal)
        .map(|(&c, &x)| (x.floor() as usize).clamp(1, c - 1))
        .collect::<Vec<_>>();

    loop {
        let assigned = alloc.iter().sum::<usize>();
        let remainder = |i: usize| ideal[i] - alloc[i] as f64;
        let candidate = if assigned < n_test {
            (0..k)
                .filter(|&i| alloc[i] + 1 < counts[i])
                .max_by(|&a, &b| remainder(a).total_cmp(&remainder(b)).then(b.cmp(&a)))
                .map(|i| (i, true))
        } else if assigned > n_test {
            (0..k)
                .filter(|&i| alloc[i] > 1)
                .min_by(|&a, &b| remainder(a).total_cmp(&remainder(b)).then(a.cmp(&b)))
                .map(|i| (i, false))
        } else {
            None
        };

        match candidate {
            Some((i, true)) => alloc[i] += 1,
            Some((i, false)) => alloc[i] -= 1,
            None => break,
        }
    }
    alloc
}
