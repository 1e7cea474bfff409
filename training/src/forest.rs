//! Random forest of CART trees with Gini impurity and bootstrap sampling.

use features::FeatureVector;
use rand::{rngs::StdRng, seq::index::sample, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::TrainingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
    Leaf {
        distribution: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn predict_proba(&self, x: &[f32]) -> &[f64] {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => at = if x[*feature] <= *threshold { *left } else { *right },
                Node::Leaf { distribution } => return distribution,
            }
        }
    }
}

struct TreeBuilder<'a> {
    features: &'a [FeatureVector],
    labels: &'a [usize],
    n_classes: usize,
    max_depth: usize,
    max_features: usize,
    rng: StdRng,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    fn class_counts(&self, indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &i in indices {
            counts[self.labels[i]] += 1;
        }
        counts
    }

    fn leaf(&mut self, counts: &[usize]) -> usize {
        let total = counts.iter().sum::<usize>().max(1) as f64;
        self.nodes.push(Node::Leaf {
            distribution: counts.iter().map(|&c| c as f64 / total).collect(),
        });
        self.nodes.len() - 1
    }

    fn grow(&mut self, indices: &mut [usize], depth: usize) -> usize {
        let counts = self.class_counts(indices);
        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        if pure || depth >= self.max_depth || indices.len() < 2 {
            return self.leaf(&counts);
        }

        let Some((feature, threshold)) = self.best_split(indices, &counts) else {
            return self.leaf(&counts);
        };

        let mut boundary = 0;
        for i in 0..indices.len() {
            if self.features[indices[i]].0[feature] <= threshold {
                indices.swap(i, boundary);
                boundary += 1;
            }
        }

        let at = self.nodes.len();
        self.nodes.push(Node::Split {
            feature,
            threshold,
            left: 0,
            right: 0,
        });
        let (lo, hi) = indices.split_at_mut(boundary);
        let left = self.grow(lo, depth + 1);
        let right = self.grow(hi, depth + 1);
        if let Node::Split {
            left: l, right: r, ..
        } = &mut self.nodes[at]
        {
            *l = left;
            *r = right;
        }
        at
    }

    /// Lowest weighted Gini split over a random subset of features, or
    /// `None` when no candidate separates the samples.
    fn best_split(&mut self, indices: &[usize], counts: &[usize]) -> Option<(usize, f32)> {
        let n_features = features::N_FEATURES;
        let candidates = sample(&mut self.rng, n_features, self.max_features);
        let n = indices.len();
        let parent = gini(counts, n);

        let mut best: Option<(f64, usize, f32)> = None;
        let mut sorted = indices.to_vec();
        for feature in candidates.iter() {
            let value = |i: usize| self.features[i].0[feature];
            sorted.sort_by(|&a, &b| value(a).total_cmp(&value(b)));

            let mut left = vec![0; self.n_classes];
            let mut right = counts.to_vec();
            for pos in 1..n {
                let moved = self.labels[sorted[pos - 1]];
                left[moved] += 1;
                right[moved] -= 1;

                let (prev, next) = (value(sorted[pos - 1]), value(sorted[pos]));
                if prev >= next {
                    continue;
                }
                let impurity = (pos as f64 * gini(&left, pos)
                    + (n - pos) as f64 * gini(&right, n - pos))
                    / n as f64;
                if impurity < parent - 1e-12 && best.map_or(true, |(b, _, _)| impurity < b) {
                    let mut threshold = prev + (next - prev) / 2.0;
                    if threshold >= next {
                        threshold = prev;
                    }
                    best = Some((impurity, feature, threshold));
                }
            }
        }
        best.map(|(_, feature, threshold)| (feature, threshold))
    }
}

fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts
        .iter()
        .map(|&c| (c as f64 / n).powi(2))
        .sum::<f64>()
}

/// Bagged ensemble of decision trees. Class probabilities are the mean of
/// the per-tree leaf distributions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_classes: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    #[instrument(skip(features, labels), fields(n_samples = features.len()), level = "trace")]
    pub fn fit(
        params: ForestParams,
        features: &[FeatureVector],
        labels: &[usize],
    ) -> Result<Self, TrainingError> {
        if features.is_empty() {
            return Err(TrainingError::InvalidInput("cannot fit on zero samples".into()));
        }
        if features.len() != labels.len() {
            return Err(TrainingError::InvalidInput(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        if params.n_estimators == 0 {
            return Err(TrainingError::InvalidInput("n_estimators must be positive".into()));
        }

        let n_classes = labels.iter().max().map_or(0, |m| m + 1);
        let max_features = ((features::N_FEATURES as f64).sqrt() as usize).max(1);
        let mut seeds = StdRng::seed_from_u64(params.seed);

        let trees = (0..params.n_estimators)
            .map(|_| {
                let mut rng = StdRng::seed_from_u64(seeds.gen());
                let mut bootstrap = (0..features.len())
                    .map(|_| rng.gen_range(0..features.len()))
                    .collect::<Vec<_>>();
                let mut builder = TreeBuilder {
                    features,
                    labels,
                    n_classes,
                    max_depth: params.max_depth,
                    max_features,
                    rng,
                    nodes: Vec::new(),
                };
                builder.grow(&mut bootstrap, 0);
                DecisionTree {
                    nodes: builder.nodes,
                }
            })
            .collect::<Vec<_>>();

        debug!(
            n_trees = trees.len(),
            n_nodes = trees.iter().map(|t| t.nodes.len()).sum::<usize>(),
            "grew forest"
        );
        Ok(Self {
            params,
            n_classes,
            trees,
        })
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn predict_proba(&self, x: &FeatureVector) -> Vec<f64> {
        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (acc, p) in proba.iter_mut().zip(tree.predict_proba(x.as_slice())) {
                *acc += p;
            }
        }
        let n_trees = self.trees.len().max(1) as f64;
        proba.iter_mut().for_each(|p| *p /= n_trees);
        proba
    }

    /// Most probable class; ties go to the lowest class index.
    pub fn predict(&self, x: &FeatureVector) -> usize {
        argmax(&self.predict_proba(x)).0
    }

    pub fn predict_many(&self, xs: &[FeatureVector]) -> Vec<usize> {
        xs.iter().map(|x| self.predict(x)).collect()
    }
}

pub(crate) fn argmax(values: &[f64]) -> (usize, f64) {
    values
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        })
}
