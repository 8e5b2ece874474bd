//! Isolation forest over a dense feature matrix.

use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone)]
enum Node {
    Internal {
        feature: usize,
        split: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

/// Average path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone)]
struct Tree {
    root: Node,
}

impl Tree {
    fn grow(data: &[Vec<f64>], idx: &[usize], depth: usize, limit: usize, rng: &mut StdRng) -> Node {
        if depth >= limit || idx.len() <= 1 {
            return Node::Leaf { size: idx.len() };
        }

        let n_features = data[idx[0]].len();
        // (feature, min, span) for every feature that still varies in this node.
        // A span that overflows f64 cannot be sampled and is left unsplit.
        let candidates: Vec<(usize, f64, f64)> = (0..n_features)
            .filter_map(|f| {
                let (lo, hi) = idx.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    (lo.min(data[i][f]), hi.max(data[i][f]))
                });
                let span = hi - lo;
                (span.is_finite() && span > 0.0).then_some((f, lo, span))
            })
            .collect();

        if candidates.is_empty() {
            return Node::Leaf { size: idx.len() };
        }

        let (feature, lo, span) = candidates[rng.gen_range(0..candidates.len())];
        let split = lo + rng.gen::<f64>() * span;
        let (left, right): (Vec<usize>, Vec<usize>) =
            idx.iter().partition(|&&i| data[i][feature] < split);

        Node::Internal {
            feature,
            split,
            left: Box::new(Self::grow(data, &left, depth + 1, limit, rng)),
            right: Box::new(Self::grow(data, &right, depth + 1, limit, rng)),
        }
    }

    fn path_length(&self, x: &[f64]) -> f64 {
        let mut node = &self.root;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Internal {
                    feature,
                    split,
                    left,
                    right,
                } => {
                    node = if x[*feature] < *split { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// A fitted isolation forest. Only lives for one scoring call.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<Tree>,
    sample_size: usize,
}

impl IsolationForest {
    /// Fit `n_trees` trees, each on `min(max_samples, n)` rows drawn without
    /// replacement. Callers must pass at least one row.
    ///
    /// `cancel` is checked between trees; once it is set the fit stops and
    /// returns `None`.
    pub fn fit(
        data: &[Vec<f64>],
        n_trees: usize,
        max_samples: usize,
        seed: u64,
        cancel: &AtomicBool,
    ) -> Option<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let sample_size = max_samples.min(data.len()).max(1);
        let limit = (sample_size as f64).log2().ceil().max(1.0) as usize;

        let mut trees = Vec::new();
        for _ in 0..n_trees.max(1) {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            let idx = sample(&mut rng, data.len(), sample_size).into_vec();
            trees.push(Tree {
                root: Tree::grow(data, &idx, 0, limit, &mut rng),
            });
        }

        Some(Self { trees, sample_size })
    }

    /// Anomaly score in (0, 1]; higher is more isolated.
    pub fn score(&self, x: &[f64]) -> f64 {
        let mean_path =
            self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64;
        let c = average_path_length(self.sample_size);
        if c <= 0.0 {
            return 0.5;
        }
        2f64.powf(-mean_path / c)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

/// Linear-interpolated percentile, `q` in [0, 100].
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}
