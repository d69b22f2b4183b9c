use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::ForestParams;

/// Relative improvement below which a split is not worth making.
const MIN_RELATIVE_GAIN: f64 = 1e-10;

/// Arena-allocated node; children are indices into `DecisionTree::nodes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// CART regression tree using the squared-error criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    /// Impurity decrease per feature, normalized to sum 1 (all zero when the tree never split)
    importance: Vec<f64>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    children_sse: f64,
}

struct TreeBuilder<'a> {
    records: ArrayView2<'a, f64>,
    targets: ArrayView1<'a, f64>,
    params: &'a ForestParams,
    nodes: Vec<Node>,
    decrease: Vec<f64>,
}

impl DecisionTree {
    /// Grow a tree over the rows listed in `sample` (duplicates allowed, as in a bootstrap draw).
    pub fn fit(
        records: ArrayView2<f64>,
        targets: ArrayView1<f64>,
        sample: &mut [usize],
        params: &ForestParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut builder = TreeBuilder {
            records: records.view(),
            targets: targets.view(),
            params,
            nodes: Vec::new(),
            decrease: vec![0.0; records.ncols()],
        };
        builder.grow(sample, 0, rng);

        let total: f64 = builder.decrease.iter().sum();
        let importance = if total > 0.0 {
            builder.decrease.iter().map(|d| d / total).collect()
        } else {
            builder.decrease
        };

        Self {
            nodes: builder.nodes,
            importance,
        }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf(value) => return *value,
                Node::Split { feature, threshold, left, right } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn importance(&self) -> &[f64] {
        &self.importance
    }

    /// True when the tree made at least one split.
    pub fn has_splits(&self) -> bool {
        self.nodes.len() > 1
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Structural check for a tree read back from disk. Children must come
    /// after their parent and splits may only use known features.
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        if self.importance.len() != n_features {
            return Err(format!(
                "tree importance has {} entries, expected {}",
                self.importance.len(),
                n_features
            ));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf(value) if !value.is_finite() => {
                    return Err(format!("node {} has non-finite leaf value", idx));
                }
                Node::Leaf(_) => {}
                Node::Split { feature, threshold, left, right } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "node {} splits on feature {} of {}",
                            idx, feature, n_features
                        ));
                    }
                    if threshold.is_nan() {
                        return Err(format!("node {} has NaN threshold", idx));
                    }
                    for child in [left, right] {
                        if *child <= idx || *child >= self.nodes.len() {
                            return Err(format!("node {} has invalid child index {}", idx, child));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf(_) => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

impl<'a> TreeBuilder<'a> {
    fn grow(&mut self, sample: &mut [usize], depth: usize, rng: &mut StdRng) -> usize {
        let node_idx = self.nodes.len();
        let n = sample.len();
        let mean = sample.iter().map(|&i| self.targets[i]).sum::<f64>() / n as f64;
        self.nodes.push(Node::Leaf(mean));

        if depth >= self.params.max_depth || n < self.params.min_samples_split {
            return node_idx;
        }

        let sse: f64 = sample
            .iter()
            .map(|&i| (self.targets[i] - mean).powi(2))
            .sum();
        if sse <= 0.0 {
            return node_idx;
        }

        let Some(best) = self.best_split(sample, mean, rng) else {
            return node_idx;
        };
        let gain = sse - best.children_sse;
        if gain <= MIN_RELATIVE_GAIN * sse.max(1.0) {
            return node_idx;
        }

        // Partition in place: rows going left end up in sample[..mid]
        let mut mid = 0;
        for k in 0..n {
            if self.records[[sample[k], best.feature]] <= best.threshold {
                sample.swap(mid, k);
                mid += 1;
            }
        }
        if mid == 0 || mid == n {
            return node_idx;
        }

        self.decrease[best.feature] += gain;

        let (left_rows, right_rows) = sample.split_at_mut(mid);
        let left = self.grow(left_rows, depth + 1, rng);
        let right = self.grow(right_rows, depth + 1, rng);
        self.nodes[node_idx] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        node_idx
    }

    fn candidate_features(&self, rng: &mut StdRng) -> Vec<usize> {
        let n_features = self.records.ncols();
        match self.params.max_features {
            Some(k) if k < n_features => {
                let mut picked = rand::seq::index::sample(rng, n_features, k).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..n_features).collect(),
        }
    }

    /// Exhaustive search over midpoints of consecutive distinct values.
    /// Targets are centred on the node mean so the running sums stay small.
    fn best_split(&self, sample: &[usize], mean: f64, rng: &mut StdRng) -> Option<SplitCandidate> {
        let n = sample.len();
        let min_leaf = self.params.min_samples_leaf;
        let mut best: Option<SplitCandidate> = None;
        let mut column: Vec<(f64, f64)> = Vec::with_capacity(n);

        for feature in self.candidate_features(rng) {
            column.clear();
            column.extend(
                sample
                    .iter()
                    .map(|&i| (self.records[[i, feature]], self.targets[i] - mean)),
            );
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let total_sum: f64 = column.iter().map(|(_, y)| y).sum();
            let total_sq: f64 = column.iter().map(|(_, y)| y * y).sum();

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for k in 0..n - 1 {
                let (x, y) = column[k];
                left_sum += y;
                left_sq += y * y;

                let next_x = column[k + 1].0;
                if x == next_x {
                    continue;
                }
                let n_left = k + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let left_sse = (left_sq - left_sum * left_sum / n_left as f64).max(0.0);
                let right_sse = (right_sq - right_sum * right_sum / n_right as f64).max(0.0);
                let children_sse = left_sse + right_sse;

                if best.as_ref().map_or(true, |b| children_sse < b.children_sse) {
                    let mut threshold = x + (next_x - x) / 2.0;
                    if threshold >= next_x {
                        threshold = x;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        children_sse,
                    });
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1, Array2};
    use rand::SeedableRng;

    fn params(max_depth: usize) -> ForestParams {
        ForestParams {
            n_trees: 1,
            max_depth,
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_step_function_single_split() {
        let x: Array2<f64> = array![[0.0], [1.0], [2.0], [3.0], [10.0], [11.0], [12.0], [13.0]];
        let y: Array1<f64> = array![5.0, 5.0, 5.0, 5.0, 50.0, 50.0, 50.0, 50.0];
        let mut sample: Vec<usize> = (0..8).collect();
        let mut rng = StdRng::seed_from_u64(1);

        let tree = DecisionTree::fit(x.view(), y.view(), &mut sample, &params(20), &mut rng);

        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict(&[1.5]), 5.0);
        assert_eq!(tree.predict(&[11.5]), 50.0);
        // Threshold sits halfway between 3 and 10
        assert_eq!(tree.predict(&[6.5]), 5.0);
        assert_eq!(tree.predict(&[6.6]), 50.0);
        assert_eq!(tree.importance(), &[1.0]);
    }

    #[test]
    fn test_fit_takes_views_of_different_lifetimes() {
        let x: Array2<f64> = array![[0.0], [1.0], [10.0], [11.0]];
        let tree = {
            let y: Array1<f64> = array![1.0, 1.0, 9.0, 9.0];
            let p = params(4);
            let mut sample = vec![0, 1, 2, 3];
            let mut rng = StdRng::seed_from_u64(3);
            DecisionTree::fit(x.view(), y.view(), &mut sample, &p, &mut rng)
        };
        assert_eq!(tree.predict(&[0.5]), 1.0);
        assert_eq!(tree.predict(&[10.5]), 9.0);
        assert!(tree.validate(1).is_ok());
    }

    #[test]
    fn test_validate_rejects_broken_structure() {
        let split = |feature, left, right| Node::Split {
            feature,
            threshold: 0.5,
            left,
            right,
        };
        let tree = |nodes| DecisionTree {
            nodes,
            importance: vec![1.0, 0.0],
        };

        assert!(tree(vec![split(0, 1, 2), Node::Leaf(1.0), Node::Leaf(2.0)]).validate(2).is_ok());
        assert!(tree(vec![split(9, 1, 2), Node::Leaf(1.0), Node::Leaf(2.0)]).validate(2).is_err());
        assert!(tree(vec![split(0, 1, 7), Node::Leaf(1.0), Node::Leaf(2.0)]).validate(2).is_err());
        assert!(tree(vec![split(0, 0, 2), Node::Leaf(1.0), Node::Leaf(2.0)]).validate(2).is_err());
        assert!(tree(vec![Node::Leaf(f64::NAN)]).validate(2).is_err());
        assert!(tree(vec![]).validate(2).is_err());
        assert!(tree(vec![Node::Leaf(1.0)]).validate(3).is_err());
    }

    #[test]
    fn test_constant_target_is_single_leaf() {
        let x: Array2<f64> = array![[0.0, 3.0], [1.0, 2.0], [2.0, 1.0]];
        let y: Array1<f64> = array![500.0, 500.0, 500.0];
        let mut sample = vec![0, 1, 2];
        let mut rng = StdRng::seed_from_u64(1);

        let tree = DecisionTree::fit(x.view(), y.view(), &mut sample, &params(20), &mut rng);

        assert!(!tree.has_splits());
        assert_eq!(tree.predict(&[7.0, 7.0]), 500.0);
        assert_eq!(tree.importance(), &[0.0, 0.0]);
    }

    #[test]
    fn test_max_depth_is_respected() {
        let n = 64;
        let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(n, |i| (i * i) as f64);
        let mut sample: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(1);

        let tree = DecisionTree::fit(x.view(), y.view(), &mut sample, &params(3), &mut rng);

        assert_eq!(tree.depth(), 3);
        assert!(tree.node_count() <= 15);
    }

    #[test]
    fn test_irrelevant_feature_gets_no_importance() {
        // Feature 1 is constant, so every split must use feature 0
        let n = 32;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { i as f64 } else { 7.0 });
        let y = Array1::from_shape_fn(n, |i| if i < 16 { 0.0 } else { 100.0 });
        let mut sample: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(1);

        let tree = DecisionTree::fit(x.view(), y.view(), &mut sample, &params(20), &mut rng);

        assert_eq!(tree.importance(), &[1.0, 0.0]);
    }
}
