pub mod tree;

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::{ModelError, ModelResult};
pub use tree::DecisionTree;

/// Hyper-parameters of the regression forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means all of them.
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 500,
            max_depth: 20,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
        }
    }
}

impl ForestParams {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.n_trees == 0 {
            errors.push("n_trees must be > 0".to_string());
        }
        if self.max_depth == 0 {
            errors.push("max_depth must be > 0".to_string());
        }
        if self.min_samples_split < 2 {
            errors.push("min_samples_split must be >= 2".to_string());
        }
        if self.min_samples_leaf == 0 {
            errors.push("min_samples_leaf must be > 0".to_string());
        }
        if self.max_features == Some(0) {
            errors.push("max_features must be > 0 when set".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Per-tree seed, independent of the order in which worker threads pick up trees.
    fn tree_seed(&self, tree_index: usize) -> u64 {
        self.seed
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(tree_index as u64)
    }
}

/// Bootstrap-aggregated ensemble of CART regression trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    params: ForestParams,
    n_features: usize,
    trees: Vec<DecisionTree>,
    importance: Vec<f64>,
}

impl RandomForestRegressor {
    pub fn fit(
        records: ArrayView2<f64>,
        targets: ArrayView1<f64>,
        params: &ForestParams,
    ) -> ModelResult<Self> {
        params
            .validate()
            .map_err(|errors| ModelError::InvalidParams(errors.join(", ")))?;

        let n = records.nrows();
        let n_features = records.ncols();
        if n == 0 {
            return Err(ModelError::EmptyDataset);
        }
        if targets.len() != n {
            return Err(ModelError::InvalidParams(format!(
                "{} records but {} targets",
                n,
                targets.len()
            )));
        }

        info!(
            "Fitting random forest: {} trees, max_depth={}, {} samples x {} features, seed={}",
            params.n_trees, params.max_depth, n, n_features, params.seed
        );

        let trees: Vec<DecisionTree> = (0..params.n_trees)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(params.tree_seed(i));
                let mut sample: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
                DecisionTree::fit(records, targets, &mut sample, params, &mut rng)
            })
            .collect();

        let importance = aggregate_importance(&trees, n_features);
        let avg_nodes = trees.iter().map(|t| t.node_count()).sum::<usize>() as f64 / trees.len() as f64;
        debug!("Forest fitted: avg {:.0} nodes per tree", avg_nodes);

        Ok(Self {
            params: params.clone(),
            n_features,
            trees,
            importance,
        })
    }

    /// Mean of the tree predictions, summed in tree order.
    pub fn predict(&self, row: &[f64]) -> f64 {
        let total: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        total / self.trees.len() as f64
    }

    pub fn predict_batch(&self, records: ArrayView2<f64>) -> Array1<f64> {
        records
            .axis_iter(Axis(0))
            .map(|row| match row.as_slice() {
                Some(slice) => self.predict(slice),
                None => self.predict(&row.to_vec()),
            })
            .collect()
    }

    pub fn feature_importance(&self) -> &[f64] {
        &self.importance
    }

    /// Check a deserialized forest before it is used for prediction.
    pub fn validate(&self) -> ModelResult<()> {
        if self.n_features == 0 {
            return Err(ModelError::InvalidModel("forest has no features".to_string()));
        }
        if self.trees.is_empty() {
            return Err(ModelError::InvalidModel("forest has no trees".to_string()));
        }
        if self.importance.len() != self.n_features {
            return Err(ModelError::InvalidModel(format!(
                "importance has {} entries for {} features",
                self.importance.len(),
                self.n_features
            )));
        }
        let total: f64 = self.importance.iter().sum();
        if self.importance.iter().any(|v| !(0.0..=1.0).contains(v)) || (total - 1.0).abs() > 1e-6 {
            return Err(ModelError::InvalidModel(format!(
                "importance is not a distribution (sum {})",
                total
            )));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|e| ModelError::InvalidModel(format!("tree {}: {}", i, e)))?;
        }
        Ok(())
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }
}

/// Average the normalized per-tree importances over trees that split at least once.
/// A forest of single-leaf trees (constant target) reports uniform importance.
fn aggregate_importance(trees: &[DecisionTree], n_features: usize) -> Vec<f64> {
    let mut sum = vec![0.0; n_features];
    let mut contributing = 0usize;
    for tree in trees.iter().filter(|t| t.has_splits()) {
        for (acc, v) in sum.iter_mut().zip(tree.importance()) {
            *acc += v;
        }
        contributing += 1;
    }

    let total: f64 = sum.iter().sum();
    if contributing == 0 || total <= 0.0 {
        return vec![1.0 / n_features as f64; n_features];
    }
    sum.iter().map(|v| v / total).collect()
}
