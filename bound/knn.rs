//! k-nearest-neighbour probability bound.
//!
//! Each point's posterior is a Beta-Bernoulli estimate built from the labels
//! of its observed neighbours:
//!
//! ```text
//! alpha_i = alpha0 + Σ_{j ∈ train, y_j = +} w_ij + k * max_j w_ij
//! beta_i  = beta0  + Σ_{j ∈ train, y_j = −} w_ij
//! ```
//!
//! The `k * max_j w_ij` term is the most that `k` unseen positives could add
//! to a point's evidence, whichever points they land on. The returned bound is
//! the largest `alpha_i / (alpha_i + beta_i)` over the candidates, which grows
//! with `k` as the lookahead recursion requires.

use crate::oracle::{OracleError, ProbabilityBound};
use crate::types::{Dataset, SearchContext};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum KnnError {
    #[error("Neighbour count must be between 1 and {max} for {points} points, got {k}.")]
    InvalidNeighbourCount { k: usize, max: usize, points: usize },
    #[error("Pseudocounts must be finite and positive, got ({0}, {1}).")]
    InvalidPseudocount(f64, f64),
    #[error("Neighbour weights must be square, got {rows} x {cols}.")]
    NonSquareWeights { rows: usize, cols: usize },
    #[error("Neighbour weight at ({row}, {col}) must be finite and non-negative, got {value}.")]
    InvalidWeight { row: usize, col: usize, value: f64 },
    #[error("Neighbour weights cover {expected} points but the search dataset has {found}.")]
    DatasetMismatch { expected: usize, found: usize },
}

#[derive(Debug, Clone)]
pub struct KnnProbabilityBound {
    /// `weights[[i, j]]` is the influence of point `j`'s label on point `i`.
    weights: Array2<f64>,
    max_weights: Array1<f64>,
    pseudocounts: (f64, f64),
}

impl KnnProbabilityBound {
    /// Connects every point to its `k` nearest neighbours (Euclidean distance,
    /// ties broken by index) with unit weight.
    pub fn new(dataset: &Dataset, k: usize, pseudocounts: (f64, f64)) -> Result<Self, KnnError> {
        let n = dataset.len();
        if k == 0 || k >= n {
            return Err(KnnError::InvalidNeighbourCount {
                k,
                max: n.saturating_sub(1),
                points: n,
            });
        }

        let neighbours: Vec<Vec<usize>> = (0..n)
            .into_par_iter()
            .map(|i| nearest_neighbours(dataset, i, k))
            .collect();

        let mut weights = Array2::zeros((n, n));
        for (i, row) in neighbours.iter().enumerate() {
            for &j in row {
                weights[[i, j]] = 1.0;
            }
        }
        log::debug!("Built {k}-nearest-neighbour weights for {n} points");

        Self::from_weights(weights, pseudocounts)
    }

    /// Uses caller-supplied weights, e.g. a kernel similarity. The matrix must
    /// be square with finite, non-negative entries.
    pub fn from_weights(weights: Array2<f64>, pseudocounts: (f64, f64)) -> Result<Self, KnnError> {
        let (alpha0, beta0) = pseudocounts;
        if !(alpha0.is_finite() && beta0.is_finite() && alpha0 > 0.0 && beta0 > 0.0) {
            return Err(KnnError::InvalidPseudocount(alpha0, beta0));
        }
        let (rows, cols) = weights.dim();
        if rows != cols {
            return Err(KnnError::NonSquareWeights { rows, cols });
        }
        if let Some(((row, col), &value)) = weights
            .indexed_iter()
            .find(|(_, w)| !(w.is_finite() && **w >= 0.0))
        {
            return Err(KnnError::InvalidWeight { row, col, value });
        }
        let max_weights = weights.map_axis(Axis(1), |row| row.fold(0.0_f64, |acc, &w| acc.max(w)));
        Ok(Self {
            weights,
            max_weights,
            pseudocounts,
        })
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    fn posterior_bound(&self, context: &SearchContext<'_>, i: usize, extra: f64) -> f64 {
        let row = self.weights.row(i);
        let (mut successes, mut failures) = (0.0, 0.0);
        for (j, label) in context.observations() {
            if label.is_positive() {
                successes += row[j];
            } else {
                failures += row[j];
            }
        }
        let alpha = self.pseudocounts.0 + successes + extra * self.max_weights[i];
        let beta = self.pseudocounts.1 + failures;
        alpha / (alpha + beta)
    }
}

impl ProbabilityBound for KnnProbabilityBound {
    fn probability_bound(
        &self,
        context: &SearchContext<'_>,
        num_positives: usize,
    ) -> Result<f64, OracleError> {
        let expected = self.weights.nrows();
        if context.dataset.len() != expected {
            return Err(Box::new(KnnError::DatasetMismatch {
                expected,
                found: context.dataset.len(),
            }));
        }
        let extra = num_positives as f64;
        Ok(context
            .test_ind
            .iter()
            .map(|&i| self.posterior_bound(context, i, extra))
            .fold(0.0, f64::max))
    }
}

fn nearest_neighbours(dataset: &Dataset, i: usize, k: usize) -> Vec<usize> {
    let origin = dataset.point(i);
    let mut candidates: Vec<(f64, usize)> = (0..dataset.len())
        .filter(|&j| j != i)
        .map(|j| (squared_distance(origin, dataset.point(j)), j))
        .collect();
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    candidates.into_iter().take(k).map(|(_, j)| j).collect()
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
