use ndarray::{Array2, ArrayView1};
use thiserror::Error;

/// Binary label: the class of interest versus every other class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Positive,
    Negative,
}

impl Label {
    #[inline]
    pub fn is_positive(self) -> bool {
        matches!(self, Label::Positive)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DatasetError {
    #[error("Dataset has {rows} feature rows but {labels} labels.")]
    LabelCountMismatch { rows: usize, labels: usize },
    #[error("{role} index {index} is out of bounds for a dataset of {len} points.")]
    IndexOutOfBounds {
        role: &'static str,
        index: usize,
        len: usize,
    },
    #[error("{train} training indices were supplied with {labels} observed labels.")]
    ObservedLabelMismatch { train: usize, labels: usize },
}

/// An `n x d` feature matrix paired row by row with ground-truth labels.
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Array2<f64>,
    labels: Vec<Label>,
}

impl Dataset {
    pub fn new(features: Array2<f64>, labels: Vec<Label>) -> Result<Self, DatasetError> {
        if features.nrows() != labels.len() {
            return Err(DatasetError::LabelCountMismatch {
                rows: features.nrows(),
                labels: labels.len(),
            });
        }
        Ok(Self { features, labels })
    }

    /// A dataset with `n` featureless points, for oracles that never look at
    /// the features.
    pub fn unlabeled(n: usize) -> Self {
        Self {
            features: Array2::zeros((n, 0)),
            labels: vec![Label::Negative; n],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.features.ncols()
    }

    pub fn point(&self, index: usize) -> ArrayView1<'_, f64> {
        self.features.row(index)
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }
}

/// Everything the oracle may condition on, borrowed for one bound computation.
///
/// Hypothetical future observations never appear here: the evaluator only
/// tracks them as a count, so the same context is handed to the oracle at
/// every recursion level.
#[derive(Debug, Clone, Copy)]
pub struct SearchContext<'a> {
    pub dataset: &'a Dataset,
    pub train_ind: &'a [usize],
    pub observed_labels: &'a [Label],
    pub test_ind: &'a [usize],
}

impl<'a> SearchContext<'a> {
    pub fn new(
        dataset: &'a Dataset,
        train_ind: &'a [usize],
        observed_labels: &'a [Label],
        test_ind: &'a [usize],
    ) -> Result<Self, DatasetError> {
        if train_ind.len() != observed_labels.len() {
            return Err(DatasetError::ObservedLabelMismatch {
                train: train_ind.len(),
                labels: observed_labels.len(),
            });
        }
        let len = dataset.len();
        for (role, indices) in [("Training", train_ind), ("Test", test_ind)] {
            if let Some(&index) = indices.iter().find(|&&i| i >= len) {
                return Err(DatasetError::IndexOutOfBounds { role, index, len });
            }
        }
        Ok(Self {
            dataset,
            train_ind,
            observed_labels,
            test_ind,
        })
    }

    /// Training points paired with their observed labels.
    pub fn observations(&self) -> impl Iterator<Item = (usize, Label)> + '_ {
        self.train_ind
            .iter()
            .copied()
            .zip(self.observed_labels.iter().copied())
    }
}
