//! The probability-bound oracle consumed by the evaluator.
//!
//! An oracle answers one question: after `num_positives` more positive labels
//! are hypothetically observed (without saying which points receive them),
//! what is the largest posterior probability that any candidate in
//! `test_ind` belongs to the class of interest?
//!
//! Implementations must return a value in `[0, 1]` that is non-decreasing in
//! `num_positives`, and must be free of side effects. The evaluator validates
//! the range on every call; monotonicity is checked according to
//! [`crate::config::MonotonicityPolicy`].

use crate::types::SearchContext;
use thiserror::Error;

/// Errors raised by an oracle are passed through the evaluator untouched.
pub type OracleError = Box<dyn std::error::Error + Send + Sync>;

pub trait ProbabilityBound: Sync {
    fn probability_bound(
        &self,
        context: &SearchContext<'_>,
        num_positives: usize,
    ) -> Result<f64, OracleError>;
}

impl<F> ProbabilityBound for F
where
    F: Fn(&SearchContext<'_>, usize) -> Result<f64, OracleError> + Sync,
{
    fn probability_bound(
        &self,
        context: &SearchContext<'_>,
        num_positives: usize,
    ) -> Result<f64, OracleError> {
        self(context, num_positives)
    }
}

/// The same bound regardless of context or positive count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantBound(pub f64);

impl ProbabilityBound for ConstantBound {
    fn probability_bound(&self, _: &SearchContext<'_>, _: usize) -> Result<f64, OracleError> {
        Ok(self.0)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TableError {
    #[error("A tabulated probability bound needs at least one entry.")]
    Empty,
}

/// Bounds listed by positive count; counts past the end reuse the last entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TabulatedBound {
    values: Vec<f64>,
}

impl TabulatedBound {
    pub fn new(values: Vec<f64>) -> Result<Self, TableError> {
        if values.is_empty() {
            return Err(TableError::Empty);
        }
        Ok(Self { values })
    }
}

impl ProbabilityBound for TabulatedBound {
    fn probability_bound(
        &self,
        _: &SearchContext<'_>,
        num_positives: usize,
    ) -> Result<f64, OracleError> {
        let last = self.values.len() - 1;
        Ok(self.values[num_positives.min(last)])
    }
}
