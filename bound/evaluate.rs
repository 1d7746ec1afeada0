//! Recursive upper bound on lookahead expected utility.
//!
//! With `lookahead` steps left and `num_positives` hypothetical positives
//! already assumed, let `p` be the oracle's bound for that state. Then
//!
//! ```text
//! R(1, k) = p(k)
//! R(l, k) = p(k) * (1 + R(l - 1, k + 1)) + (1 - p(k)) * R(l - 1, k)
//! ```
//!
//! The next observation is positive with probability at most `p(k)`, which
//! adds one discovered positive and moves to `k + 1`; otherwise the count is
//! unchanged. Because `p(k)` only bounds the true probability from above and
//! the oracle is monotone in `k`, `R` bounds the expected number of positives
//! found in the remaining steps.
//!
//! The state threaded through the recursion is exactly `(l, k)`. The context
//! and oracle are shared by reference and never mutated, so the two branches
//! of every node are independent; [`EvaluationStrategy::Parallel`] forks them
//! onto the rayon pool and [`EvaluationStrategy::Table`] collapses the tree
//! into the dynamic program in [`crate::table`].

use crate::config::{EvaluationStrategy, EvaluatorConfig, MonotonicityPolicy};
use crate::oracle::{OracleError, ProbabilityBound};
use crate::table;
use crate::types::SearchContext;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Slack allowed before a decrease in the oracle's bound counts as a
/// monotonicity violation, absorbing rounding in closed-form oracles.
const MONOTONICITY_TOLERANCE: f64 = 1e-12;

#[derive(Error, Debug)]
pub enum BoundError {
    #[error("Lookahead must be at least 1, got {lookahead}.")]
    InvalidLookahead { lookahead: usize },
    #[error(
        "Probability bound oracle returned {value} with {num_positives} additional positives; expected a value in [0, 1]."
    )]
    InvalidProbability { value: f64, num_positives: usize },
    #[error(
        "Probability bound oracle is not monotone: {current} with {num_positives} additional positives is below {previous} with one fewer."
    )]
    NonMonotoneOracle {
        num_positives: usize,
        previous: f64,
        current: f64,
    },
    #[error(
        "{num_positives} assumed positives plus a lookahead of {lookahead} overflows the positive count."
    )]
    PositiveCountOverflow {
        num_positives: usize,
        lookahead: usize,
    },
    #[error("Bound evaluation exceeded its deadline after {elapsed_ms} ms.")]
    DeadlineExceeded { elapsed_ms: u128 },
    #[error("Probability bound oracle failed: {0}")]
    OracleFailure(#[source] OracleError),
}

/// A bound together with the number of oracle queries spent computing it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundEstimate {
    pub bound: f64,
    pub oracle_calls: usize,
}

/// Evaluates the lookahead bound with the default configuration: plain
/// recursion with monotonicity enforced.
pub fn evaluate_bound<O>(
    context: &SearchContext<'_>,
    probability_bound: &O,
    lookahead: usize,
    num_positives: usize,
) -> Result<f64, BoundError>
where
    O: ProbabilityBound + ?Sized,
{
    BoundEvaluator::default()
        .evaluate(context, probability_bound, lookahead, num_positives)
        .map(|estimate| estimate.bound)
}

#[derive(Debug, Clone, Default)]
pub struct BoundEvaluator {
    config: EvaluatorConfig,
}

impl BoundEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    /// Computes the bound for `lookahead` remaining steps given
    /// `num_positives` hypothetical positives already assumed.
    ///
    /// The oracle is queried with up to `num_positives + lookahead - 1`
    /// positives, which must fit in a `usize`. Any error at any depth aborts
    /// the whole computation.
    pub fn evaluate<O>(
        &self,
        context: &SearchContext<'_>,
        oracle: &O,
        lookahead: usize,
        num_positives: usize,
    ) -> Result<BoundEstimate, BoundError>
    where
        O: ProbabilityBound + ?Sized,
    {
        if lookahead < 1 {
            return Err(BoundError::InvalidLookahead { lookahead });
        }
        if num_positives.checked_add(lookahead - 1).is_none() {
            return Err(BoundError::PositiveCountOverflow {
                num_positives,
                lookahead,
            });
        }
        log::debug!(
            "Evaluating {:?} bound: lookahead {}, {} assumed positives, {} candidates",
            self.config.strategy,
            lookahead,
            num_positives,
            context.test_ind.len()
        );

        let deadline = Deadline::start(self.config.deadline());
        let estimate = match self.config.strategy {
            EvaluationStrategy::Recursive | EvaluationStrategy::Parallel => {
                let fork_from = match self.config.strategy {
                    EvaluationStrategy::Parallel => Some(self.config.parallel_cutoff.max(2)),
                    _ => None,
                };
                let recursion = Recursion {
                    context,
                    oracle,
                    monotonicity: self.config.monotonicity,
                    deadline,
                    fork_from,
                };
                recursion.bound(lookahead, num_positives, None)?
            }
            EvaluationStrategy::Table => table::evaluate(
                context,
                oracle,
                lookahead,
                num_positives,
                self.config.monotonicity,
                &deadline,
            )?,
        };

        log::debug!(
            "Lookahead bound {:.6} after {} oracle calls in {:?}",
            estimate.bound,
            estimate.oracle_calls,
            deadline.elapsed()
        );
        Ok(estimate)
    }
}

struct Recursion<'a, 'c, O: ?Sized> {
    context: &'a SearchContext<'c>,
    oracle: &'a O,
    monotonicity: MonotonicityPolicy,
    deadline: Deadline,
    /// Smallest remaining lookahead at which both branches are forked.
    fork_from: Option<usize>,
}

impl<O> Recursion<'_, '_, O>
where
    O: ProbabilityBound + ?Sized,
{
    /// `floor` is the oracle's bound for `num_positives - 1`, when this call
    /// was reached through a positive branch.
    fn bound(
        &self,
        lookahead: usize,
        num_positives: usize,
        floor: Option<f64>,
    ) -> Result<BoundEstimate, BoundError> {
        self.deadline.check()?;
        let p = query(self.oracle, self.context, num_positives)?;
        if let Some(previous) = floor {
            check_monotone(self.monotonicity, num_positives, previous, p)?;
        }
        if lookahead == 1 {
            return Ok(BoundEstimate {
                bound: p,
                oracle_calls: 1,
            });
        }

        let (positive, negative) = if self.fork_from.is_some_and(|cutoff| lookahead >= cutoff) {
            let (positive, negative) = rayon::join(
                || self.bound(lookahead - 1, num_positives + 1, Some(p)),
                || self.bound(lookahead - 1, num_positives, floor),
            );
            (positive?, negative?)
        } else {
            let positive = self.bound(lookahead - 1, num_positives + 1, Some(p))?;
            let negative = self.bound(lookahead - 1, num_positives, floor)?;
            (positive, negative)
        };

        Ok(BoundEstimate {
            bound: combine(p, positive.bound, negative.bound),
            oracle_calls: 1 + positive.oracle_calls + negative.oracle_calls,
        })
    }
}

/// One step of the recursion: a positive outcome (probability at most `p`)
/// contributes one discovery plus the bound with one more positive assumed.
#[inline]
pub(crate) fn combine(p: f64, positive: f64, negative: f64) -> f64 {
    p * (1.0 + positive) + (1.0 - p) * negative
}

/// Queries the oracle and rejects anything outside `[0, 1]`, NaN included.
pub(crate) fn query<O>(
    oracle: &O,
    context: &SearchContext<'_>,
    num_positives: usize,
) -> Result<f64, BoundError>
where
    O: ProbabilityBound + ?Sized,
{
    let value = oracle
        .probability_bound(context, num_positives)
        .map_err(BoundError::OracleFailure)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(BoundError::InvalidProbability {
            value,
            num_positives,
        });
    }
    log::trace!("Oracle bound {value} with {num_positives} additional positives");
    Ok(value)
}

pub(crate) fn check_monotone(
    policy: MonotonicityPolicy,
    num_positives: usize,
    previous: f64,
    current: f64,
) -> Result<(), BoundError> {
    if policy == MonotonicityPolicy::Ignore || current >= previous - MONOTONICITY_TOLERANCE {
        return Ok(());
    }
    match policy {
        MonotonicityPolicy::Enforce => Err(BoundError::NonMonotoneOracle {
            num_positives,
            previous,
            current,
        }),
        _ => {
            log::warn!(
                "Probability bound dropped from {previous} to {current} at {num_positives} additional positives; the lookahead bound may be invalid"
            );
            Ok(())
        }
    }
}

/// Wall-clock budget for one top-level evaluation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    start: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub(crate) fn start(budget: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub(crate) fn check(&self) -> Result<(), BoundError> {
        match self.budget {
            Some(budget) if self.elapsed() > budget => Err(BoundError::DeadlineExceeded {
                elapsed_ms: self.elapsed().as_millis(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{ConstantBound, TabulatedBound};
    use crate::types::{Dataset, Label};
    use approx::assert_relative_eq;
    use std::fmt;
    use std::thread;

    fn with_context<T>(body: impl FnOnce(&SearchContext<'_>) -> T) -> T {
        let data = Dataset::unlabeled(4);
        let labels = [Label::Positive, Label::Negative];
        let ctx = SearchContext::new(&data, &[0, 1], &labels, &[2, 3]).unwrap();
        body(&ctx)
    }

    #[test]
    fn single_step_returns_the_oracle_value() {
        with_context(|ctx| {
            let bound = evaluate_bound(ctx, &ConstantBound(0.3), 1, 0).unwrap();
            assert_eq!(bound, 0.3);
        });
    }

    #[test]
    fn two_steps_with_even_odds_bound_one_positive() {
        with_context(|ctx| {
            let bound = evaluate_bound(ctx, &ConstantBound(0.5), 2, 0).unwrap();
            assert_eq!(bound, 1.0);
        });
    }

    #[test]
    fn certain_positives_reach_the_lookahead() {
        with_context(|ctx| {
            let oracle = TabulatedBound::new(vec![1.0, 1.0]).unwrap();
            assert_eq!(evaluate_bound(ctx, &oracle, 2, 0).unwrap(), 2.0);
        });
    }

    #[test]
    fn impossible_positives_give_zero() {
        with_context(|ctx| {
            assert_eq!(evaluate_bound(ctx, &ConstantBound(0.0), 3, 0).unwrap(), 0.0);
        });
    }

    #[test]
    fn zero_lookahead_is_rejected() {
        with_context(|ctx| {
            let err = evaluate_bound(ctx, &ConstantBound(0.5), 0, 0).unwrap_err();
            assert!(matches!(err, BoundError::InvalidLookahead { lookahead: 0 }));
        });
    }

    #[test]
    fn positive_count_overflow_is_rejected() {
        with_context(|ctx| {
            for strategy in [
                EvaluationStrategy::Recursive,
                EvaluationStrategy::Parallel,
                EvaluationStrategy::Table,
            ] {
                let evaluator = BoundEvaluator::new(EvaluatorConfig {
                    strategy,
                    parallel_cutoff: 2,
                    ..EvaluatorConfig::default()
                });
                let err = evaluator
                    .evaluate(ctx, &ConstantBound(0.5), 2, usize::MAX)
                    .unwrap_err();
                assert!(matches!(
                    err,
                    BoundError::PositiveCountOverflow {
                        num_positives: usize::MAX,
                        lookahead: 2
                    }
                ));
                let err = evaluator
                    .evaluate(ctx, &ConstantBound(0.5), 4, usize::MAX - 2)
                    .unwrap_err();
                assert!(matches!(err, BoundError::PositiveCountOverflow { .. }));

                // The largest reachable count still fits.
                let single = evaluator
                    .evaluate(ctx, &ConstantBound(0.5), 1, usize::MAX)
                    .unwrap();
                assert_eq!(single.bound, 0.5);
                let deep = evaluator
                    .evaluate(ctx, &ConstantBound(0.5), 3, usize::MAX - 2)
                    .unwrap();
                assert_relative_eq!(deep.bound, 1.5, epsilon = 1e-12);
            }
        });
    }

    #[test]
    fn out_of_range_probability_is_rejected() {
        with_context(|ctx| {
            let oracle = TabulatedBound::new(vec![0.4, 1.5]).unwrap();
            let err = evaluate_bound(ctx, &oracle, 3, 0).unwrap_err();
            match err {
                BoundError::InvalidProbability {
                    value,
                    num_positives,
                } => {
                    assert_eq!(value, 1.5);
                    assert_eq!(num_positives, 1);
                }
                other => panic!("unexpected error: {other}"),
            }

            let err = evaluate_bound(ctx, &ConstantBound(f64::NAN), 1, 0).unwrap_err();
            assert!(matches!(err, BoundError::InvalidProbability { .. }));
            let err = evaluate_bound(ctx, &ConstantBound(-0.1), 2, 0).unwrap_err();
            assert!(matches!(err, BoundError::InvalidProbability { .. }));
        });
    }

    #[test]
    fn recursive_identity_holds_exactly() {
        with_context(|ctx| {
            let oracle = TabulatedBound::new(vec![0.05, 0.2, 0.35, 0.6, 0.9]).unwrap();
            for lookahead in 2..=6 {
                for np in 0..4 {
                    let p = oracle.probability_bound(ctx, np).unwrap();
                    let lhs = evaluate_bound(ctx, &oracle, lookahead, np).unwrap();
                    let hi = evaluate_bound(ctx, &oracle, lookahead - 1, np + 1).unwrap();
                    let lo = evaluate_bound(ctx, &oracle, lookahead - 1, np).unwrap();
                    assert_eq!(lhs, p * (1.0 + hi) + (1.0 - p) * lo);
                }
            }
        });
    }

    #[test]
    fn constant_oracle_gives_linear_bound() {
        // With a constant p every step contributes exactly p.
        with_context(|ctx| {
            for lookahead in 1..=8 {
                let bound = evaluate_bound(ctx, &ConstantBound(0.25), lookahead, 3).unwrap();
                assert_relative_eq!(bound, 0.25 * lookahead as f64, epsilon = 1e-12);
            }
        });
    }

    #[derive(Debug)]
    struct ModelUnavailable;

    impl fmt::Display for ModelUnavailable {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("posterior model unavailable")
        }
    }

    impl std::error::Error for ModelUnavailable {}

    #[test]
    fn oracle_errors_propagate_unchanged() {
        with_context(|ctx| {
            let oracle = |_: &SearchContext<'_>, k: usize| -> Result<f64, OracleError> {
                if k >= 2 {
                    Err(ModelUnavailable.into())
                } else {
                    Ok(0.5)
                }
            };
            assert!(evaluate_bound(ctx, &oracle, 2, 0).is_ok());

            let err = evaluate_bound(ctx, &oracle, 3, 0).unwrap_err();
            assert_eq!(
                err.to_string(),
                "Probability bound oracle failed: posterior model unavailable"
            );
            match err {
                BoundError::OracleFailure(inner) => assert!(inner.is::<ModelUnavailable>()),
                other => panic!("unexpected error: {other}"),
            }
        });
    }

    #[test]
    fn monotonicity_policy_controls_decreasing_oracles() {
        with_context(|ctx| {
            let oracle = TabulatedBound::new(vec![0.6, 0.2]).unwrap();

            let err = evaluate_bound(ctx, &oracle, 2, 0).unwrap_err();
            match err {
                BoundError::NonMonotoneOracle {
                    num_positives,
                    previous,
                    current,
                } => {
                    assert_eq!(num_positives, 1);
                    assert_eq!(previous, 0.6);
                    assert_eq!(current, 0.2);
                }
                other => panic!("unexpected error: {other}"),
            }

            for monotonicity in [MonotonicityPolicy::Warn, MonotonicityPolicy::Ignore] {
                let evaluator = BoundEvaluator::new(EvaluatorConfig {
                    monotonicity,
                    ..EvaluatorConfig::default()
                });
                let estimate = evaluator.evaluate(ctx, &oracle, 2, 0).unwrap();
                assert_relative_eq!(estimate.bound, 0.6 * 1.2 + 0.4 * 0.6, epsilon = 1e-12);
            }
        });
    }

    #[test]
    fn baseline_recursion_visits_every_node() {
        with_context(|ctx| {
            for lookahead in 1..=7 {
                let estimate = BoundEvaluator::default()
                    .evaluate(ctx, &ConstantBound(0.4), lookahead, 0)
                    .unwrap();
                assert_eq!(estimate.oracle_calls, (1 << lookahead) - 1);
            }
        });
    }

    #[test]
    fn expired_deadline_aborts_the_recursion() {
        with_context(|ctx| {
            let slow = |_: &SearchContext<'_>, _: usize| -> Result<f64, OracleError> {
                thread::sleep(Duration::from_millis(5));
                Ok(0.5)
            };
            let evaluator = BoundEvaluator::new(EvaluatorConfig {
                deadline_ms: Some(1),
                ..EvaluatorConfig::default()
            });
            let err = evaluator.evaluate(ctx, &slow, 4, 0).unwrap_err();
            assert!(matches!(err, BoundError::DeadlineExceeded { .. }));

            let generous = BoundEvaluator::new(EvaluatorConfig {
                deadline_ms: Some(60_000),
                ..EvaluatorConfig::default()
            });
            assert_eq!(generous.evaluate(ctx, &slow, 2, 0).unwrap().bound, 1.0);
        });
    }
}
