//! Bottom-up evaluation of the lookahead bound.
//!
//! For a fixed top-level call only `(remaining, num_positives)` varies across
//! the recursion tree, and from `(lookahead, k0)` the reachable states are
//! `(r, k0 + j)` with `j <= lookahead - r`. Filling one row per `r`, starting
//! from `r = 1`, needs `lookahead` oracle calls instead of
//! `2^lookahead - 1`, and each cell is combined with the same expression as
//! the recursion so the two agree bit for bit.

use crate::config::MonotonicityPolicy;
use crate::evaluate::{BoundError, BoundEstimate, Deadline, check_monotone, combine, query};
use crate::oracle::ProbabilityBound;
use crate::types::SearchContext;

pub(crate) fn evaluate<O>(
    context: &SearchContext<'_>,
    oracle: &O,
    lookahead: usize,
    num_positives: usize,
    monotonicity: MonotonicityPolicy,
    deadline: &Deadline,
) -> Result<BoundEstimate, BoundError>
where
    O: ProbabilityBound + ?Sized,
{
    // probabilities[j] is the oracle bound with num_positives + j positives.
    let mut probabilities: Vec<f64> = Vec::with_capacity(lookahead);
    for j in 0..lookahead {
        deadline.check()?;
        let p = query(oracle, context, num_positives + j)?;
        if let Some(&previous) = probabilities.last() {
            check_monotone(monotonicity, num_positives + j, previous, p)?;
        }
        probabilities.push(p);
    }

    // row[j] holds R(remaining, num_positives + j). Ascending j reads row[j + 1]
    // before it is overwritten, so the update can happen in place.
    let mut row = probabilities.clone();
    for remaining in 2..=lookahead {
        deadline.check()?;
        let width = lookahead - remaining + 1;
        for j in 0..width {
            row[j] = combine(probabilities[j], row[j + 1], row[j]);
        }
        row.truncate(width);
    }

    Ok(BoundEstimate {
        bound: row[0],
        oracle_calls: lookahead,
    })
}
