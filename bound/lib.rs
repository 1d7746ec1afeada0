#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! Upper bounds on the expected number of positives found within a lookahead
//! horizon during active search.
//!
//! The bound is computed from a single oracle, [`oracle::ProbabilityBound`],
//! that caps the posterior positive probability of the best candidate after
//! some number of hypothetical positive observations.

pub mod config;
pub mod evaluate;
pub mod knn;
pub mod oracle;
pub mod table;
pub mod types;

pub use config::{ConfigError, EvaluationStrategy, EvaluatorConfig, MonotonicityPolicy};
pub use evaluate::{BoundError, BoundEstimate, BoundEvaluator, evaluate_bound};
pub use oracle::{ConstantBound, OracleError, ProbabilityBound, TabulatedBound};
pub use types::{Dataset, DatasetError, Label, SearchContext};
