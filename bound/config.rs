use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// How the recursion over `(lookahead, num_positives)` is carried out.
///
/// All strategies give bit-identical bounds for a deterministic oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStrategy {
    /// Plain binary recursion, `2^(lookahead - 1)` oracle leaves.
    Recursive,
    /// Binary recursion with both branches forked onto the rayon pool.
    Parallel,
    /// Bottom-up table, one oracle call per reachable positive count.
    Table,
}

/// What to do when the oracle's bound drops as `num_positives` grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonotonicityPolicy {
    Enforce,
    Warn,
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub strategy: EvaluationStrategy,
    pub monotonicity: MonotonicityPolicy,
    /// Remaining lookahead below which the parallel strategy stops forking.
    pub parallel_cutoff: usize,
    /// Wall-clock budget for one top-level evaluation, in milliseconds.
    pub deadline_ms: Option<u64>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            strategy: EvaluationStrategy::Recursive,
            monotonicity: MonotonicityPolicy::Enforce,
            parallel_cutoff: 4,
            deadline_ms: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write evaluator config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML evaluator config: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize evaluator config to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("parallel_cutoff must be at least 2, got {0}.")]
    InvalidParallelCutoff(usize),
}

impl EvaluatorConfig {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallel_cutoff < 2 {
            return Err(ConfigError::InvalidParallelCutoff(self.parallel_cutoff));
        }
        Ok(())
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        Self::from_toml_str(&toml_string)
    }
}
