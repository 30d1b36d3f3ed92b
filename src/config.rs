//! Optimizer configuration.

/// Tunables for a single optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Upper bound on the size of any folded container, and on the bit
    /// length of any folded `LSHIFT` result. Folds that would exceed this are
    /// skipped, leaving the original instructions in place.
    pub max_size: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_size: 20 }
    }
}
