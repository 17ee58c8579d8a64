use serde::Serialize;

/// Tunables of an extraction run.
#[derive(Clone, Debug, Serialize)]
pub struct ExtractConfig {
    /// Connection ids decoded per tshark pass.
    pub slice_size: u64,
    /// Sessions with fewer feature keys than this are dropped.
    pub min_features: usize,
    /// Upper bound on decoded slices, `None` to run until the capture is exhausted.
    pub max_slices: Option<usize>,
    /// Consecutive failed slices after which the capture is given up on.
    pub max_consecutive_failures: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            slice_size: 10_000,
            min_features: 3,
            max_slices: None,
            max_consecutive_failures: 3,
        }
    }
}
