use crate::aging::SweepMode;
use crate::error::{FilterError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct StatefulFilterConfig {
    /// Number of reference-counted cells
    #[builder(default = "256 * 1024")]
    pub num_buckets: usize,

    /// Cells addressed per flow
    #[builder(default = "3")]
    pub num_hashes: usize,

    /// Operations between aging sweeps
    #[builder(default = "6_000_000")]
    pub deletion_window: usize,

    #[builder(default = "0")]
    pub seed: u32,

    #[builder(default)]
    pub sweep_mode: SweepMode,
}

impl StatefulFilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_buckets == 0 {
            return Err(FilterError::InvalidConfig(
                "Number of buckets must be greater than 0".into(),
            ));
        }
        if self.num_hashes == 0 {
            return Err(FilterError::InvalidConfig(
                "Number of hash functions must be greater than 0".into(),
            ));
        }
        if self.deletion_window == 0 {
            return Err(FilterError::InvalidConfig(
                "Deletion window must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
