use crate::aging::SweepMode;
use crate::error::{FilterError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// What an insert does when every candidate bucket is already full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Leave the table unchanged and return `FilterError::BucketOverflow`.
    #[default]
    Reject,
    /// Drop the oldest untouched entry of the chosen bucket (the oldest
    /// entry when all of them are touched) to make room.
    EvictOldest,
}

#[derive(Clone, Debug, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct FcfConfig {
    /// Total number of buckets across all subtables
    #[builder(default = "6 * 1024")]
    pub table_size: usize,

    /// Number of subtables, one hash function each
    #[builder(default = "3")]
    pub num_hashes: usize,

    #[builder(default = "6")]
    pub cells_per_bucket: usize,

    /// Fingerprint width in bits (1..=64)
    #[builder(default = "10")]
    pub fingerprint_bits: u8,

    /// Operations between aging sweeps
    #[builder(default = "6_000_000")]
    pub deletion_window: usize,

    #[builder(default = "0")]
    pub seed: u32,

    #[builder(default)]
    pub overflow_policy: OverflowPolicy,

    #[builder(default)]
    pub sweep_mode: SweepMode,
}

impl FcfConfig {
    pub fn subtable_size(&self) -> usize {
        self.table_size / self.num_hashes
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_hashes == 0 {
            return Err(FilterError::InvalidConfig(
                "Number of hash functions must be greater than 0".into(),
            ));
        }
        if self.table_size == 0 || self.table_size % self.num_hashes != 0 {
            return Err(FilterError::InvalidConfig(format!(
                "Table size {} must be a non-zero multiple of hash count {}",
                self.table_size, self.num_hashes
            )));
        }
        if self.cells_per_bucket == 0 {
            return Err(FilterError::InvalidConfig(
                "Cells per bucket must be greater than 0".into(),
            ));
        }
        if !(1..=64).contains(&self.fingerprint_bits) {
            return Err(FilterError::InvalidConfig(format!(
                "Fingerprint width must be between 1 and 64 bits, got {}",
                self.fingerprint_bits
            )));
        }
        if self.deletion_window == 0 {
            return Err(FilterError::InvalidConfig(
                "Deletion window must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
