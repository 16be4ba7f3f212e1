use crate::aging::SweepMode;
use crate::error::{FilterError, Result};
use crate::hash::{optimal_num_cells, optimal_num_hashes};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// How the 2-bit cell counter behaves when incremented at its maximum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterMode {
    /// Increment modulo 4. A cell receiving four contributions with no
    /// intervening delete reads as empty again. This is the classic
    /// behaviour of the direct filter and is kept as the default.
    #[default]
    Wrapping,
    /// Clamp at 3. Cells never wrap to zero, at the price of never being
    /// fully released by deletes once saturated.
    Saturating,
}

#[derive(Clone, Debug, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct DirectFilterConfig {
    /// Number of 3-bit cells
    #[builder(default = "1000")]
    pub num_cells: usize,

    /// Number of hash functions per (flow, state) pair
    #[builder(default = "4")]
    pub num_hashes: usize,

    /// Operations between aging sweeps
    #[builder(default = "1000")]
    pub phase_duration: usize,

    #[builder(default = "0")]
    pub seed: u32,

    #[builder(default)]
    pub counter_mode: CounterMode,

    #[builder(default)]
    pub sweep_mode: SweepMode,
}

impl Default for DirectFilterConfig {
    fn default() -> Self {
        Self {
            num_cells: 1000,
            num_hashes: 4,
            phase_duration: 1000,
            seed: 0,
            counter_mode: CounterMode::default(),
            sweep_mode: SweepMode::default(),
        }
    }
}

impl DirectFilterConfig {
    /// Sizes the cell array for `expected_flows` live flows at `fpr`.
    pub fn for_capacity(expected_flows: usize, fpr: f64) -> Result<Self> {
        if expected_flows == 0 {
            return Err(FilterError::InvalidConfig(
                "Expected flows must be greater than 0".into(),
            ));
        }
        if fpr <= 0.0 || fpr >= 1.0 {
            return Err(FilterError::InvalidConfig(
                "False positive rate must be between 0 and 1".into(),
            ));
        }
        let num_cells = optimal_num_cells(expected_flows, fpr);
        let num_hashes = optimal_num_hashes(expected_flows, num_cells);
        Ok(Self {
            num_cells,
            num_hashes,
            ..Self::default()
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_cells == 0 {
            return Err(FilterError::InvalidConfig(
                "Number of cells must be greater than 0".into(),
            ));
        }
        if self.num_hashes == 0 {
            return Err(FilterError::InvalidConfig(
                "Number of hash functions must be greater than 0".into(),
            ));
        }
        if self.phase_duration == 0 {
            return Err(FilterError::InvalidConfig(
                "Phase duration must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
