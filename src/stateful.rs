//! Stateful bloom filter over reference-counted cells
pub mod cell;
pub mod config;
pub mod filter;

pub use cell::{Cell, CellState};
pub use config::{
    StatefulFilterConfig, StatefulFilterConfigBuilder,
    StatefulFilterConfigBuilderError,
};
pub use filter::StatefulCellFilter;
