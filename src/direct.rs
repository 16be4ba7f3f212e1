//! Direct (counter-based) state filter with timer-driven aging
pub mod config;
pub mod filter;

pub use config::{
    CounterMode, DirectFilterConfig, DirectFilterConfigBuilder,
    DirectFilterConfigBuilderError,
};
pub use filter::DirectStateFilter;
