//! Fingerprint-compressed filter with multi-subtable bucket placement
pub mod bucket;
pub mod config;
pub mod filter;

pub use bucket::{Bucket, BucketEntry};
pub use config::{
    FcfConfig, FcfConfigBuilder, FcfConfigBuilderError, OverflowPolicy,
};
pub use filter::{FingerprintCompressedFilter, Placement};
