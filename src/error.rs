use thiserror::Error;

pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "Bucket overflow: subtable {subtable}, bucket {bucket} already holds {capacity} entries"
    )]
    BucketOverflow {
        subtable: usize,
        bucket: usize,
        capacity: usize,
    },

    #[error("Lock error: {0}")]
    LockError(String),
}
