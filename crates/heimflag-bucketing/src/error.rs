use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BucketError {
    #[error("Unsupported hash version: {0}")]
    UnsupportedHashVersion(u32),
}

pub type Result<T> = std::result::Result<T, BucketError>;
