use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatError {
    #[error("Invalid format: expected {expected:?}, found {found:X?}")]
    InvalidFormat { expected: &'static str, found: Vec<u8> },
    #[error("Unsupported format: {0:X?}")]
    UnsupportedFormat(Vec<u8>),
    #[error("Malformed tag: {0}")]
    MalformedTag(String),
    #[error("Unsupported depth: {0} bits")]
    UnsupportedDepth(i32),
    #[error("Invalid dimensions: {0}x{1}")]
    InvalidDimensions(i32, i32),
    #[error("Dimensions too large: {0}x{1} ({2} bytes)")]
    DimensionsTooLarge(i32, i32, u64),
    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),
    #[error("Corrupt image: {0}")]
    CorruptImage(String),
    #[error("Allocation failed: {0} bytes")]
    AllocationFailed(usize),
    #[error("Unrecognized file: {0}")]
    Unrecognized(PathBuf),
    #[error("{0}")]
    Custom(String),
}
