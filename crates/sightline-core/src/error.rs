//! Error types for terrain ingestion and feature-set validation.

use thiserror::Error;

/// Errors produced while normalizing a raw elevation tile.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The source tile could not be decoded.
    #[error("malformed elevation tile: {0}")]
    MalformedInput(String),

    /// Cropping left no elevation samples to work with.
    #[error("cropped region contains no elevation samples")]
    EmptyRegion,

    /// Writing the canonical grid file failed.
    #[error("failed to write elevation grid: {0}")]
    Storage(#[from] std::io::Error),
}

/// Errors produced while validating an uploaded feature set.
#[derive(Debug, Error)]
pub enum FeatureSetError {
    /// The document is not a usable GeoJSON FeatureCollection.
    #[error("invalid feature set: {0}")]
    Invalid(String),

    /// A single feature is missing or malformed.
    #[error("invalid feature at index {index}: {reason}")]
    InvalidFeature { index: usize, reason: String },
}
