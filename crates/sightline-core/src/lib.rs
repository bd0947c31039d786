//! Terrain ingestion and shared data models for the sightline LOS service.
//!
//! This crate is pure library code: it decodes raw GeoTIFF elevation tiles,
//! normalizes them into the rectangular CSV grid the external solver consumes,
//! and validates GeoJSON feature sets. No HTTP, no async.

pub mod error;
pub mod featureset;
pub mod ingest;
pub mod models;
pub mod tile;

pub use error::{FeatureSetError, IngestError};
pub use featureset::{parse_feature_set, Feature};
pub use ingest::{ingest, CropBounds, ElevationGrid, GridLimit};
pub use models::{GridCell, Point};
pub use tile::{RawTile, TileBounds};
