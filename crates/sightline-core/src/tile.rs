//! Raw elevation-model tile decoding.
//!
//! Uploaded tiles arrive as GeoTIFF bytes with arbitrary native resolution.
//! The decoder reads the pixel grid, the geotransform tags that anchor it to
//! geographic coordinates, and the GDAL no-data sentinel. Samples equal to
//! the sentinel (or non-finite) are reported as missing, never as zeros.

use std::io::Cursor;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::error::IngestError;

/// GeoTIFF ModelTiepoint tag.
const TAG_MODEL_TIEPOINT: u16 = 33922;
/// GeoTIFF ModelPixelScale tag.
const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
/// GDAL_NODATA tag, stored as an ASCII string.
const TAG_GDAL_NODATA: u16 = 42113;

/// Geographic bounds of a tile.
#[derive(Debug, Clone, Copy)]
pub struct TileBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// A decoded elevation tile: a row-major pixel grid (north to south, west to
/// east) anchored to geographic bounds.
#[derive(Debug)]
pub struct RawTile {
    data: Vec<f64>,
    width: usize,
    height: usize,
    bounds: TileBounds,
    no_data: Option<f64>,
}

impl RawTile {
    /// Build a tile from already-decoded samples. `data` must hold exactly
    /// `width * height` values in row-major order, row 0 at the north edge.
    pub fn new(
        data: Vec<f64>,
        width: usize,
        height: usize,
        bounds: TileBounds,
        no_data: Option<f64>,
    ) -> Result<Self, IngestError> {
        if width == 0 || height == 0 {
            return Err(IngestError::MalformedInput(
                "tile has zero width or height".to_string(),
            ));
        }
        if data.len() != width * height {
            return Err(IngestError::MalformedInput(format!(
                "sample count {} does not match {}x{} tile dimensions",
                data.len(),
                width,
                height
            )));
        }
        if bounds.min_lat >= bounds.max_lat || bounds.min_lon >= bounds.max_lon {
            return Err(IngestError::MalformedInput(
                "tile bounds are degenerate".to_string(),
            ));
        }
        Ok(Self { data, width, height, bounds, no_data })
    }

    /// Decode a GeoTIFF tile from uploaded bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IngestError> {
        let mut decoder = Decoder::new(Cursor::new(bytes)).map_err(malformed)?;

        // Raise the decode limits; 1/3 arc-second tiles run to hundreds of MB.
        let mut limits = Limits::default();
        limits.decoding_buffer_size = 1024 * 1024 * 1024;
        limits.intermediate_buffer_size = 1024 * 1024 * 1024;
        limits.ifd_value_size = 1024 * 1024 * 1024;
        decoder = decoder.with_limits(limits);

        let (width, height) = decoder.dimensions().map_err(malformed)?;
        if width == 0 || height == 0 {
            return Err(IngestError::MalformedInput(
                "tile has zero width or height".to_string(),
            ));
        }

        let bounds = read_geotransform(&mut decoder, width, height)?;
        let data = decode_samples(&mut decoder)?;
        let no_data = read_nodata(&mut decoder);

        Self::new(data, width as usize, height as usize, bounds, no_data)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bounds(&self) -> TileBounds {
        self.bounds
    }

    /// Latitude of a row's pixel center. Row 0 is the northernmost row.
    pub fn lat_at(&self, row: usize) -> f64 {
        let step = (self.bounds.max_lat - self.bounds.min_lat) / self.height as f64;
        self.bounds.max_lat - (row as f64 + 0.5) * step
    }

    /// Longitude of a column's pixel center. Column 0 is the westernmost.
    pub fn lng_at(&self, col: usize) -> f64 {
        let step = (self.bounds.max_lon - self.bounds.min_lon) / self.width as f64;
        self.bounds.min_lon + (col as f64 + 0.5) * step
    }

    /// Elevation sample at a pixel, or `None` for missing data.
    pub fn sample(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let value = self.data[row * self.width + col];
        if !value.is_finite() {
            return None;
        }
        if let Some(no_data) = self.no_data {
            if value == no_data {
                return None;
            }
        }
        Some(value)
    }
}

fn malformed(err: tiff::TiffError) -> IngestError {
    IngestError::MalformedInput(err.to_string())
}

/// Read the geotransform (geographic bounds) from GeoTIFF tags.
///
/// Tiepoint format is `[i, j, k, x, y, z]` where `(i, j)` is a pixel
/// coordinate and `(x, y)` its geographic position; the pixel scale gives
/// degrees per pixel on each axis. Tiles without these tags are rejected.
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    width: u32,
    height: u32,
) -> Result<TileBounds, IngestError> {
    let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(TAG_MODEL_TIEPOINT));
    let pixel_scale = decoder.get_tag_f64_vec(Tag::Unknown(TAG_MODEL_PIXEL_SCALE));

    if let (Ok(tiepoint), Ok(scale)) = (tiepoint, pixel_scale) {
        if tiepoint.len() >= 6 && scale.len() >= 2 {
            let tie_lon = tiepoint[3];
            let tie_lat = tiepoint[4];
            let scale_lon = scale[0];
            let scale_lat = scale[1];

            if scale_lon > 0.0 && scale_lat > 0.0 {
                // The tiepoint anchors the top-left corner; data runs south
                // and east from there.
                return Ok(TileBounds {
                    min_lat: tie_lat - height as f64 * scale_lat,
                    max_lat: tie_lat,
                    min_lon: tie_lon,
                    max_lon: tie_lon + width as f64 * scale_lon,
                });
            }
        }
    }

    Err(IngestError::MalformedInput(
        "tile is missing GeoTIFF geotransform tags".to_string(),
    ))
}

fn decode_samples<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<Vec<f64>, IngestError> {
    let image = decoder.read_image().map_err(malformed)?;

    let data = match image {
        DecodingResult::F64(data) => data,
        DecodingResult::F32(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I16(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::U8(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::U16(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f64).collect(),
    };

    Ok(data)
}

fn read_nodata<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    decoder
        .get_tag_ascii_string(Tag::Unknown(TAG_GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}
