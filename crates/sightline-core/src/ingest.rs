//! Normalizes a raw elevation tile into the solver's rectangular grid.
//!
//! The transform is pure: crop to an optional bounding box, coarsen to an
//! optional row/column cap by block averaging, drop missing samples, and
//! serialize the surviving cells as the canonical `lat,lng,alt` CSV. The
//! in-memory cell list and the CSV are derived from the same cell set, so
//! they cannot diverge.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::IngestError;
use crate::models::GridCell;
use crate::tile::RawTile;

/// Default crop span in degrees, matching the upstream tooling.
pub const DEFAULT_CROP_SPAN_DEG: f64 = 0.2;

/// Geographic crop window: a center plus a lat/lon span.
#[derive(Debug, Clone, Copy)]
pub struct CropBounds {
    pub lat_center: f64,
    pub lng_center: f64,
    pub lat_span: f64,
    pub lng_span: f64,
}

impl CropBounds {
    pub fn new(lat_center: f64, lng_center: f64) -> Self {
        Self {
            lat_center,
            lng_center,
            lat_span: DEFAULT_CROP_SPAN_DEG,
            lng_span: DEFAULT_CROP_SPAN_DEG,
        }
    }

    pub fn with_spans(mut self, lat_span: f64, lng_span: f64) -> Self {
        self.lat_span = lat_span;
        self.lng_span = lng_span;
        self
    }

    fn lat_range(&self) -> (f64, f64) {
        (self.lat_center - self.lat_span / 2.0, self.lat_center + self.lat_span / 2.0)
    }

    fn lng_range(&self) -> (f64, f64) {
        (self.lng_center - self.lng_span / 2.0, self.lng_center + self.lng_span / 2.0)
    }

    fn is_valid(&self) -> bool {
        self.lat_center.is_finite()
            && self.lng_center.is_finite()
            && self.lat_span.is_finite()
            && self.lng_span.is_finite()
            && self.lat_span > 0.0
            && self.lng_span > 0.0
    }
}

/// Row/column cap for coarsening oversized tiles.
#[derive(Debug, Clone, Copy)]
pub struct GridLimit {
    pub max_rows: usize,
    pub max_cols: usize,
}

/// A normalized elevation grid: the filtered/coarsened cell set plus the
/// lattice dimensions it was reduced to.
#[derive(Debug, Clone)]
pub struct ElevationGrid {
    cells: Vec<GridCell>,
    rows: usize,
    cols: usize,
}

impl ElevationGrid {
    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Canonical CSV serialization consumed by the solver.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("lat,lng,alt\n");
        for cell in &self.cells {
            out.push_str(&format!("{},{},{}\n", cell.lat, cell.lng, cell.alt));
        }
        out
    }

    /// Write the canonical CSV, publishing atomically: the bytes land in a
    /// temporary file first and are renamed into place, so a failed write
    /// never leaves a partial grid at `path`.
    pub fn write_csv(&self, path: &Path) -> Result<(), IngestError> {
        let tmp = path.with_extension("tmp");
        let result = (|| {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(self.to_csv().as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, path)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result.map_err(IngestError::from)
    }
}

/// Normalize a raw tile: crop, coarsen, drop missing samples.
///
/// Coarsening groups cells into blocks of `ceil(native / target)` per axis
/// and reduces each block by arithmetic mean over its valid samples. Blocks
/// with no valid samples are discarded; trailing blocks that do not evenly
/// divide the native grid are trimmed rather than padded.
pub fn ingest(
    tile: &RawTile,
    bounds: Option<&CropBounds>,
    limit: Option<&GridLimit>,
) -> Result<ElevationGrid, IngestError> {
    let (row_start, row_count, col_start, col_count) = match bounds {
        Some(bounds) => {
            if !bounds.is_valid() {
                return Err(IngestError::MalformedInput(
                    "crop bounds must be finite with positive spans".to_string(),
                ));
            }
            let (lat_min, lat_max) = bounds.lat_range();
            let (lng_min, lng_max) = bounds.lng_range();
            let rows = contiguous_range(tile.height(), |row| {
                let lat = tile.lat_at(row);
                lat >= lat_min && lat <= lat_max
            });
            let cols = contiguous_range(tile.width(), |col| {
                let lng = tile.lng_at(col);
                lng >= lng_min && lng <= lng_max
            });
            match (rows, cols) {
                (Some((rs, rc)), Some((cs, cc))) => (rs, rc, cs, cc),
                _ => return Err(IngestError::EmptyRegion),
            }
        }
        None => (0, tile.height(), 0, tile.width()),
    };

    let block_h = block_size(row_count, limit.map(|l| l.max_rows));
    let block_w = block_size(col_count, limit.map(|l| l.max_cols));
    let out_rows = row_count / block_h;
    let out_cols = col_count / block_w;

    let mut cells = Vec::with_capacity(out_rows * out_cols);
    for block_row in 0..out_rows {
        for block_col in 0..out_cols {
            let mut lat_sum = 0.0;
            let mut lng_sum = 0.0;
            let mut alt_sum = 0.0;
            let mut count = 0usize;
            for dr in 0..block_h {
                for dc in 0..block_w {
                    let row = row_start + block_row * block_h + dr;
                    let col = col_start + block_col * block_w + dc;
                    if let Some(alt) = tile.sample(row, col) {
                        lat_sum += tile.lat_at(row);
                        lng_sum += tile.lng_at(col);
                        alt_sum += alt;
                        count += 1;
                    }
                }
            }
            // A block with no valid samples is dropped, not zero-filled.
            if count > 0 {
                let n = count as f64;
                cells.push(GridCell {
                    lat: lat_sum / n,
                    lng: lng_sum / n,
                    alt: alt_sum / n,
                });
            }
        }
    }

    if cells.is_empty() {
        return Err(IngestError::EmptyRegion);
    }

    Ok(ElevationGrid { cells, rows: out_rows, cols: out_cols })
}

/// First and count of the contiguous index range satisfying `keep`.
fn contiguous_range(len: usize, keep: impl Fn(usize) -> bool) -> Option<(usize, usize)> {
    let mut start = None;
    let mut count = 0;
    for idx in 0..len {
        if keep(idx) {
            if start.is_none() {
                start = Some(idx);
            }
            count += 1;
        } else if start.is_some() {
            break;
        }
    }
    start.map(|s| (s, count))
}

fn block_size(native: usize, target: Option<usize>) -> usize {
    match target {
        Some(target) => {
            let target = target.max(1);
            if native > target {
                native.div_ceil(target)
            } else {
                1
            }
        }
        None => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TileBounds;
    use approx::assert_relative_eq;

    fn tile_bounds() -> TileBounds {
        TileBounds { min_lat: -46.0, max_lat: -45.0, min_lon: -68.0, max_lon: -67.0 }
    }

    /// 4x4 tile with altitudes 0..16 in row-major order.
    fn four_by_four() -> RawTile {
        let data: Vec<f64> = (0..16).map(|v| v as f64).collect();
        RawTile::new(data, 4, 4, tile_bounds(), Some(-9999.0)).unwrap()
    }

    #[test]
    fn full_resolution_passthrough() {
        let grid = ingest(&four_by_four(), None, None).unwrap();
        assert_eq!(grid.rows(), 4);
        assert_eq!(grid.cols(), 4);
        assert_eq!(grid.cells().len(), 16);
        assert_relative_eq!(grid.cells()[0].alt, 0.0);
        assert_relative_eq!(grid.cells()[15].alt, 15.0);
    }

    #[test]
    fn four_by_four_coarsens_to_block_means() {
        let limit = GridLimit { max_rows: 2, max_cols: 2 };
        let grid = ingest(&four_by_four(), None, Some(&limit)).unwrap();
        assert_eq!(grid.rows(), 2);
        assert_eq!(grid.cols(), 2);
        assert_eq!(grid.cells().len(), 4);
        // Each output cell is the mean of its 2x2 source block.
        let alts: Vec<f64> = grid.cells().iter().map(|c| c.alt).collect();
        assert_relative_eq!(alts[0], (0.0 + 1.0 + 4.0 + 5.0) / 4.0);
        assert_relative_eq!(alts[1], (2.0 + 3.0 + 6.0 + 7.0) / 4.0);
        assert_relative_eq!(alts[2], (8.0 + 9.0 + 12.0 + 13.0) / 4.0);
        assert_relative_eq!(alts[3], (10.0 + 11.0 + 14.0 + 15.0) / 4.0);
    }

    #[test]
    fn no_data_samples_are_dropped() {
        let mut data: Vec<f64> = (0..16).map(|v| v as f64).collect();
        data[5] = -9999.0;
        let tile = RawTile::new(data, 4, 4, tile_bounds(), Some(-9999.0)).unwrap();
        let grid = ingest(&tile, None, None).unwrap();
        assert_eq!(grid.cells().len(), 15);
        assert!(grid.cells().iter().all(|c| c.alt != -9999.0));
    }

    #[test]
    fn all_missing_block_is_discarded() {
        let mut data: Vec<f64> = (0..16).map(|v| v as f64).collect();
        // Blank out the entire north-west 2x2 block.
        for idx in [0, 1, 4, 5] {
            data[idx] = -9999.0;
        }
        let tile = RawTile::new(data, 4, 4, tile_bounds(), Some(-9999.0)).unwrap();
        let limit = GridLimit { max_rows: 2, max_cols: 2 };
        let grid = ingest(&tile, None, Some(&limit)).unwrap();
        assert_eq!(grid.cells().len(), 3);
    }

    #[test]
    fn partial_block_means_skip_missing_members() {
        let mut data: Vec<f64> = (0..16).map(|v| v as f64).collect();
        data[0] = -9999.0;
        let tile = RawTile::new(data, 4, 4, tile_bounds(), Some(-9999.0)).unwrap();
        let limit = GridLimit { max_rows: 2, max_cols: 2 };
        let grid = ingest(&tile, None, Some(&limit)).unwrap();
        assert_relative_eq!(grid.cells()[0].alt, (1.0 + 4.0 + 5.0) / 3.0);
    }

    #[test]
    fn trailing_partial_blocks_are_trimmed() {
        let data: Vec<f64> = (0..25).map(|v| v as f64).collect();
        let tile = RawTile::new(data, 5, 5, tile_bounds(), None).unwrap();
        let limit = GridLimit { max_rows: 2, max_cols: 2 };
        let grid = ingest(&tile, None, Some(&limit)).unwrap();
        // ceil(5/2) = 3 per axis, so one full 3x3 block survives and the
        // remainder is trimmed rather than padded.
        assert_eq!(grid.rows(), 1);
        assert_eq!(grid.cols(), 1);
        let expected: f64 = [0.0, 1.0, 2.0, 5.0, 6.0, 7.0, 10.0, 11.0, 12.0]
            .iter()
            .sum::<f64>()
            / 9.0;
        assert_relative_eq!(grid.cells()[0].alt, expected);
    }

    #[test]
    fn coarsening_never_exceeds_target() {
        for (rows, cols) in [(1, 1), (2, 3), (3, 2), (4, 4), (10, 10)] {
            let limit = GridLimit { max_rows: rows, max_cols: cols };
            let grid = ingest(&four_by_four(), None, Some(&limit)).unwrap();
            assert!(grid.rows() <= rows.max(1));
            assert!(grid.cols() <= cols.max(1));
            assert!(grid.rows() <= 4 && grid.cols() <= 4);
        }
    }

    #[test]
    fn crop_selects_subgrid() {
        // Pixel centers sit at -45.125, -45.375, -45.625, -45.875 latitude
        // and -67.875, -67.625, -67.375, -67.125 longitude.
        let bounds = CropBounds::new(-45.25, -67.75).with_spans(0.5, 0.5);
        let grid = ingest(&four_by_four(), Some(&bounds), None).unwrap();
        assert_eq!(grid.rows(), 2);
        assert_eq!(grid.cols(), 2);
        let alts: Vec<f64> = grid.cells().iter().map(|c| c.alt).collect();
        assert_eq!(alts, vec![0.0, 1.0, 4.0, 5.0]);
    }

    #[test]
    fn crop_outside_tile_is_empty_region() {
        let bounds = CropBounds::new(10.0, 10.0);
        let err = ingest(&four_by_four(), Some(&bounds), None).unwrap_err();
        assert!(matches!(err, IngestError::EmptyRegion));
    }

    #[test]
    fn invalid_crop_span_is_malformed() {
        let bounds = CropBounds::new(-45.25, -67.75).with_spans(-1.0, 0.5);
        let err = ingest(&four_by_four(), Some(&bounds), None).unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput(_)));
    }

    #[test]
    fn ingestion_is_idempotent() {
        let limit = GridLimit { max_rows: 2, max_cols: 2 };
        let first = ingest(&four_by_four(), None, Some(&limit)).unwrap();
        let second = ingest(&four_by_four(), None, Some(&limit)).unwrap();
        assert_eq!(first.to_csv(), second.to_csv());
    }

    #[test]
    fn written_csv_matches_in_memory_cells() {
        let grid = ingest(&four_by_four(), None, None).unwrap();
        let dir = std::env::temp_dir().join(format!("sightline-core-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("grid.csv");
        grid.write_csv(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, grid.to_csv());
        assert_eq!(written.lines().count(), grid.cells().len() + 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
