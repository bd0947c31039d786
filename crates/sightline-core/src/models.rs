//! Shared value objects.

use serde::{Deserialize, Serialize};

/// A transient 3D point used by the point-to-point LOS request. Not persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lng: f64,
    pub height_m: f64,
}

impl Point {
    /// Whether the point is usable as a solver input: finite coordinates
    /// within geographic range and a non-negative height.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && self.height_m.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
            && self.height_m >= 0.0
    }
}

/// One elevation sample of a normalized grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    pub lat: f64,
    pub lng: f64,
    pub alt: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_validation_rejects_out_of_range() {
        let good = Point { lat: -45.8, lng: -67.5, height_m: 2.0 };
        assert!(good.is_valid());

        let bad_lat = Point { lat: 123.0, lng: 0.0, height_m: 2.0 };
        assert!(!bad_lat.is_valid());

        let bad_height = Point { lat: 0.0, lng: 0.0, height_m: -1.0 };
        assert!(!bad_height.is_valid());

        let nan_lng = Point { lat: 0.0, lng: f64::NAN, height_m: 2.0 };
        assert!(!nan_lng.is_valid());
    }
}
