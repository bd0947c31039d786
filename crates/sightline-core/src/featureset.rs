//! GeoJSON feature-set validation.
//!
//! The solver consumes network nodes as a GeoJSON FeatureCollection of Point
//! features. Uploads are validated here before they are staged, so a compute
//! request never hands the solver a feature it cannot use: every feature must
//! carry a Point geometry and a numeric antenna height.

use serde_json::Value;

use crate::error::FeatureSetError;

/// A validated network node.
#[derive(Debug, Clone)]
pub struct Feature {
    pub lat: f64,
    pub lng: f64,
    pub height_m: f64,
}

/// Parse and validate an uploaded feature-set document.
pub fn parse_feature_set(bytes: &[u8]) -> Result<Vec<Feature>, FeatureSetError> {
    let doc: Value = serde_json::from_slice(bytes)
        .map_err(|err| FeatureSetError::Invalid(err.to_string()))?;

    if doc.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        return Err(FeatureSetError::Invalid(
            "root type is not FeatureCollection".to_string(),
        ));
    }

    let features = doc
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| FeatureSetError::Invalid("missing features array".to_string()))?;

    features
        .iter()
        .enumerate()
        .map(|(index, feature)| parse_feature(index, feature))
        .collect()
}

fn parse_feature(index: usize, feature: &Value) -> Result<Feature, FeatureSetError> {
    let invalid = |reason: &str| FeatureSetError::InvalidFeature {
        index,
        reason: reason.to_string(),
    };

    if feature.get("type").and_then(Value::as_str) != Some("Feature") {
        return Err(invalid("missing or incorrect 'type'"));
    }

    let geometry = feature.get("geometry").ok_or_else(|| invalid("missing geometry"))?;
    if geometry.get("type").and_then(Value::as_str) != Some("Point") {
        return Err(invalid("only Point geometries are supported"));
    }

    let coords = geometry
        .get("coordinates")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("missing coordinates"))?;
    if coords.len() < 2 {
        return Err(invalid("coordinates must hold at least [lng, lat]"));
    }
    // GeoJSON coordinate order is [lng, lat].
    let lng = coords[0].as_f64().ok_or_else(|| invalid("longitude is not a number"))?;
    let lat = coords[1].as_f64().ok_or_else(|| invalid("latitude is not a number"))?;

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(invalid("coordinates out of geographic range"));
    }

    let properties = feature
        .get("properties")
        .ok_or_else(|| invalid("missing properties"))?;
    let height_m = properties
        .get("height_m")
        .or_else(|| properties.get("height"))
        .and_then(Value::as_f64)
        .ok_or_else(|| invalid("missing numeric height_m property"))?;

    if !height_m.is_finite() || height_m < 0.0 {
        return Err(invalid("height_m must be a non-negative number"));
    }

    Ok(Feature { lat, lng, height_m })
}
