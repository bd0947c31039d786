//! REST API routes.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use sightline_core::{ingest, parse_feature_set, CropBounds, GridLimit, Point, RawTile};

use crate::api::error::ApiError;
use crate::config::Config;
use crate::dispatch::{ComputeRequest, Operation};
use crate::registry::ArtifactKind;
use crate::state::AppState;

/// Create the API router.
pub fn create_router(config: &Config) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/upload", post(upload))
        .route("/api/delete", post(delete_artifact))
        .route("/api/los", post(los))
        .route("/api/solve", post(solve))
        .route("/api/eval", post(eval))
        .layer(DefaultBodyLimit::max(config.upload_limit_bytes))
}

// === Request/Response types ===

#[derive(Debug, Serialize)]
struct UploadResponse {
    upload_id: String,
    extension: String,
    /// Cell count preview for ingested raw tiles.
    #[serde(skip_serializing_if = "Option::is_none")]
    rows: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct DeleteRequest {
    upload_id: String,
    extension: String,
}

#[derive(Debug, Deserialize)]
struct LosRequest {
    em_file_id: String,
    p1: Point,
    p2: Point,
}

#[derive(Debug, Deserialize)]
struct NetworkRequest {
    em_file_id: String,
    features_file_id: String,
}

// === Handlers ===

/// Accepts an elevation CSV, a feature-set JSON, or a raw GeoTIFF elevation
/// tile. Raw tiles are normalized through ingestion (optional crop/coarsen
/// text fields) and staged as a derived `.csv` grid artifact.
async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut params: HashMap<String, String> = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::Validation(format!("malformed multipart body: {err}")))?
    {
        if let Some(file_name) = field.file_name() {
            let file_name = file_name.to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|err| ApiError::Validation(format!("failed to read upload: {err}")))?;
            file = Some((file_name, bytes.to_vec()));
        } else if let Some(name) = field.name() {
            let name = name.to_string();
            let value = field
                .text()
                .await
                .map_err(|err| ApiError::Validation(format!("failed to read field: {err}")))?;
            params.insert(name, value);
        }
    }

    let (file_name, bytes) = file
        .ok_or_else(|| ApiError::Validation("missing file field in multipart body".to_string()))?;
    let extension = extension_of(&file_name)?;

    match extension.as_str() {
        ".csv" => {
            let upload_id = state.registry.store(ArtifactKind::ElevationGrid, &bytes)?;
            tracing::info!("File uploaded: {}", upload_id);
            Ok(Json(UploadResponse { upload_id, extension, rows: None }))
        }
        ".json" => {
            parse_feature_set(&bytes)?;
            let upload_id = state.registry.store(ArtifactKind::FeatureSet, &bytes)?;
            tracing::info!("File uploaded: {}", upload_id);
            Ok(Json(UploadResponse { upload_id, extension, rows: None }))
        }
        ".tif" | ".tiff" => {
            let tile = RawTile::from_bytes(&bytes)?;
            let bounds = crop_bounds_from_params(&params)?;
            let limit = GridLimit {
                max_rows: param_usize(&params, "max_rows")?
                    .unwrap_or(state.config.ingest_max_rows)
                    .min(state.config.ingest_max_rows),
                max_cols: param_usize(&params, "max_cols")?
                    .unwrap_or(state.config.ingest_max_cols)
                    .min(state.config.ingest_max_cols),
            };
            let grid = ingest(&tile, bounds.as_ref(), Some(&limit))?;
            let upload_id = state
                .registry
                .store(ArtifactKind::ElevationGrid, grid.to_csv().as_bytes())?;
            tracing::info!(
                "Tile ingested as {} ({} cells, {}x{})",
                upload_id,
                grid.cells().len(),
                grid.rows(),
                grid.cols()
            );
            Ok(Json(UploadResponse {
                upload_id,
                // The staged artifact is the derived grid, not the raw tile.
                extension: ".csv".to_string(),
                rows: Some(grid.cells().len()),
            }))
        }
        other => Err(ApiError::Validation(format!(
            "Invalid file type '{other}'. Only CSV, JSON, and GeoTIFF are allowed."
        ))),
    }
}

async fn delete_artifact(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<Value>, ApiError> {
    let kind = ArtifactKind::from_extension(&req.extension).ok_or_else(|| {
        ApiError::Validation("Invalid extension. Only .csv and .json are allowed.".to_string())
    })?;
    // The kind check keeps a grid id from being deleted through a feature-set
    // shaped request; the delete itself is keyed by identifier alone.
    state.registry.resolve(&req.upload_id, kind)?;
    state.registry.delete(&req.upload_id)?;
    tracing::info!("File deleted: {}", req.upload_id);
    Ok(Json(json!({ "detail": "File deleted successfully." })))
}

async fn los(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LosRequest>,
) -> Result<Json<Value>, ApiError> {
    for (label, point) in [("p1", &req.p1), ("p2", &req.p2)] {
        if !point.is_valid() {
            return Err(ApiError::Validation(format!(
                "{label} must have lat in [-90, 90], lng in [-180, 180], and height_m >= 0"
            )));
        }
    }
    let request = ComputeRequest::point_to_point(req.em_file_id, req.p1, req.p2);
    let result = state.dispatcher.dispatch(&state.registry, &request).await?;
    Ok(Json(result))
}

async fn solve(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NetworkRequest>,
) -> Result<Json<Value>, ApiError> {
    dispatch_network(&state, Operation::NetworkSolve, req).await
}

async fn eval(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NetworkRequest>,
) -> Result<Json<Value>, ApiError> {
    dispatch_network(&state, Operation::NetworkEvaluate, req).await
}

async fn dispatch_network(
    state: &AppState,
    operation: Operation,
    req: NetworkRequest,
) -> Result<Json<Value>, ApiError> {
    let request = ComputeRequest::network(operation, req.em_file_id, req.features_file_id);
    let result = state.dispatcher.dispatch(&state.registry, &request).await?;
    Ok(Json(result))
}

// === Helpers ===

fn extension_of(file_name: &str) -> Result<String, ApiError> {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .ok_or_else(|| {
            ApiError::Validation(format!("file name '{file_name}' has no extension"))
        })
}

fn crop_bounds_from_params(
    params: &HashMap<String, String>,
) -> Result<Option<CropBounds>, ApiError> {
    let lat_center = param_f64(params, "lat_center")?;
    let lng_center = param_f64(params, "lng_center")?;
    match (lat_center, lng_center) {
        (Some(lat), Some(lng)) => {
            let mut bounds = CropBounds::new(lat, lng);
            if let Some(span) = param_f64(params, "lat_span")? {
                bounds.lat_span = span;
            }
            if let Some(span) = param_f64(params, "lng_span")? {
                bounds.lng_span = span;
            }
            Ok(Some(bounds))
        }
        (None, None) => Ok(None),
        _ => Err(ApiError::Validation(
            "lat_center and lng_center must be provided together".to_string(),
        )),
    }
}

fn param_f64(params: &HashMap<String, String>, key: &str) -> Result<Option<f64>, ApiError> {
    params
        .get(key)
        .map(|raw| {
            raw.parse::<f64>()
                .map_err(|_| ApiError::Validation(format!("field '{key}' must be a number")))
        })
        .transpose()
}

fn param_usize(params: &HashMap<String, String>, key: &str) -> Result<Option<usize>, ApiError> {
    params
        .get(key)
        .map(|raw| {
            raw.parse::<usize>()
                .map_err(|_| ApiError::Validation(format!("field '{key}' must be a positive integer")))
        })
        .transpose()
}
