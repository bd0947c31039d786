//! Server configuration from environment.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// Staging directory for uploaded and derived artifacts.
    pub staging_dir: PathBuf,
    /// Directory holding the solver executables (`los`, `solver`, `eval`).
    pub solver_bin_dir: PathBuf,
    /// Wall-clock timeout for point-to-point LOS, in seconds.
    pub los_timeout_s: u64,
    /// Wall-clock timeout for a full network solve, in seconds.
    pub solve_timeout_s: u64,
    /// Wall-clock timeout for a network evaluation, in seconds.
    pub eval_timeout_s: u64,
    /// Artifact time-to-live in seconds; 0 disables the retention sweep.
    pub artifact_ttl_s: u64,
    pub retention_sweep_interval_s: u64,
    /// Default row/column cap applied when ingesting raw elevation tiles.
    pub ingest_max_rows: usize,
    pub ingest_max_cols: usize,
    /// Maximum accepted upload body size in bytes.
    pub upload_limit_bytes: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server_port: env_var("SIGHTLINE_PORT", 3000),
            staging_dir: PathBuf::from(
                env::var("SIGHTLINE_STAGING_DIR").unwrap_or_else(|_| "uploads".to_string()),
            ),
            solver_bin_dir: PathBuf::from(
                env::var("SIGHTLINE_SOLVER_BIN_DIR")
                    .unwrap_or_else(|_| "../solver/bin".to_string()),
            ),
            los_timeout_s: env_var("SIGHTLINE_LOS_TIMEOUT_S", 10),
            solve_timeout_s: env_var("SIGHTLINE_SOLVE_TIMEOUT_S", 120),
            eval_timeout_s: env_var("SIGHTLINE_EVAL_TIMEOUT_S", 60),
            artifact_ttl_s: env_var("SIGHTLINE_ARTIFACT_TTL_S", 3600),
            retention_sweep_interval_s: env_var("SIGHTLINE_RETENTION_SWEEP_INTERVAL_S", 300),
            ingest_max_rows: env_var("SIGHTLINE_INGEST_MAX_ROWS", 512),
            ingest_max_cols: env_var("SIGHTLINE_INGEST_MAX_COLS", 512),
            upload_limit_bytes: env_var("SIGHTLINE_UPLOAD_LIMIT_BYTES", 64 * 1024 * 1024),
        }
    }
}

fn env_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
