//! Compute dispatch: bridges HTTP requests to the external solver binaries.
//!
//! The solver is an independently-built program reachable only through a
//! stable argument/stdout contract: `-f <elevation-csv>` always, `-g
//! <features-json>` for network operations, `-p1 lat lng h -p2 lat lng h`
//! for point-to-point, and `-o json` to force machine-readable output.
//! Exit 0 means stdout is a single JSON value; anything else is a failure
//! with the diagnostic on stderr. The dispatcher never reads or writes
//! artifact storage itself; it only passes paths resolved by the registry.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;

use sightline_core::Point;

use crate::config::Config;
use crate::registry::{ArtifactKind, Registry, RegistryError};

/// The three solver operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    PointToPointLos,
    NetworkSolve,
    NetworkEvaluate,
}

impl Operation {
    pub fn binary_name(&self) -> &'static str {
        match self {
            Operation::PointToPointLos => "los",
            Operation::NetworkSolve => "solver",
            Operation::NetworkEvaluate => "eval",
        }
    }

    /// Per-operation wall-clock budget; a full network solve is far more
    /// expensive than a two-point query.
    pub fn timeout(&self, config: &Config) -> Duration {
        let secs = match self {
            Operation::PointToPointLos => config.los_timeout_s,
            Operation::NetworkSolve => config.solve_timeout_s,
            Operation::NetworkEvaluate => config.eval_timeout_s,
        };
        Duration::from_secs(secs.max(1))
    }
}

/// A fully-specified compute request. Constructors encode which artifact
/// kinds and parameters each operation requires.
#[derive(Debug)]
pub struct ComputeRequest {
    operation: Operation,
    em_file_id: String,
    features_file_id: Option<String>,
    points: Option<(Point, Point)>,
}

impl ComputeRequest {
    pub fn point_to_point(em_file_id: String, p1: Point, p2: Point) -> Self {
        Self {
            operation: Operation::PointToPointLos,
            em_file_id,
            features_file_id: None,
            points: Some((p1, p2)),
        }
    }

    pub fn network(operation: Operation, em_file_id: String, features_file_id: String) -> Self {
        debug_assert!(operation != Operation::PointToPointLos);
        Self {
            operation,
            em_file_id,
            features_file_id: Some(features_file_id),
            points: None,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Artifact resolution failed; reported as the registry's error, never
    /// wrapped as a solver failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("solver did not finish within {}s and was terminated", .0.as_secs())]
    Timeout(Duration),

    #[error("failed to start solver '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },

    #[error("solver I/O error: {0}")]
    Io(#[from] io::Error),

    /// Nonzero exit; carries the process's stderr verbatim.
    #[error("solver exited with status {status}: {stderr}")]
    ExecutionFailed { status: i32, stderr: String },

    /// Zero exit but stdout did not parse as JSON; carries raw stdout so a
    /// schema mismatch can be diagnosed.
    #[error("solver produced invalid output: {stdout}")]
    Protocol { stdout: String },
}

pub struct Dispatcher {
    config: Config,
}

impl Dispatcher {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Resolve artifacts, invoke the solver under the operation's timeout,
    /// and translate its exit status and stdout into a typed result.
    pub async fn dispatch(
        &self,
        registry: &Registry,
        request: &ComputeRequest,
    ) -> Result<serde_json::Value, DispatchError> {
        // Resolve every referenced identifier before the process is started,
        // so registry failures abort without spawning anything.
        let em_path = registry.resolve(&request.em_file_id, ArtifactKind::ElevationGrid)?;
        let features_path = match &request.features_file_id {
            Some(id) => Some(registry.resolve(id, ArtifactKind::FeatureSet)?),
            None => None,
        };

        let binary = self.config.solver_bin_dir.join(request.operation.binary_name());
        let deadline = request.operation.timeout(&self.config);
        let output = run_solver(&binary, &em_path, features_path.as_deref(), request, deadline)
            .await?;

        if !output.status_success {
            return Err(DispatchError::ExecutionFailed {
                status: output.status_code,
                stderr: output.stderr,
            });
        }

        serde_json::from_str(output.stdout.trim())
            .map_err(|_| DispatchError::Protocol { stdout: output.stdout })
    }
}

struct SolverOutput {
    status_success: bool,
    status_code: i32,
    stdout: String,
    stderr: String,
}

async fn run_solver(
    binary: &Path,
    em_path: &Path,
    features_path: Option<&Path>,
    request: &ComputeRequest,
    deadline: Duration,
) -> Result<SolverOutput, DispatchError> {
    let mut cmd = Command::new(binary);
    cmd.arg("-f").arg(em_path);
    if let Some(path) = features_path {
        cmd.arg("-g").arg(path);
    }
    if let Some((p1, p2)) = &request.points {
        cmd.arg("-p1")
            .args([p1.lat.to_string(), p1.lng.to_string(), p1.height_m.to_string()]);
        cmd.arg("-p2")
            .args([p2.lat.to_string(), p2.lng.to_string(), p2.height_m.to_string()]);
    }
    cmd.arg("-o").arg("json");
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!("Invoking solver: {:?}", cmd.as_std());

    let mut child = cmd.spawn().map_err(|source| DispatchError::Spawn {
        binary: binary.display().to_string(),
        source,
    })?;

    // Drain the pipes concurrently with the wait; a solver writing more than
    // a pipe buffer of output would otherwise deadlock against us.
    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("child stderr was not captured"))?;
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let status = match timeout(deadline, child.wait()).await {
        Ok(status) => status?,
        Err(_) => {
            // Kill and reap before reporting, so no orphan survives the
            // failure. start_kill can only fail if the child already exited.
            let _ = child.start_kill();
            let _ = child.wait().await;
            stdout_task.abort();
            stderr_task.abort();
            tracing::warn!(
                "Solver {} timed out after {:?} and was killed",
                binary.display(),
                deadline
            );
            return Err(DispatchError::Timeout(deadline));
        }
    };

    let stdout_buf = stdout_task.await.map_err(io::Error::other)??;
    let stderr_buf = stderr_task.await.map_err(io::Error::other)??;

    Ok(SolverOutput {
        status_success: status.success(),
        status_code: status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
    })
}
