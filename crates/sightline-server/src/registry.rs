//! Artifact registry: identifier-keyed staging of uploaded and derived files.
//!
//! The registry is the only writer of the staging directory and the only
//! shared mutable state in the server. Every artifact gets a fresh UUIDv4
//! identifier and its own backing file; identifiers act as unguessable
//! capability tokens and are never reused, so deleting one artifact can
//! never invalidate another still in use by a concurrent request.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// The two recognized artifact kinds, keyed by file extension on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    ElevationGrid,
    FeatureSet,
}

impl ArtifactKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::ElevationGrid => ".csv",
            ArtifactKind::FeatureSet => ".json",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            ".csv" => Some(ArtifactKind::ElevationGrid),
            ".json" => Some(ArtifactKind::FeatureSet),
            _ => None,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ArtifactKind::ElevationGrid => "elevation grid",
            ArtifactKind::FeatureSet => "feature set",
        }
    }
}

/// A staged artifact record. The path is owned by the registry and never
/// mutated after creation.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unsupported artifact type '{0}'; only .csv and .json are allowed")]
    UnsupportedType(String),

    #[error("artifact {0} not found")]
    NotFound(String),

    #[error("artifact {id} is a {actual}, expected a {expected}")]
    KindMismatch {
        id: String,
        actual: &'static str,
        expected: &'static str,
    },

    #[error("failed to stage artifact: {0}")]
    Storage(#[from] std::io::Error),
}

pub struct Registry {
    staging_dir: PathBuf,
    artifacts: DashMap<String, Artifact>,
}

impl Registry {
    pub fn new(staging_dir: &Path) -> std::io::Result<Self> {
        fs::create_dir_all(staging_dir)?;
        Ok(Self {
            staging_dir: staging_dir.to_path_buf(),
            artifacts: DashMap::new(),
        })
    }

    /// Persist bytes under a fresh identifier. The file is written to a
    /// temporary location and renamed into place, so a failed store never
    /// leaves a partial artifact behind.
    pub fn store(&self, kind: ArtifactKind, bytes: &[u8]) -> Result<String, RegistryError> {
        let id = Uuid::new_v4().to_string();
        let path = self.staging_dir.join(format!("{}{}", id, kind.extension()));
        write_atomic(&path, bytes)?;
        self.artifacts.insert(
            id.clone(),
            Artifact {
                kind,
                path,
                created_at: Utc::now(),
            },
        );
        tracing::debug!("Staged {} artifact {}", kind.describe(), id);
        Ok(id)
    }

    /// Resolve an identifier to its backing path, checking the kind the
    /// caller requires. A kind mismatch never yields a path.
    pub fn resolve(&self, id: &str, expected: ArtifactKind) -> Result<PathBuf, RegistryError> {
        let artifact = self
            .artifacts
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if artifact.kind != expected {
            return Err(RegistryError::KindMismatch {
                id: id.to_string(),
                actual: artifact.kind.describe(),
                expected: expected.describe(),
            });
        }
        Ok(artifact.path.clone())
    }

    /// Remove an artifact and its backing file. A second delete of the same
    /// identifier reports `NotFound`.
    pub fn delete(&self, id: &str) -> Result<(), RegistryError> {
        // Removing the map entry first means no new resolve can observe the
        // artifact while its file is being unlinked. In-flight requests keep
        // the path they already resolved.
        let (_, artifact) = self
            .artifacts
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        match fs::remove_file(&artifact.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(RegistryError::Storage(err)),
        }
        tracing::debug!("Deleted artifact {}", id);
        Ok(())
    }

    /// Delete every artifact older than `ttl_s` seconds. Returns the number
    /// removed. Expiry bounds disk growth; it is not a correctness mechanism.
    pub fn sweep_expired(&self, ttl_s: u64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::seconds(ttl_s as i64);
        let expired: Vec<String> = self
            .artifacts
            .iter()
            .filter(|entry| entry.value().created_at < cutoff)
            .map(|entry| entry.key().clone())
            .collect();
        let mut removed = 0;
        for id in expired {
            if self.delete(&id).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
