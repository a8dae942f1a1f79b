//! Compiler cache volume
//!
//! One named volume, shared by every configuration and every run, holds
//! the ccache directory. It is created on first use and never removed.

use crate::error::{MatrixError, MatrixResult};
use crate::orchestration::{ContainerRuntime, Mount, VolumeInfo};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

/// Volume label keys used to track cache metadata
pub mod labels {
    /// Marks volume as a cmake-matrix cache
    pub const MATRIX_CACHE: &str = "io.cmake-matrix.cache";
    /// Creation timestamp (RFC3339)
    pub const CREATED_AT: &str = "io.cmake-matrix.cache.created_at";
}

/// Information about the cache volume
#[derive(Debug, Clone)]
pub struct CacheVolume {
    /// Volume name, stable for a given setting
    pub name: String,
    /// When the volume was created (if it carries our label)
    pub created_at: Option<DateTime<Utc>>,
    /// Host-side path reported by the engine
    pub mountpoint: Option<String>,
    /// Whether this run created the volume
    pub created_now: bool,
}

impl CacheVolume {
    /// Generate labels for volume creation
    pub fn creation_labels(now: DateTime<Utc>) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert(labels::MATRIX_CACHE.to_string(), "true".to_string());
        labels.insert(labels::CREATED_AT.to_string(), now.to_rfc3339());
        labels
    }

    /// Creation time comes from our label, else from the engine's own record
    fn from_info(info: VolumeInfo, created_now: bool) -> Self {
        let created_at = info
            .labels
            .get(labels::CREATED_AT)
            .or(info.created_at.as_ref())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Self {
            name: info.name,
            created_at,
            mountpoint: info.mountpoint,
            created_now,
        }
    }

    /// Mount specification for the ccache directory
    pub fn mount(&self, mount_path: &str) -> Mount {
        Mount::volume(self.name.clone(), mount_path)
    }
}

/// Make sure the named cache volume exists, creating it if needed
pub async fn ensure_cache_volume(
    runtime: &dyn ContainerRuntime,
    name: &str,
) -> MatrixResult<CacheVolume> {
    if let Some(info) = runtime.volume_inspect(name).await? {
        debug!("Reusing cache volume: {}", name);
        return Ok(CacheVolume::from_info(info, false));
    }

    info!("Creating cache volume: {}", name);
    runtime
        .volume_create(name, &CacheVolume::creation_labels(Utc::now()))
        .await?;

    let info = runtime
        .volume_inspect(name)
        .await?
        .ok_or_else(|| MatrixError::CacheVolumeCreate {
            name: name.to_string(),
            reason: "volume missing right after creation".to_string(),
        })?;

    Ok(CacheVolume::from_info(info, true))
}
