//! Backend abstraction for container engine operations.
//!
//! The [`Engine`] trait defines the interface for interacting with a
//! container engine, allowing for different implementations (the Docker
//! CLI, an in-memory engine for testing).

pub mod docker;
#[cfg(any(test, feature = "testing"))]
pub mod memory;

use crate::error::{Error, Result};
use crate::types::{
    BuildSpec, ContainerState, ContainerSummary, ImageSummary, Mount, RunSpec, VolumeSummary,
};
use std::path::Path;

/// Where a volume is mounted inside the archive helper container.
pub const ARCHIVE_SOURCE_DIR: &str = "/data";

/// Where the destination directory is mounted inside the archive helper.
pub const ARCHIVE_DEST_DIR: &str = "/backup";

/// Backend trait for container engine operations.
///
/// Lookups return `Ok(None)` / empty lists for absent objects; mutating
/// calls on absent objects return [`Error::NotFound`].
pub trait Engine: Send + Sync {
    /// Short engine name for messages.
    fn name(&self) -> &str;

    /// Server version; fails with [`Error::EngineUnavailable`] when the
    /// CLI is missing or the daemon cannot be reached.
    fn server_version(&self) -> Result<String>;

    /// Find a container (running or stopped) by exact name.
    fn find_container(&self, name: &str) -> Result<Option<ContainerSummary>>;

    /// Inspect a container's state.
    fn container_state(&self, name: &str) -> Result<Option<ContainerState>>;

    /// Stop a running container.
    fn stop_container(&self, name: &str) -> Result<()>;

    /// Remove a stopped container.
    fn remove_container(&self, name: &str) -> Result<()>;

    /// List every tag of an image repository.
    fn list_images(&self, repository: &str) -> Result<Vec<ImageSummary>>;

    /// Remove an image by reference (`repo:tag` or id).
    fn remove_image(&self, reference: &str) -> Result<()>;

    /// Build an image. Build output goes to the terminal.
    fn build_image(&self, spec: &BuildSpec) -> Result<()>;

    /// Find a volume by exact name.
    fn find_volume(&self, name: &str) -> Result<Option<VolumeSummary>>;

    /// Create a volume.
    fn create_volume(&self, name: &str) -> Result<()>;

    /// Start a container. Detached runs return the container id, attached
    /// runs wait for exit and return captured stdout.
    fn run_container(&self, spec: &RunSpec) -> Result<String>;

    /// Last `tail` lines of a container's combined output.
    fn logs(&self, name: &str, tail: usize) -> Result<String>;

    /// Create `name` unless it exists. Returns whether it was created.
    fn ensure_volume(&self, name: &str) -> Result<bool> {
        if self.find_volume(name)?.is_some() {
            return Ok(false);
        }
        match self.create_volume(name) {
            Ok(()) => Ok(true),
            Err(Error::Conflict { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write the full contents of `volume` to `dest_dir/file_name` as a
    /// gzip-compressed tarball, using a disposable helper container.
    ///
    /// `dest_dir` must be an absolute host path.
    fn archive_volume(
        &self,
        volume: &str,
        dest_dir: &Path,
        file_name: &str,
        helper_image: &str,
    ) -> Result<()> {
        let spec = archive_spec(volume, dest_dir, file_name, helper_image);
        self.run_container(&spec).map(|_| ())
    }
}

/// Helper container that tars a volume into a host directory.
pub fn archive_spec(volume: &str, dest_dir: &Path, file_name: &str, helper_image: &str) -> RunSpec {
    RunSpec {
        image: helper_image.to_string(),
        auto_remove: true,
        mounts: vec![
            Mount::volume(volume, ARCHIVE_SOURCE_DIR).read_only(),
            Mount::host(dest_dir, ARCHIVE_DEST_DIR),
        ],
        command: vec![
            "tar".to_string(),
            "czf".to_string(),
            format!("{ARCHIVE_DEST_DIR}/{file_name}"),
            "-C".to_string(),
            ARCHIVE_SOURCE_DIR.to_string(),
            ".".to_string(),
        ],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_spec_mounts_volume_read_only() {
        let spec = archive_spec(
            "robot-sensor-data",
            Path::new("/srv/work"),
            "backup_20261018_101500.tar.gz",
            "alpine",
        );
        assert_eq!(
            spec.to_args(),
            vec![
                "--rm",
                "-v",
                "robot-sensor-data:/data:ro",
                "-v",
                "/srv/work:/backup",
                "alpine",
                "tar",
                "czf",
                "/backup/backup_20261018_101500.tar.gz",
                "-C",
                "/data",
                ".",
            ]
        );
        assert!(!spec.detach);
    }
}
