//! Core types: engine records and launch specifications.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One line of `docker ps --format '{{json .}}'`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    /// Short container id
    #[serde(rename = "ID")]
    pub id: String,
    /// Comma-separated container names
    #[serde(rename = "Names")]
    pub names: String,
    /// Image the container was created from
    #[serde(rename = "Image", default)]
    pub image: String,
    /// Machine state ("running", "exited", "created", ...)
    #[serde(rename = "State", default)]
    pub state: String,
    /// Human status ("Up 2 minutes", "Exited (1) 3 seconds ago")
    #[serde(rename = "Status", default)]
    pub status: String,
}

impl ContainerSummary {
    /// Whether `name` is exactly one of this container's names.
    pub fn has_name(&self, name: &str) -> bool {
        self.names
            .split(',')
            .map(|n| n.trim().trim_start_matches('/'))
            .any(|n| n == name)
    }

    /// Whether the container is currently running.
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// `State` object from `docker inspect`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    /// "created", "running", "restarting", "exited", "paused", "dead"
    pub status: String,
    /// Whether the main process is alive
    pub running: bool,
    /// Whether the engine is restarting the container
    #[serde(default)]
    pub restarting: bool,
    /// Exit code of the last run
    #[serde(default)]
    pub exit_code: i64,
    /// RFC 3339 start time
    #[serde(default)]
    pub started_at: String,
}

impl ContainerState {
    /// Running and not in a restart loop.
    pub fn is_up(&self) -> bool {
        self.running && !self.restarting
    }

    /// The container stopped and will not come back on its own.
    pub fn has_stopped(&self) -> bool {
        !self.running && matches!(self.status.as_str(), "exited" | "dead")
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_stopped() {
            write!(f, "{} (exit code {})", self.status, self.exit_code)
        } else {
            write!(f, "{}", self.status)
        }
    }
}

/// One line of `docker images --format '{{json .}}'`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSummary {
    /// Short image id
    #[serde(rename = "ID")]
    pub id: String,
    /// Repository name
    #[serde(rename = "Repository")]
    pub repository: String,
    /// Tag, or `<none>`
    #[serde(rename = "Tag")]
    pub tag: String,
    /// Human-readable size
    #[serde(rename = "Size", default)]
    pub size: String,
}

impl ImageSummary {
    /// Reference usable with `rmi`: `repo:tag`, or the id for dangling tags.
    pub fn reference(&self) -> String {
        if self.tag.is_empty() || self.tag == "<none>" {
            self.id.clone()
        } else {
            format!("{}:{}", self.repository, self.tag)
        }
    }
}

/// One line of `docker volume ls --format '{{json .}}'`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSummary {
    /// Volume name
    #[serde(rename = "Name")]
    pub name: String,
    /// Volume driver
    #[serde(rename = "Driver", default)]
    pub driver: String,
}

/// Host-to-container TCP port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    /// Port published on the host
    pub host: u16,
    /// Port inside the container
    pub container: u16,
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

/// Source of a mount: an engine volume or a host directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSource {
    /// Named engine volume
    Volume(String),
    /// Absolute host path
    HostPath(PathBuf),
}

/// A mount attached to a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// What is mounted
    pub source: MountSource,
    /// Path inside the container
    pub target: String,
    /// Mount read-only
    pub read_only: bool,
}

impl Mount {
    /// Mount a named volume.
    pub fn volume(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: MountSource::Volume(name.into()),
            target: target.into(),
            read_only: false,
        }
    }

    /// Bind-mount a host directory.
    pub fn host(path: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: MountSource::HostPath(path.into()),
            target: target.into(),
            read_only: false,
        }
    }

    /// Make the mount read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// `-v` argument for the engine CLI.
    pub fn to_arg(&self) -> String {
        let source = match &self.source {
            MountSource::Volume(name) => name.clone(),
            MountSource::HostPath(path) => path.display().to_string(),
        };
        if self.read_only {
            format!("{}:{}:ro", source, self.target)
        } else {
            format!("{}:{}", source, self.target)
        }
    }
}

/// Everything needed to start a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSpec {
    /// Image reference
    pub image: String,
    /// Container name
    pub name: Option<String>,
    /// Run in the background and return the container id
    pub detach: bool,
    /// Remove the container when it exits
    pub auto_remove: bool,
    /// Restart policy ("unless-stopped", "always", ...)
    pub restart: Option<String>,
    /// Published ports
    pub ports: Vec<PortMapping>,
    /// Volumes and bind mounts
    pub mounts: Vec<Mount>,
    /// Environment variables
    pub env: Vec<(String, String)>,
    /// Command override
    pub command: Vec<String>,
}

impl RunSpec {
    /// Arguments following `docker run`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.detach {
            args.push("-d".to_string());
        }
        if self.auto_remove {
            args.push("--rm".to_string());
        }
        if let Some(name) = &self.name {
            args.push("--name".to_string());
            args.push(name.clone());
        }
        if let Some(restart) = &self.restart {
            args.push("--restart".to_string());
            args.push(restart.clone());
        }
        for port in &self.ports {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        for mount in &self.mounts {
            args.push("-v".to_string());
            args.push(mount.to_arg());
        }
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

/// Image build request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    /// Build context directory
    pub context: PathBuf,
    /// Recipe file, relative to the context
    pub dockerfile: String,
    /// Tag to apply (`name:tag`)
    pub tag: String,
}

impl BuildSpec {
    /// Arguments following `docker build`.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "-t".to_string(),
            self.tag.clone(),
            "-f".to_string(),
            self.context.join(&self.dockerfile).display().to_string(),
            self.context.display().to_string(),
        ]
    }
}
