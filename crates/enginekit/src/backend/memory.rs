//! In-memory engine for tests.
//!
//! Mirrors the engine behaviors callers rely on: names are unique, a
//! running container cannot be removed, an image referenced by a container
//! cannot be removed, stopping an exited container succeeds, and missing
//! targets report [`Error::NotFound`]. Volume archives are written
//! as real `.tar.gz` files so backups can be inspected.

use crate::backend::Engine;
use crate::error::{Error, Result};
use crate::types::{
    BuildSpec, ContainerState, ContainerSummary, ImageSummary, RunSpec, VolumeSummary,
};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct MemContainer {
    id: String,
    name: String,
    image: String,
    running: bool,
    exit_code: i64,
    logs: Vec<String>,
}

#[derive(Debug, Clone)]
struct MemImage {
    id: String,
    repository: String,
    tag: String,
}

impl MemImage {
    fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

#[derive(Debug, Default)]
struct State {
    available: bool,
    next_id: u64,
    containers: Vec<MemContainer>,
    images: Vec<MemImage>,
    volumes: BTreeMap<String, Vec<(String, Vec<u8>)>>,
    calls: Vec<String>,
    fail_build: bool,
    fail_archive: bool,
    exit_on_start: Option<i64>,
    start_logs: Vec<String>,
}

impl State {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:012x}", self.next_id)
    }

    fn container(&self, name: &str) -> Option<&MemContainer> {
        self.containers.iter().find(|c| c.name == name)
    }
}

/// Engine that keeps containers, images and volumes in memory.
pub struct MemoryEngine {
    state: Mutex<State>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// An empty, reachable engine.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                available: true,
                ..Default::default()
            }),
        }
    }

    /// Engine whose daemon cannot be reached.
    pub fn unavailable() -> Self {
        let engine = Self::new();
        engine.lock().available = false;
        engine
    }

    /// Make image builds fail.
    pub fn failing_build(self) -> Self {
        self.lock().fail_build = true;
        self
    }

    /// Make archive helpers fail.
    pub fn failing_archive(self) -> Self {
        self.lock().fail_archive = true;
        self
    }

    /// Containers exit with `code` right after starting.
    pub fn exiting_on_start(self, code: i64) -> Self {
        self.lock().exit_on_start = Some(code);
        self
    }

    /// Output every new container starts with.
    pub fn with_start_logs(self, lines: &[&str]) -> Self {
        self.lock().start_logs = lines.iter().map(ToString::to_string).collect();
        self
    }

    /// Add a file to a volume, creating the volume if needed.
    pub fn with_volume_file(self, volume: &str, path: &str, contents: &[u8]) -> Self {
        self.lock()
            .volumes
            .entry(volume.to_string())
            .or_default()
            .push((path.to_string(), contents.to_vec()));
        self
    }

    /// Operations performed so far, e.g. `"stop api"`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of containers named `name` (running or not).
    pub fn container_count(&self, name: &str) -> usize {
        self.lock()
            .containers
            .iter()
            .filter(|c| c.name == name)
            .count()
    }

    /// Number of running containers named `name`.
    pub fn running_count(&self, name: &str) -> usize {
        self.lock()
            .containers
            .iter()
            .filter(|c| c.name == name && c.running)
            .count()
    }

    /// Number of images in `repository`.
    pub fn image_count(&self, repository: &str) -> usize {
        self.lock()
            .images
            .iter()
            .filter(|i| i.repository == repository)
            .count()
    }

    /// Whether volume `name` exists.
    pub fn has_volume(&self, name: &str) -> bool {
        self.lock().volumes.contains_key(name)
    }

    /// Simulate the container's process exiting.
    pub fn kill(&self, name: &str, exit_code: i64) {
        let mut state = self.lock();
        if let Some(c) = state.containers.iter_mut().find(|c| c.name == name) {
            c.running = false;
            c.exit_code = exit_code;
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Lock, record the call, and fail if the daemon is down.
    fn enter(&self, call: String) -> Result<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.available {
            Ok(state)
        } else {
            Err(Error::EngineUnavailable {
                message: "Cannot connect to the in-memory engine".to_string(),
            })
        }
    }
}

fn normalize_reference(reference: &str) -> String {
    if reference.contains(':') {
        reference.to_string()
    } else {
        format!("{reference}:latest")
    }
}

fn write_archive(path: &Path, files: &[(String, Vec<u8>)]) -> std::io::Result<()> {
    let file = File::create(path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, contents.as_slice())?;
    }
    builder.into_inner()?.finish()?;
    Ok(())
}

impl Engine for MemoryEngine {
    fn name(&self) -> &str {
        "memory"
    }

    fn server_version(&self) -> Result<String> {
        self.enter("version".to_string())?;
        Ok("0.0.0-memory".to_string())
    }

    fn find_container(&self, name: &str) -> Result<Option<ContainerSummary>> {
        let state = self.enter(format!("ps {name}"))?;
        Ok(state.container(name).map(|c| ContainerSummary {
            id: c.id.clone(),
            names: c.name.clone(),
            image: c.image.clone(),
            state: (if c.running { "running" } else { "exited" }).to_string(),
            status: if c.running {
                "Up".to_string()
            } else {
                format!("Exited ({})", c.exit_code)
            },
        }))
    }

    fn container_state(&self, name: &str) -> Result<Option<ContainerState>> {
        let state = self.enter(format!("inspect {name}"))?;
        Ok(state.container(name).map(|c| ContainerState {
            status: (if c.running { "running" } else { "exited" }).to_string(),
            running: c.running,
            restarting: false,
            exit_code: c.exit_code,
            started_at: String::new(),
        }))
    }

    fn stop_container(&self, name: &str) -> Result<()> {
        let mut state = self.enter(format!("stop {name}"))?;
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::NotFound {
                kind: "container",
                name: name.to_string(),
            })?;
        // Stopping an exited container succeeds, as with the real engine
        container.running = false;
        Ok(())
    }

    fn remove_container(&self, name: &str) -> Result<()> {
        let mut state = self.enter(format!("rm {name}"))?;
        match state.container(name).map(|c| c.running) {
            None => Err(Error::NotFound {
                kind: "container",
                name: name.to_string(),
            }),
            Some(true) => Err(Error::Conflict {
                message: format!("cannot remove running container {name}"),
            }),
            Some(false) => {
                state.containers.retain(|c| c.name != name);
                Ok(())
            }
        }
    }

    fn list_images(&self, repository: &str) -> Result<Vec<ImageSummary>> {
        let state = self.enter(format!("images {repository}"))?;
        Ok(state
            .images
            .iter()
            .filter(|i| i.repository == repository)
            .map(|i| ImageSummary {
                id: i.id.clone(),
                repository: i.repository.clone(),
                tag: i.tag.clone(),
                size: "0B".to_string(),
            })
            .collect())
    }

    fn remove_image(&self, reference: &str) -> Result<()> {
        let mut state = self.enter(format!("rmi {reference}"))?;
        let reference = normalize_reference(reference);
        if !state.images.iter().any(|i| i.reference() == reference) {
            return Err(Error::NotFound {
                kind: "image",
                name: reference,
            });
        }
        if state.containers.iter().any(|c| c.image == reference) {
            return Err(Error::Conflict {
                message: format!("image {reference} is being used by a container"),
            });
        }
        state.images.retain(|i| i.reference() != reference);
        Ok(())
    }

    fn build_image(&self, spec: &BuildSpec) -> Result<()> {
        let mut state = self.enter(format!("build {}", spec.tag))?;
        if state.fail_build {
            return Err(Error::CommandFailed {
                message: format!("build of {} failed", spec.tag),
                stderr: "exit code 1".to_string(),
            });
        }
        let reference = normalize_reference(&spec.tag);
        let (repository, tag) = reference
            .rsplit_once(':')
            .map(|(r, t)| (r.to_string(), t.to_string()))
            .ok_or_else(|| Error::Parse(format!("bad tag {reference}")))?;
        let id = state.next_id();
        state.images.retain(|i| i.reference() != reference);
        state.images.push(MemImage { id, repository, tag });
        Ok(())
    }

    fn find_volume(&self, name: &str) -> Result<Option<VolumeSummary>> {
        let state = self.enter(format!("volume ls {name}"))?;
        Ok(state.volumes.contains_key(name).then(|| VolumeSummary {
            name: name.to_string(),
            driver: "local".to_string(),
        }))
    }

    fn create_volume(&self, name: &str) -> Result<()> {
        let mut state = self.enter(format!("volume create {name}"))?;
        state.volumes.entry(name.to_string()).or_default();
        Ok(())
    }

    fn run_container(&self, spec: &RunSpec) -> Result<String> {
        let mut state = self.enter(format!(
            "run {}",
            spec.name.as_deref().unwrap_or(&spec.image)
        ))?;
        let image = normalize_reference(&spec.image);
        if !state.images.iter().any(|i| i.reference() == image) {
            return Err(Error::NotFound {
                kind: "image",
                name: image,
            });
        }
        if let Some(name) = &spec.name
            && state.container(name).is_some()
        {
            return Err(Error::Conflict {
                message: format!("the container name \"/{name}\" is already in use"),
            });
        }

        let id = state.next_id();
        let exit = state.exit_on_start;
        let logs = state.start_logs.clone();
        state.containers.push(MemContainer {
            id: id.clone(),
            name: spec.name.clone().unwrap_or_else(|| id.clone()),
            image,
            running: exit.is_none(),
            exit_code: exit.unwrap_or(0),
            logs,
        });
        Ok(id)
    }

    fn logs(&self, name: &str, tail: usize) -> Result<String> {
        let state = self.enter(format!("logs {name}"))?;
        let container = state.container(name).ok_or_else(|| Error::NotFound {
            kind: "container",
            name: name.to_string(),
        })?;
        let skip = container.logs.len().saturating_sub(tail);
        Ok(container.logs[skip..].join("\n"))
    }

    fn archive_volume(
        &self,
        volume: &str,
        dest_dir: &Path,
        file_name: &str,
        _helper_image: &str,
    ) -> Result<()> {
        let state = self.enter(format!("archive {volume}"))?;
        if state.fail_archive {
            return Err(Error::CommandFailed {
                message: format!("archive of {volume} failed"),
                stderr: "tar: write error".to_string(),
            });
        }
        let files = state.volumes.get(volume).ok_or_else(|| Error::NotFound {
            kind: "volume",
            name: volume.to_string(),
        })?;
        write_archive(&dest_dir.join(file_name), files)?;
        Ok(())
    }
}
