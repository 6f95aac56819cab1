//! Deployment stages against a container engine.
//!
//! Each stage is a method on [`Orchestrator`] that talks to the engine and
//! the service, returns a report, and prints nothing. Commands decide what
//! to show and in which order stages run.

use chrono::NaiveDateTime;
use enginekit::poll::LogCallback;
use enginekit::{
    Attempt, BuildSpec, Engine, ErrorCategory, Mount, PollError, PortMapping, RunSpec, poll_until,
};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::DeployConfig;
use crate::probe::Probe;

/// Endpoints checked by the smoke stage, with the statuses that pass.
///
/// `/sensors/latest` and `/actions/latest` answer 404 until the robot has
/// posted data, which is a healthy state for a fresh deployment.
pub const SMOKE_CHECKS: &[(&str, &[u16])] = &[
    ("/", &[200]),
    ("/sensors/latest", &[200, 404]),
    ("/actions/latest", &[200, 404]),
    ("/docs", &[200]),
    ("/openapi.json", &[200]),
];

/// Fatal stage failures.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("{} ({})", .0, .0.category().advice())]
    EngineUnavailable(#[source] enginekit::Error),

    #[error("Required file missing: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Image build failed for {image}")]
    BuildFailed {
        image: String,
        #[source]
        source: enginekit::Error,
    },

    #[error("Failed to start container {name}")]
    StartFailed {
        name: String,
        #[source]
        source: enginekit::Error,
    },

    #[error("Container {name} is not running ({state})")]
    NotRunning {
        name: String,
        state: String,
        logs: Option<String>,
    },

    #[error("{url} did not respond within {}s: {last}", .waited.as_secs())]
    ReadinessTimeout {
        url: String,
        waited: Duration,
        last: String,
        logs: Option<String>,
    },

    #[error("{failed} of {total} smoke checks failed")]
    SmokeFailed { failed: usize, total: usize },

    #[error("Backup failed: {0}")]
    Backup(String),

    #[error(transparent)]
    Engine(#[from] enginekit::Error),
}

impl DeployError {
    /// Container output captured when the failure was detected.
    pub fn logs(&self) -> Option<&str> {
        match self {
            DeployError::NotRunning { logs, .. } | DeployError::ReadinessTimeout { logs, .. } => {
                logs.as_deref()
            }
            _ => None,
        }
    }

    fn with_logs(mut self, captured: Option<String>) -> Self {
        match &mut self {
            DeployError::NotRunning { logs, .. } | DeployError::ReadinessTimeout { logs, .. } => {
                *logs = captured;
            }
            _ => {}
        }
        self
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;

/// What cleanup removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub container_stopped: bool,
    pub container_removed: bool,
    pub images_removed: Vec<String>,
    /// Images left behind because something still uses them
    pub images_in_use: Vec<String>,
}

impl CleanupReport {
    pub fn is_noop(&self) -> bool {
        !self.container_removed && self.images_removed.is_empty() && self.images_in_use.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub container_id: String,
    pub volume_created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub status: u16,
    pub attempts: u32,
    pub elapsed: Duration,
    pub logs: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeCheck {
    pub path: &'static str,
    /// Status received, or why no response arrived
    pub outcome: std::result::Result<u16, String>,
    pub passed: bool,
    pub body: String,
}

/// Current state of the deployment, for `--status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub engine_version: String,
    pub container: Option<String>,
    pub images: Vec<String>,
    pub volume_exists: bool,
    pub responding: Option<u16>,
}

/// `backup_<YYYYMMDD_HHMMSS>.tar.gz`
pub fn backup_file_name(now: NaiveDateTime) -> String {
    format!("backup_{}.tar.gz", now.format("%Y%m%d_%H%M%S"))
}

pub struct Orchestrator<'a> {
    engine: &'a dyn Engine,
    probe: &'a dyn Probe,
    config: &'a DeployConfig,
}

impl<'a> Orchestrator<'a> {
    pub fn new(engine: &'a dyn Engine, probe: &'a dyn Probe, config: &'a DeployConfig) -> Self {
        Self {
            engine,
            probe,
            config,
        }
    }

    pub fn config(&self) -> &DeployConfig {
        self.config
    }

    /// Fail fast when the engine CLI or daemon is unusable.
    pub fn preflight(&self) -> Result<String> {
        self.engine
            .server_version()
            .map_err(DeployError::EngineUnavailable)
    }

    /// Remove the deployed container and its images. Absent targets are fine.
    pub fn cleanup(&self) -> Result<CleanupReport> {
        let name = &self.config.container_name;
        let mut report = CleanupReport::default();

        if let Some(container) = self.engine.find_container(name)? {
            if container.is_running() {
                match self.engine.stop_container(name) {
                    Ok(()) => report.container_stopped = true,
                    Err(e) if e.is_ignorable() => log::debug!("stop {name}: {e}"),
                    Err(e) => return Err(e.into()),
                }
            } else {
                log::debug!("{name} is {}, skipping stop", container.state);
            }
            match self.engine.remove_container(name) {
                Ok(()) => report.container_removed = true,
                Err(e) if e.is_ignorable() => log::debug!("rm {name}: {e}"),
                Err(e) => return Err(e.into()),
            }
        }

        for image in self.engine.list_images(&self.config.image_name)? {
            let reference = image.reference();
            match self.engine.remove_image(&reference) {
                Ok(()) => report.images_removed.push(reference),
                Err(e) if e.is_ignorable() => log::debug!("rmi {reference}: {e}"),
                Err(e) if e.category() == ErrorCategory::Conflict => {
                    log::debug!("rmi {reference}: {e}");
                    report.images_in_use.push(reference);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(report)
    }

    /// First required build input that does not exist.
    pub fn missing_input(&self) -> Option<PathBuf> {
        self.config
            .required_inputs()
            .into_iter()
            .find(|path| !path.is_file())
    }

    /// Check inputs and build the image.
    pub fn build(&self) -> Result<()> {
        if let Some(missing) = self.missing_input() {
            return Err(DeployError::MissingInput(missing));
        }

        let spec = BuildSpec {
            context: self.config.context.clone(),
            dockerfile: self.config.dockerfile.clone(),
            tag: self.config.image_ref(),
        };
        self.engine
            .build_image(&spec)
            .map_err(|source| DeployError::BuildFailed {
                image: self.config.image_ref(),
                source,
            })
    }

    /// Launch specification for the deployed container.
    pub fn unit_spec(&self) -> RunSpec {
        RunSpec {
            image: self.config.image_ref(),
            name: Some(self.config.container_name.clone()),
            detach: true,
            auto_remove: false,
            restart: Some(self.config.restart_policy.clone()),
            ports: vec![PortMapping {
                host: self.config.host_port,
                container: self.config.container_port,
            }],
            mounts: vec![Mount::volume(
                &self.config.volume_name,
                &self.config.data_mount,
            )],
            env: self.config.container_env(),
            command: Vec::new(),
        }
    }

    /// Ensure the volume exists and start the container.
    pub fn run(&self) -> Result<RunReport> {
        let volume_created = self.engine.ensure_volume(&self.config.volume_name)?;
        let container_id = self
            .engine
            .run_container(&self.unit_spec())
            .map_err(|source| DeployError::StartFailed {
                name: self.config.container_name.clone(),
                source,
            })?;
        Ok(RunReport {
            container_id,
            volume_created,
        })
    }

    /// Last configured number of log lines, if they can be read.
    pub fn recent_logs(&self) -> Option<String> {
        match self
            .engine
            .logs(&self.config.container_name, self.config.log_lines)
        {
            Ok(logs) => Some(logs),
            Err(e) => {
                log::debug!("logs {}: {e}", self.config.container_name);
                None
            }
        }
    }

    /// Poll until the container runs and the service answers with 2xx.
    ///
    /// An exited container aborts immediately. When the deadline passes the
    /// error is [`DeployError::NotRunning`] if the container never came up,
    /// otherwise [`DeployError::ReadinessTimeout`]. Logs are attached to
    /// both the report and the error.
    pub fn verify(&self) -> Result<VerifyReport> {
        let name = &self.config.container_name;
        let url = format!("{}/", self.config.service_url());
        let started = Instant::now();
        let mut reached_running = false;
        let mut last_state = String::from("unknown");

        let outcome = poll_until(&self.config.poll_config(), Some(&LogCallback), |attempt| {
            let state = match self.engine.container_state(name) {
                Ok(Some(state)) => state,
                Ok(None) => {
                    return Attempt::Abort(DeployError::NotRunning {
                        name: name.clone(),
                        state: "removed".to_string(),
                        logs: None,
                    });
                }
                Err(e) => return Attempt::Abort(e.into()),
            };
            last_state = state.to_string();

            if state.has_stopped() {
                return Attempt::Abort(DeployError::NotRunning {
                    name: name.clone(),
                    state: last_state.clone(),
                    logs: None,
                });
            }
            if !state.is_up() {
                return Attempt::Pending(format!("container is {last_state}"));
            }

            reached_running = true;
            match self.probe.get(&url) {
                Ok(response) if response.is_success() => Attempt::Ready((response.status, attempt)),
                Ok(response) => Attempt::Pending(format!("HTTP {}", response.status)),
                Err(e) => Attempt::Pending(format!("{e:#}")),
            }
        });

        let logs = self.recent_logs();
        match outcome {
            Ok((status, attempts)) => Ok(VerifyReport {
                status,
                attempts,
                elapsed: started.elapsed(),
                logs,
            }),
            Err(PollError::Aborted(e)) => Err(e.with_logs(logs)),
            Err(PollError::TimedOut { elapsed, last, .. }) => {
                if reached_running {
                    Err(DeployError::ReadinessTimeout {
                        url,
                        waited: elapsed,
                        last,
                        logs,
                    })
                } else {
                    Err(DeployError::NotRunning {
                        name: name.clone(),
                        state: last_state,
                        logs,
                    })
                }
            }
        }
    }

    /// Archive the data volume into the backup directory.
    pub fn backup(&self, now: NaiveDateTime) -> Result<BackupArtifact> {
        let volume = &self.config.volume_name;
        if self.engine.find_volume(volume)?.is_none() {
            return Err(DeployError::Backup(format!(
                "volume {volume} does not exist, nothing to back up"
            )));
        }

        let dest_dir = fs::canonicalize(&self.config.backup_dir).map_err(|e| {
            DeployError::Backup(format!(
                "backup directory {}: {e}",
                self.config.backup_dir.display()
            ))
        })?;
        let file_name = backup_file_name(now);

        self.engine
            .archive_volume(volume, &dest_dir, &file_name, &self.config.helper_image)
            .map_err(|e| DeployError::Backup(e.to_string()))?;

        let path = dest_dir.join(&file_name);
        let size = fs::metadata(&path)
            .map_err(|e| DeployError::Backup(format!("{} not created: {e}", path.display())))?
            .len();
        Ok(BackupArtifact { path, size })
    }

    /// GET each smoke endpoint once.
    pub fn smoke(&self) -> Vec<SmokeCheck> {
        let base = self.config.service_url();
        SMOKE_CHECKS
            .iter()
            .map(|&(path, accepted)| {
                let (outcome, body) = match self.probe.get(&format!("{base}{path}")) {
                    Ok(response) => (Ok(response.status), response.body),
                    Err(e) => (Err(format!("{e:#}")), String::new()),
                };
                let passed = matches!(&outcome, Ok(status) if accepted.contains(status));
                SmokeCheck {
                    path,
                    outcome,
                    passed,
                    body,
                }
            })
            .collect()
    }

    /// Read-only snapshot of what is deployed.
    pub fn status(&self) -> Result<StatusReport> {
        let engine_version = self.preflight()?;
        let container = self
            .engine
            .container_state(&self.config.container_name)?
            .map(|state| state.to_string());
        let images = self
            .engine
            .list_images(&self.config.image_name)?
            .iter()
            .map(enginekit::ImageSummary::reference)
            .collect();
        let volume_exists = self.engine.find_volume(&self.config.volume_name)?.is_some();
        let responding = self
            .probe
            .get(&format!("{}/", self.config.service_url()))
            .ok()
            .map(|r| r.status);

        Ok(StatusReport {
            engine_version,
            container,
            images,
            volume_exists,
            responding,
        })
    }
}
