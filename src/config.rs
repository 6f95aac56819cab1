//! Deployment configuration.
//!
//! Layering: built-in defaults < TOML file < `SENSORDEPLOY_*` environment
//! < command-line flags. Environment and flags are merged by clap into
//! [`Overrides`]; the file is found by [`paths::discover_config`].

use anyhow::{Context, Result, bail};
use enginekit::PollConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use crate::cli::Overrides;
use crate::paths;

/// Engine rule for container and volume names.
static OBJECT_NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").ok());

/// Image repository: lowercase path components, optional registry host.
static IMAGE_NAME_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9.-]+(:[0-9]+)?/)?[a-z0-9]+([._-][a-z0-9]+)*(/[a-z0-9]+([._-][a-z0-9]+)*)*$")
        .ok()
});

static IMAGE_TAG_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").ok());

/// Environment variable that disables Python output buffering.
pub const UNBUFFERED_ENV: (&str, &str) = ("PYTHONUNBUFFERED", "1");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    /// Name of the deployed container
    pub container_name: String,
    /// Image repository built and run
    pub image_name: String,
    /// Image tag
    pub image_tag: String,
    /// Persistent data volume
    pub volume_name: String,
    pub host_port: u16,
    pub container_port: u16,
    /// Where the volume is mounted in the container
    pub data_mount: String,
    pub restart_policy: String,
    /// Extra container environment; PYTHONUNBUFFERED=1 is always set
    pub env: BTreeMap<String, String>,

    /// Build context directory
    pub context: PathBuf,
    /// Required build inputs, relative to the context
    pub dockerfile: String,
    pub requirements: String,
    pub entrypoint: String,

    /// Where backup archives are written
    pub backup_dir: PathBuf,
    /// Image for the disposable archive container
    pub helper_image: String,

    /// Host the readiness probe connects to
    pub probe_host: String,
    pub ready_timeout_secs: u64,
    pub poll_initial_ms: u64,
    pub poll_max_ms: u64,
    pub poll_backoff: f64,
    pub http_timeout_secs: u64,
    /// Container log lines shown after verification
    pub log_lines: usize,

    /// Container engine executable
    pub engine: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            container_name: "robot-sensor-api".to_string(),
            image_name: "robot-sensor-api".to_string(),
            image_tag: "latest".to_string(),
            volume_name: "robot-sensor-data".to_string(),
            host_port: 8000,
            container_port: 8000,
            data_mount: "/app/data".to_string(),
            restart_policy: "unless-stopped".to_string(),
            env: BTreeMap::from([(UNBUFFERED_ENV.0.to_string(), UNBUFFERED_ENV.1.to_string())]),
            context: PathBuf::from("."),
            dockerfile: "Dockerfile".to_string(),
            requirements: "requirements.txt".to_string(),
            entrypoint: "main.py".to_string(),
            backup_dir: PathBuf::from("."),
            helper_image: "alpine".to_string(),
            probe_host: "localhost".to_string(),
            ready_timeout_secs: 30,
            poll_initial_ms: 500,
            poll_max_ms: 5000,
            poll_backoff: 2.0,
            http_timeout_secs: 3,
            log_lines: 20,
            engine: "docker".to_string(),
        }
    }
}

impl DeployConfig {
    /// Load a TOML config file; missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Build the effective configuration for this invocation.
    pub fn resolve(overrides: &Overrides, cwd: &Path) -> Result<Self> {
        let file = match &overrides.config {
            Some(path) => {
                let path = paths::resolve(path, cwd);
                if !path.is_file() {
                    bail!("Config file not found: {}", path.display());
                }
                Some(path)
            }
            None => paths::discover_config(cwd),
        };

        let mut config = match file {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.context = paths::resolve(&config.context, cwd);
        config.backup_dir = paths::resolve(&config.backup_dir, cwd);
        config.validate()?;
        Ok(config)
    }

    /// Apply flag/environment overrides.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(context) = &overrides.context {
            self.context = context.clone();
        }
        if let Some(port) = overrides.port {
            self.host_port = port;
        }
        if let Some(name) = &overrides.container {
            self.container_name = name.clone();
        }
        if let Some(image) = &overrides.image {
            self.image_name = image.clone();
        }
        if let Some(volume) = &overrides.volume {
            self.volume_name = volume.clone();
        }
        if let Some(secs) = overrides.ready_timeout {
            self.ready_timeout_secs = secs;
        }
        if let Some(lines) = overrides.log_lines {
            self.log_lines = lines;
        }
        if let Some(engine) = &overrides.engine {
            self.engine = engine.clone();
        }
    }

    /// Reject names the engine would refuse.
    pub fn validate(&self) -> Result<()> {
        check("container name", &self.container_name, &OBJECT_NAME_PATTERN)?;
        check("volume name", &self.volume_name, &OBJECT_NAME_PATTERN)?;
        check("image name", &self.image_name, &IMAGE_NAME_PATTERN)?;
        check("image tag", &self.image_tag, &IMAGE_TAG_PATTERN)?;

        if self.host_port == 0 || self.container_port == 0 {
            bail!("Ports must be between 1 and 65535");
        }
        if !self.data_mount.starts_with('/') {
            bail!("data_mount must be an absolute path: {}", self.data_mount);
        }
        if self.poll_initial_ms == 0 {
            bail!("poll_initial_ms must be at least 1");
        }
        if self.poll_max_ms < self.poll_initial_ms {
            bail!(
                "poll_max_ms ({}) must not be below poll_initial_ms ({})",
                self.poll_max_ms,
                self.poll_initial_ms
            );
        }
        if self.poll_backoff < 1.0 {
            bail!("poll_backoff must be at least 1.0");
        }
        if self.engine.trim().is_empty() {
            bail!("engine must not be empty");
        }
        Ok(())
    }

    /// `image:tag`
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image_name, self.image_tag)
    }

    pub fn service_url(&self) -> String {
        format!("http://{}:{}", self.probe_host, self.host_port)
    }

    /// Interactive API docs
    pub fn docs_url(&self) -> String {
        format!("{}/docs", self.service_url())
    }

    /// Machine-readable API schema
    pub fn schema_url(&self) -> String {
        format!("{}/openapi.json", self.service_url())
    }

    /// Recipe, dependency manifest and entry file, in check order.
    pub fn required_inputs(&self) -> [PathBuf; 3] {
        [
            self.context.join(&self.dockerfile),
            self.context.join(&self.requirements),
            self.context.join(&self.entrypoint),
        ]
    }

    /// Container environment with output buffering disabled.
    pub fn container_env(&self) -> Vec<(String, String)> {
        let mut env = self.env.clone();
        env.entry(UNBUFFERED_ENV.0.to_string())
            .or_insert_with(|| UNBUFFERED_ENV.1.to_string());
        env.into_iter().collect()
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            timeout: Duration::from_secs(self.ready_timeout_secs),
            initial_interval: Duration::from_millis(self.poll_initial_ms),
            backoff_factor: self.poll_backoff,
            max_interval: Duration::from_millis(self.poll_max_ms),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }
}

fn check(what: &str, value: &str, pattern: &LazyLock<Option<Regex>>) -> Result<()> {
    let Some(re) = pattern.as_ref() else {
        bail!("Cannot validate {what}: pattern failed to compile");
    };
    if re.is_match(value) {
        Ok(())
    } else {
        bail!("Invalid {what}: '{value}'")
    }
}
