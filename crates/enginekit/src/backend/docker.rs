//! Real container engine backend using `docker` commands.
//!
//! Lookups go through `--filter` plus `--format '{{json .}}'` so results
//! are parsed from structured output and matched on exact names.

use crate::backend::Engine;
use crate::error::{Error, Result};
use crate::types::{
    BuildSpec, ContainerState, ContainerSummary, ImageSummary, RunSpec, VolumeSummary,
};
use serde::de::DeserializeOwned;
use std::io;
use std::process::{Command, Output, Stdio};

const JSON_FORMAT: &str = "{{json .}}";

/// Backend that executes real `docker` (or compatible) commands.
pub struct DockerCli {
    /// Path or name of the engine executable
    binary: String,
}

impl DockerCli {
    /// Create a backend for the given executable (`docker`, `podman`, ...).
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        log::debug!("{} {}", self.binary, args.join(" "));
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd
    }

    /// Run an engine command and capture its output.
    fn run(&self, args: &[&str]) -> Result<Output> {
        self.command(args)
            .output()
            .map_err(|e| self.spawn_error(&e))
    }

    /// Run an engine command and check for success.
    fn run_checked(&self, args: &[&str], kind: &'static str, subject: &str) -> Result<String> {
        let output = self.run(args)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::from_engine_output(&stderr, kind, subject));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn spawn_error(&self, err: &io::Error) -> Error {
        if err.kind() == io::ErrorKind::NotFound {
            Error::EngineUnavailable {
                message: format!("`{}` not found in PATH", self.binary),
            }
        } else {
            Error::EngineUnavailable {
                message: format!("failed to execute {}: {}", self.binary, err),
            }
        }
    }
}

/// Anchored name filter; the engine treats `name=` as a regex and may
/// prefix names with a slash.
fn exact_name_filter(name: &str) -> String {
    format!("name=^/?{}$", regex::escape(name))
}

/// Parse one JSON document per non-empty line.
fn parse_json_lines<T: DeserializeOwned>(stdout: &str) -> Result<Vec<T>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| serde_json::from_str(l).map_err(Error::from))
        .collect()
}

impl Engine for DockerCli {
    fn name(&self) -> &str {
        &self.binary
    }

    fn server_version(&self) -> Result<String> {
        let output = self.run(&["version", "--format", "{{.Server.Version}}"])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::EngineUnavailable {
                message: stderr.trim().to_string(),
            });
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if version.is_empty() {
            return Err(Error::EngineUnavailable {
                message: "engine daemon did not report a version".to_string(),
            });
        }
        Ok(version)
    }

    fn find_container(&self, name: &str) -> Result<Option<ContainerSummary>> {
        let filter = exact_name_filter(name);
        let stdout = self.run_checked(
            &["ps", "-a", "--filter", &filter, "--format", JSON_FORMAT],
            "container",
            name,
        )?;
        let containers: Vec<ContainerSummary> = parse_json_lines(&stdout)?;
        Ok(containers.into_iter().find(|c| c.has_name(name)))
    }

    fn container_state(&self, name: &str) -> Result<Option<ContainerState>> {
        match self.run_checked(
            &["inspect", "--type", "container", "--format", "{{json .State}}", name],
            "container",
            name,
        ) {
            Ok(stdout) => Ok(Some(serde_json::from_str(&stdout)?)),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn stop_container(&self, name: &str) -> Result<()> {
        self.run_checked(&["stop", name], "container", name)?;
        Ok(())
    }

    fn remove_container(&self, name: &str) -> Result<()> {
        self.run_checked(&["rm", name], "container", name)?;
        Ok(())
    }

    fn list_images(&self, repository: &str) -> Result<Vec<ImageSummary>> {
        let filter = format!("reference={repository}");
        let stdout = self.run_checked(
            &["images", "--filter", &filter, "--format", JSON_FORMAT],
            "image",
            repository,
        )?;
        let images: Vec<ImageSummary> = parse_json_lines(&stdout)?;
        Ok(images
            .into_iter()
            .filter(|i| i.repository == repository)
            .collect())
    }

    fn remove_image(&self, reference: &str) -> Result<()> {
        self.run_checked(&["rmi", reference], "image", reference)?;
        Ok(())
    }

    fn build_image(&self, spec: &BuildSpec) -> Result<()> {
        let args = spec.to_args();
        let mut all: Vec<&str> = vec!["build"];
        all.extend(args.iter().map(String::as_str));

        let status = self
            .command(&all)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| self.spawn_error(&e))?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::CommandFailed {
                message: format!("build of {} failed", spec.tag),
                stderr: status
                    .code()
                    .map(|c| format!("exit code {c}"))
                    .unwrap_or_else(|| "terminated by signal".to_string()),
            })
        }
    }

    fn find_volume(&self, name: &str) -> Result<Option<VolumeSummary>> {
        let filter = format!("name={name}");
        let stdout = self.run_checked(
            &["volume", "ls", "--filter", &filter, "--format", JSON_FORMAT],
            "volume",
            name,
        )?;
        let volumes: Vec<VolumeSummary> = parse_json_lines(&stdout)?;
        Ok(volumes.into_iter().find(|v| v.name == name))
    }

    fn create_volume(&self, name: &str) -> Result<()> {
        self.run_checked(&["volume", "create", name], "volume", name)?;
        Ok(())
    }

    fn run_container(&self, spec: &RunSpec) -> Result<String> {
        let args = spec.to_args();
        let mut all: Vec<&str> = vec!["run"];
        all.extend(args.iter().map(String::as_str));
        let subject = spec.name.as_deref().unwrap_or(&spec.image);
        self.run_checked(&all, "container", subject)
    }

    fn logs(&self, name: &str, tail: usize) -> Result<String> {
        let tail = tail.to_string();
        let output = self.run(&["logs", "--tail", &tail, name])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::from_engine_output(&stderr, "container", name));
        }

        // Containers write to both streams; keep stdout first.
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCategory;

    #[test]
    fn test_name_is_the_binary() {
        assert_eq!(DockerCli::new("podman").name(), "podman");
    }

    #[test]
    fn test_exact_name_filter_escapes() {
        assert_eq!(
            exact_name_filter("robot-sensor.api"),
            r"name=^/?robot\-sensor\.api$"
        );
    }

    #[test]
    fn test_parse_json_lines_skips_blank() {
        let stdout = concat!(
            r#"{"Driver":"local","Name":"robot-sensor-data"}"#,
            "\n\n",
            r#"{"Driver":"local","Name":"robot-sensor-data-old"}"#,
            "\n"
        );
        let volumes: Vec<VolumeSummary> = parse_json_lines(stdout).unwrap();
        assert_eq!(volumes.len(), 2);
        assert_eq!(volumes[1].name, "robot-sensor-data-old");
    }

    #[test]
    fn test_parse_json_lines_rejects_garbage() {
        let result: Result<Vec<VolumeSummary>> = parse_json_lines("not json");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_binary_is_engine_unavailable() {
        let engine = DockerCli::new("sensordeploy-no-such-engine-binary");
        let err = engine.server_version().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::EngineUnavailable);
        assert!(err.to_string().contains("not found in PATH"));
    }
}
