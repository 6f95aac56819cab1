use anyhow::Result;
use chrono::{Local, NaiveDateTime};

use crate::config::DeployConfig;
use crate::orchestrator::{BackupArtifact, Orchestrator};
use crate::{progress, ui};

pub fn run(config: &DeployConfig) -> Result<()> {
    let (engine, probe) = super::connect(config);
    let orch = Orchestrator::new(&engine, &probe, config);

    ui::header(&format!("Backing up {}", config.volume_name));
    orch.preflight()?;
    attempt(&orch, Local::now().naive_local());
    Ok(())
}

/// Back up the data volume. Failures are reported as warnings, never errors.
pub fn attempt(orch: &Orchestrator, now: NaiveDateTime) -> Option<BackupArtifact> {
    let volume = &orch.config().volume_name;
    let pb = progress::spinner(&format!("Archiving volume {volume}..."));
    match orch.backup(now) {
        Ok(artifact) => {
            progress::finish_success(
                &pb,
                &format!(
                    "Backup written to {} ({})",
                    artifact.path.display(),
                    ui::format_size(artifact.size)
                ),
            );
            Some(artifact)
        }
        Err(e) => {
            log::debug!("backup of {volume} failed: {e:?}");
            progress::finish_warn(&pb, &format!("{e}; continuing without a backup"));
            None
        }
    }
}
