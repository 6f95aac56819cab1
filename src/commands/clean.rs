use anyhow::Result;

use crate::config::DeployConfig;
use crate::orchestrator::{CleanupReport, Orchestrator};
use crate::{progress, ui};

pub fn run(config: &DeployConfig) -> Result<()> {
    let (engine, probe) = super::connect(config);
    let orch = Orchestrator::new(&engine, &probe, config);

    ui::header(&format!("Cleaning up {}", config.container_name));
    orch.preflight()?;
    execute(&orch)?;
    Ok(())
}

/// Run the cleanup stage with a spinner and print what it removed.
pub fn execute(orch: &Orchestrator) -> Result<CleanupReport> {
    let pb = progress::spinner("Removing previous deployment...");
    match orch.cleanup() {
        Ok(report) => {
            progress::finish_clear(&pb);
            print_report(&report, orch.config());
            Ok(report)
        }
        Err(e) => {
            progress::finish_error(&pb, "Cleanup failed");
            Err(e.into())
        }
    }
}

fn print_report(report: &CleanupReport, config: &DeployConfig) {
    if report.is_noop() {
        ui::dim("Nothing to clean up");
        return;
    }
    if report.container_removed {
        let verb = if report.container_stopped {
            "Stopped and removed"
        } else {
            "Removed"
        };
        ui::success(&format!("{verb} container {}", config.container_name));
    }
    for image in &report.images_removed {
        ui::success(&format!("Removed image {image}"));
    }
    for image in &report.images_in_use {
        ui::warn(&format!("Image {image} is still in use, kept"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::fake::ScriptedProbe;
    use enginekit::{BuildSpec, Engine, MemoryEngine, RunSpec};

    #[test]
    fn test_execute_removes_container_and_image() {
        let engine = MemoryEngine::new();
        engine
            .build_image(&BuildSpec {
                context: ".".into(),
                dockerfile: "Dockerfile".to_string(),
                tag: "robot-sensor-api:latest".to_string(),
            })
            .unwrap();
        engine
            .run_container(&RunSpec {
                image: "robot-sensor-api:latest".to_string(),
                name: Some("robot-sensor-api".to_string()),
                detach: true,
                ..Default::default()
            })
            .unwrap();
        let probe = ScriptedProbe::healthy();
        let config = DeployConfig::default();
        let orch = Orchestrator::new(&engine, &probe, &config);

        let report = execute(&orch).unwrap();
        assert!(report.container_removed);
        assert_eq!(engine.container_count("robot-sensor-api"), 0);
        assert_eq!(engine.image_count("robot-sensor-api"), 0);

        // Second pass has nothing left to do
        assert!(execute(&orch).unwrap().is_noop());
    }

    #[test]
    fn test_execute_engine_down() {
        let engine = MemoryEngine::unavailable();
        let probe = ScriptedProbe::healthy();
        let config = DeployConfig::default();
        let orch = Orchestrator::new(&engine, &probe, &config);
        assert!(execute(&orch).is_err());
    }
}
