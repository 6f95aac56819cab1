use anyhow::{Context as _, Result};
use chrono::{Local, NaiveDateTime};
use dialoguer::Confirm;
use enginekit::Engine;
use std::io::IsTerminal;

use crate::Context;
use crate::cli::BackupChoice;
use crate::config::DeployConfig;
use crate::orchestrator::{DeployError, Orchestrator};
use crate::{progress, ui};

const TOTAL_STEPS: usize = 4;

/// Decisions made before any stage runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Plan {
    pub backup: bool,
    pub smoke: bool,
}

pub fn run(ctx: &Context, config: &DeployConfig, choice: BackupChoice, smoke: bool) -> Result<()> {
    let (engine, probe) = super::connect(config);
    let orch = Orchestrator::new(&engine, &probe, config);

    let version = orch.preflight()?;
    log::info!("{} server {version}", engine.name());

    let plan = Plan {
        backup: decide_backup(choice, &config.volume_name)?,
        smoke,
    };
    execute(ctx, &orch, plan, Local::now().naive_local())
}

/// Ask only when undecided and someone is at the terminal; default no.
fn decide_backup(choice: BackupChoice, volume: &str) -> Result<bool> {
    match choice {
        BackupChoice::Always => Ok(true),
        BackupChoice::Never => Ok(false),
        BackupChoice::Ask => {
            if !std::io::stdin().is_terminal() || !console::user_attended_stderr() {
                log::debug!("non-interactive session, skipping backup prompt");
                return Ok(false);
            }
            Confirm::new()
                .with_prompt(format!("Back up volume {volume} before deploying?"))
                .default(false)
                .interact()
                .context("Failed to read confirmation")
        }
    }
}

/// Run the stages in order, stopping at the first failure.
pub fn execute(
    ctx: &Context,
    orch: &Orchestrator,
    plan: Plan,
    now: NaiveDateTime,
) -> Result<()> {
    let config = orch.config();
    ui::header(&format!("Deploying {}", config.image_ref()));

    if plan.backup {
        super::backup::attempt(orch, now);
    }

    ui::step(1, TOTAL_STEPS, "Removing previous deployment");
    super::clean::execute(orch)?;

    // Build output streams to the terminal, so no spinner here.
    ui::step(2, TOTAL_STEPS, &format!("Building {}", config.image_ref()));
    orch.build()?;
    ui::success(&format!("Built {}", config.image_ref()));

    ui::step(3, TOTAL_STEPS, &format!("Starting {}", config.container_name));
    let started = orch.run()?;
    if started.volume_created {
        ui::info(&format!("Created volume {}", config.volume_name));
    }
    let short_id = started.container_id.get(..12).unwrap_or(&started.container_id);
    ui::success(&format!("Started {} ({short_id})", config.container_name));

    ui::step(4, TOTAL_STEPS, "Waiting for the API");
    verify(ctx, orch)?;

    if plan.smoke {
        smoke(ctx, orch)?;
    }

    print_summary(ctx, config);
    Ok(())
}

fn verify(ctx: &Context, orch: &Orchestrator) -> Result<()> {
    let config = orch.config();
    let pb = progress::spinner(&format!("Polling {}/ ...", config.service_url()));
    match orch.verify() {
        Ok(report) => {
            progress::finish_success(
                &pb,
                &format!(
                    "API answered HTTP {} after {:.1}s ({} checks)",
                    report.status,
                    report.elapsed.as_secs_f64(),
                    report.attempts
                ),
            );
            if !ctx.quiet
                && let Some(logs) = &report.logs
            {
                ui::log_block(&logs_title(config), logs);
            }
            Ok(())
        }
        Err(e) => {
            progress::finish_error(&pb, "Verification failed");
            if let Some(logs) = e.logs() {
                ui::log_block(&logs_title(config), logs);
            }
            Err(e.into())
        }
    }
}

fn logs_title(config: &DeployConfig) -> String {
    format!("Container logs (last {} lines)", config.log_lines)
}

fn smoke(ctx: &Context, orch: &Orchestrator) -> Result<()> {
    ui::section("Smoke checks");
    let checks = orch.smoke();

    for check in &checks {
        let detail = match &check.outcome {
            Ok(status) => format!("HTTP {status}"),
            Err(reason) => reason.clone(),
        };
        let line = format!("GET {} -> {detail}", check.path);
        if check.passed {
            ui::success(&line);
        } else {
            ui::error(&line);
        }
        if ctx.verbose > 0 && !check.body.is_empty() {
            ui::dim(&check.body.chars().take(120).collect::<String>());
        }
    }

    let failed = checks.iter().filter(|c| !c.passed).count();
    if failed > 0 {
        return Err(DeployError::SmokeFailed {
            failed,
            total: checks.len(),
        }
        .into());
    }
    Ok(())
}

/// Follow-up engine commands for the deployed container.
pub fn cheat_sheet(config: &DeployConfig) -> Vec<(&'static str, String)> {
    let engine = &config.engine;
    let name = &config.container_name;
    vec![
        ("logs", format!("{engine} logs -f {name}")),
        ("stop", format!("{engine} stop {name}")),
        ("start", format!("{engine} start {name}")),
        ("restart", format!("{engine} restart {name}")),
        ("shell", format!("{engine} exec -it {name} /bin/bash")),
        ("remove", format!("{engine} rm -f {name}")),
    ]
}

fn print_summary(ctx: &Context, config: &DeployConfig) {
    ui::header("Deployment complete");
    ui::kv("API", &config.service_url());
    ui::kv("Docs", &config.docs_url());
    ui::kv("Schema", &config.schema_url());
    ui::kv("Container", &config.container_name);
    ui::kv("Image", &config.image_ref());
    ui::kv("Volume", &config.volume_name);

    if ctx.quiet {
        return;
    }
    ui::section("Useful commands");
    for (label, cmd) in cheat_sheet(config) {
        ui::command(label, &cmd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::fake::ScriptedProbe;
    use chrono::NaiveDate;
    use enginekit::MemoryEngine;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn ctx() -> Context {
        Context {
            verbose: 0,
            quiet: false,
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
    }

    fn project() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("Dockerfile"), "FROM python:3.11-slim\n").unwrap();
        fs::write(tmp.path().join("requirements.txt"), "fastapi\n").unwrap();
        fs::write(tmp.path().join("main.py"), "app = None\n").unwrap();
        tmp
    }

    fn config_for(dir: &Path) -> DeployConfig {
        DeployConfig {
            context: dir.to_path_buf(),
            backup_dir: dir.to_path_buf(),
            ready_timeout_secs: 0,
            poll_initial_ms: 1,
            poll_max_ms: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_run_on_clean_engine() {
        let tmp = project();
        let engine = MemoryEngine::new();
        let probe = ScriptedProbe::healthy();
        let config = config_for(tmp.path());
        let orch = Orchestrator::new(&engine, &probe, &config);

        execute(&ctx(), &orch, Plan::default(), now()).unwrap();
        assert_eq!(engine.running_count("robot-sensor-api"), 1);
        assert!(engine.has_volume("robot-sensor-data"));
    }

    #[test]
    fn test_second_run_keeps_single_instance() {
        let tmp = project();
        let engine = MemoryEngine::new();
        let probe = ScriptedProbe::healthy();
        let config = config_for(tmp.path());
        let orch = Orchestrator::new(&engine, &probe, &config);

        execute(&ctx(), &orch, Plan::default(), now()).unwrap();
        execute(&ctx(), &orch, Plan::default(), now()).unwrap();
        assert_eq!(engine.container_count("robot-sensor-api"), 1);
        assert_eq!(engine.running_count("robot-sensor-api"), 1);
    }

    #[test]
    fn test_missing_input_stops_before_run() {
        let tmp = project();
        fs::remove_file(tmp.path().join("main.py")).unwrap();
        let engine = MemoryEngine::new();
        let probe = ScriptedProbe::healthy();
        let config = config_for(tmp.path());
        let orch = Orchestrator::new(&engine, &probe, &config);

        let err = execute(&ctx(), &orch, Plan::default(), now()).unwrap_err();
        assert!(err.to_string().contains("main.py"));
        assert!(!engine.calls().iter().any(|c| c.starts_with("run")));
    }

    #[test]
    fn test_backup_failure_does_not_stop_deploy() {
        let tmp = project();
        let engine = MemoryEngine::new().failing_archive();
        let probe = ScriptedProbe::healthy();
        let config = config_for(tmp.path());
        let orch = Orchestrator::new(&engine, &probe, &config);
        let plan = Plan {
            backup: true,
            smoke: false,
        };

        execute(&ctx(), &orch, plan, now()).unwrap();
        assert_eq!(engine.running_count("robot-sensor-api"), 1);
    }

    #[test]
    fn test_backup_before_cleanup() {
        let tmp = project();
        let engine =
            MemoryEngine::new().with_volume_file("robot-sensor-data", "sensors.db", b"rows");
        let probe = ScriptedProbe::healthy();
        let config = config_for(tmp.path());
        let orch = Orchestrator::new(&engine, &probe, &config);
        let plan = Plan {
            backup: true,
            smoke: false,
        };

        execute(&ctx(), &orch, plan, now()).unwrap();
        assert!(tmp.path().join("backup_20261018_083000.tar.gz").is_file());
        let calls = engine.calls();
        let archive = calls.iter().position(|c| c.starts_with("archive")).unwrap();
        let build = calls.iter().position(|c| c.starts_with("build")).unwrap();
        assert!(archive < build);
    }

    #[test]
    fn test_smoke_failure_is_fatal() {
        let tmp = project();
        let engine = MemoryEngine::new();
        let probe = ScriptedProbe::healthy().on("/openapi.json", &[Ok(500)]);
        let config = config_for(tmp.path());
        let orch = Orchestrator::new(&engine, &probe, &config);
        let plan = Plan {
            backup: false,
            smoke: true,
        };

        let err = execute(&ctx(), &orch, plan, now()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::SmokeFailed {
                failed: 1,
                total: 5
            })
        ));
    }

    #[test]
    fn test_decide_backup_flags() {
        assert!(decide_backup(BackupChoice::Always, "v").unwrap());
        assert!(!decide_backup(BackupChoice::Never, "v").unwrap());
    }

    #[test]
    fn test_cheat_sheet_uses_engine_and_name() {
        let config = DeployConfig {
            engine: "podman".to_string(),
            ..Default::default()
        };
        let sheet = cheat_sheet(&config);
        assert_eq!(sheet.len(), 6);
        assert!(sheet.contains(&("logs", "podman logs -f robot-sensor-api".to_string())));
        assert!(sheet.contains(&("remove", "podman rm -f robot-sensor-api".to_string())));
    }
}
