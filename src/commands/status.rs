use anyhow::Result;
use colored::Colorize;
use enginekit::Engine;

use crate::config::DeployConfig;
use crate::orchestrator::{Orchestrator, StatusReport};
use crate::ui;

pub fn run(config: &DeployConfig) -> Result<()> {
    let (engine, probe) = super::connect(config);
    let orch = Orchestrator::new(&engine, &probe, config);

    ui::header("Deployment Status");
    let report = orch.status()?;
    print_report(engine.name(), &report, config);
    Ok(())
}

fn print_report(engine: &str, report: &StatusReport, config: &DeployConfig) {
    ui::kv("Engine", &format!("{engine} {}", report.engine_version));

    let container = match &report.container {
        Some(state) if state == "running" => state.green().to_string(),
        Some(state) => state.yellow().to_string(),
        None => "absent".dimmed().to_string(),
    };
    ui::kv(&format!("Container {}", config.container_name), &container);

    let images = if report.images.is_empty() {
        "none".dimmed().to_string()
    } else {
        report.images.join(", ")
    };
    ui::kv(&format!("Images {}", config.image_name), &images);

    let volume = if report.volume_exists {
        "present".green().to_string()
    } else {
        "absent".dimmed().to_string()
    };
    ui::kv(&format!("Volume {}", config.volume_name), &volume);

    let service = match report.responding {
        Some(status) if (200..300).contains(&status) => format!("HTTP {status}").green().to_string(),
        Some(status) => format!("HTTP {status}").yellow().to_string(),
        None => "not responding".red().to_string(),
    };
    ui::kv(&config.service_url(), &service);
}
