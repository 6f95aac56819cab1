mod cli;
mod commands;
mod config;
mod orchestrator;
mod paths;
mod probe;
mod progress;
mod ui;

use anyhow::{Context as _, Result};
use cli::{Cli, Mode, Parsed};
use config::DeployConfig;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = match cli::parse(std::env::args_os()) {
        Parsed::Run(cli) => cli,
        Parsed::Exit(code) => return ExitCode::from(code),
    };

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            ui::error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let cwd = std::env::current_dir().context("Could not determine the working directory")?;
    let config = DeployConfig::resolve(&cli.overrides, &cwd)?;
    log::debug!("{config:#?}");

    match cli.mode() {
        Mode::Deploy => commands::deploy::run(&ctx, &config, cli.backup_choice(), cli.smoke),
        Mode::Backup => commands::backup::run(&config),
        Mode::Clean => commands::clean::run(&config),
        Mode::Init => commands::init::run(&config, cli.force),
        Mode::Status => commands::status::run(&config),
    }
}
