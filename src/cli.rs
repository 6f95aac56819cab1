use clap::error::ErrorKind;
use clap::{ArgGroup, Args, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

const AFTER_HELP: &str = "\
Without a mode flag, runs the full deployment:
  cleanup -> build -> run -> verify -> report

Run one instance at a time: concurrent invocations against the same
engine race on the container, image and volume names.";

#[derive(Parser, Debug)]
#[command(name = "sensordeploy")]
#[command(version)]
#[command(about = "Build, run, verify and back up the Robot Sensor API container", long_about = None)]
#[command(after_help = AFTER_HELP)]
#[command(group(
    ArgGroup::new("mode")
        .args(["backup", "clean", "init", "status"])
        .multiple(false)
))]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,

    /// Only back up the data volume, then exit
    #[arg(long)]
    pub backup: bool,

    /// Only remove the deployed container and image, then exit
    #[arg(long)]
    pub clean: bool,

    /// Write a Dockerfile and requirements.txt into the build context
    #[arg(long)]
    pub init: bool,

    /// Show the current deployment state
    #[arg(long)]
    pub status: bool,

    /// Overwrite existing files (with --init)
    #[arg(long, requires = "init")]
    pub force: bool,

    /// Back up the data volume before deploying, without asking
    #[arg(long, conflicts_with_all = ["no_backup", "mode"])]
    pub with_backup: bool,

    /// Deploy without backing up and without asking
    #[arg(long, conflicts_with = "mode")]
    pub no_backup: bool,

    /// Exercise the API's read endpoints after verification
    #[arg(long, conflicts_with = "mode")]
    pub smoke: bool,

    #[command(flatten)]
    pub overrides: Overrides,
}

/// Settings that override the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Config file (default: ./sensordeploy.toml, then the user config dir)
    #[arg(long, value_name = "PATH", env = "SENSORDEPLOY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Build context directory
    #[arg(long, value_name = "DIR")]
    pub context: Option<PathBuf>,

    /// Host port published for the API
    #[arg(long, value_name = "PORT", env = "SENSORDEPLOY_PORT")]
    pub port: Option<u16>,

    /// Container name
    #[arg(long = "name", value_name = "NAME", env = "SENSORDEPLOY_CONTAINER")]
    pub container: Option<String>,

    /// Image name
    #[arg(long, value_name = "NAME", env = "SENSORDEPLOY_IMAGE")]
    pub image: Option<String>,

    /// Data volume name
    #[arg(long, value_name = "NAME", env = "SENSORDEPLOY_VOLUME")]
    pub volume: Option<String>,

    /// Seconds to wait for the API to answer after start
    #[arg(long, value_name = "SECS", env = "SENSORDEPLOY_READY_TIMEOUT")]
    pub ready_timeout: Option<u64>,

    /// Container log lines to print after verification
    #[arg(long, value_name = "N")]
    pub log_lines: Option<usize>,

    /// Container engine executable
    #[arg(long, value_name = "BIN", env = "SENSORDEPLOY_ENGINE")]
    pub engine: Option<String>,
}

/// What a single invocation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Deploy,
    Backup,
    Clean,
    Init,
    Status,
}

/// Whether to back up before deploying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupChoice {
    Always,
    Never,
    Ask,
}

impl Cli {
    pub fn mode(&self) -> Mode {
        if self.backup {
            Mode::Backup
        } else if self.clean {
            Mode::Clean
        } else if self.init {
            Mode::Init
        } else if self.status {
            Mode::Status
        } else {
            Mode::Deploy
        }
    }

    pub fn backup_choice(&self) -> BackupChoice {
        if self.with_backup {
            BackupChoice::Always
        } else if self.no_backup {
            BackupChoice::Never
        } else {
            BackupChoice::Ask
        }
    }
}

/// Outcome of argument parsing.
#[derive(Debug)]
pub enum Parsed {
    /// Arguments are valid
    Run(Box<Cli>),
    /// Help, version or a usage error was printed; exit with this code
    Exit(u8),
}

/// Parse arguments. Help and version exit 0, any usage error exits 1.
pub fn parse<I, T>(args: I) -> Parsed
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Parsed::Run(Box::new(cli)),
        Err(err) => {
            // Output goes to stdout for help/version, stderr for errors.
            let _ = err.print();
            Parsed::Exit(exit_code(err.kind()))
        }
    }
}

fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn try_parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("sensordeploy").chain(args.iter().copied()))
    }

    #[test]
    fn test_no_flags_is_deploy() {
        let cli = try_parse(&[]).unwrap();
        assert_eq!(cli.mode(), Mode::Deploy);
        assert_eq!(cli.backup_choice(), BackupChoice::Ask);
    }

    #[test]
    fn test_mode_flags() {
        assert_eq!(try_parse(&["--backup"]).unwrap().mode(), Mode::Backup);
        assert_eq!(try_parse(&["--clean"]).unwrap().mode(), Mode::Clean);
        assert_eq!(try_parse(&["--init"]).unwrap().mode(), Mode::Init);
        assert_eq!(try_parse(&["--status"]).unwrap().mode(), Mode::Status);
    }

    #[test]
    fn test_help_exits_zero() {
        for flag in ["--help", "-h"] {
            let err = try_parse(&[flag]).unwrap_err();
            assert_eq!(exit_code(err.kind()), 0);
        }
        // --help short-circuits everything else, even invalid input
        let err = try_parse(&["--clean", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_version_exits_zero() {
        let err = try_parse(&["--version"]).unwrap_err();
        assert_eq!(exit_code(err.kind()), 0);
    }

    #[test]
    fn test_unknown_flag_exits_one() {
        let err = try_parse(&["--deploy-everything"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
        assert_eq!(exit_code(err.kind()), 1);
        assert!(err.render().to_string().contains("Usage:"));
    }

    #[test]
    fn test_positional_token_rejected() {
        let err = try_parse(&["deploy"]).unwrap_err();
        assert_eq!(exit_code(err.kind()), 1);
    }

    #[test]
    fn test_conflicting_modes_rejected() {
        let err = try_parse(&["--backup", "--clean"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
        assert_eq!(exit_code(err.kind()), 1);
    }

    #[test]
    fn test_backup_choice_flags() {
        assert_eq!(
            try_parse(&["--with-backup"]).unwrap().backup_choice(),
            BackupChoice::Always
        );
        assert_eq!(
            try_parse(&["--no-backup"]).unwrap().backup_choice(),
            BackupChoice::Never
        );
        assert!(try_parse(&["--with-backup", "--no-backup"]).is_err());
        assert!(try_parse(&["--with-backup", "--clean"]).is_err());
        assert!(try_parse(&["--smoke", "--backup"]).is_err());
    }

    #[test]
    fn test_force_requires_init() {
        assert!(try_parse(&["--force"]).is_err());
        assert!(try_parse(&["--init", "--force"]).unwrap().force);
    }

    #[test]
    fn test_overrides() {
        let cli = try_parse(&[
            "--port",
            "9000",
            "--name",
            "sensors-staging",
            "--ready-timeout",
            "60",
        ])
        .unwrap();
        assert_eq!(cli.overrides.port, Some(9000));
        assert_eq!(cli.overrides.container.as_deref(), Some("sensors-staging"));
        assert_eq!(cli.overrides.ready_timeout, Some(60));
    }

    #[test]
    fn test_invalid_port_rejected() {
        let err = try_parse(&["--port", "70000"]).unwrap_err();
        assert_eq!(exit_code(err.kind()), 1);
    }

    #[test]
    fn test_parse_reports_exit_codes() {
        assert!(matches!(
            parse(["sensordeploy", "--bogus"]),
            Parsed::Exit(1)
        ));
        assert!(matches!(parse(["sensordeploy", "-h"]), Parsed::Exit(0)));
        assert!(matches!(parse(["sensordeploy", "--clean"]), Parsed::Run(_)));
    }
}
