pub mod backup;
pub mod clean;
pub mod deploy;
pub mod init;
pub mod status;

use enginekit::DockerCli;

use crate::config::DeployConfig;
use crate::probe::HttpProbe;

/// Engine CLI and HTTP probe for the configured environment.
pub(crate) fn connect(config: &DeployConfig) -> (DockerCli, HttpProbe) {
    (
        DockerCli::new(&config.engine),
        HttpProbe::new(config.http_timeout()),
    )
}
