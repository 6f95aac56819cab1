//! Path resolution for sensordeploy
//!
//! # Config file lookup
//!
//! 1. `--config PATH` (or `SENSORDEPLOY_CONFIG`), which must exist
//! 2. `sensordeploy.toml` in the current directory
//! 3. `XDG_CONFIG_HOME/sensordeploy/config.toml` (if set)
//! 4. Platform config dir, e.g. `~/.config/sensordeploy/config.toml`
//!
//! A missing file at steps 2-4 is not an error: built-in defaults apply.

use std::path::{Path, PathBuf};

/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "sensordeploy.toml";

const APP_DIR: &str = "sensordeploy";
const GLOBAL_CONFIG_FILE: &str = "config.toml";

/// Find the config file to load, if any.
pub fn discover_config(cwd: &Path) -> Option<PathBuf> {
    let local = cwd.join(LOCAL_CONFIG_FILE);
    if local.is_file() {
        log::debug!("Using local config: {}", local.display());
        return Some(local);
    }

    let global = global_config_file()?;
    if global.is_file() {
        log::debug!("Using user config: {}", global.display());
        return Some(global);
    }

    log::debug!("No config file found, using defaults");
    None
}

/// User-level config file path (may not exist).
pub fn global_config_file() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config)
                .join(APP_DIR)
                .join(GLOBAL_CONFIG_FILE),
        );
    }
    dirs::config_dir().map(|d| d.join(APP_DIR).join(GLOBAL_CONFIG_FILE))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Expand a path and make it absolute relative to `cwd`.
pub fn resolve(path: &Path, cwd: &Path) -> PathBuf {
    let expanded = expand(&path.to_string_lossy());
    if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_local_config_wins() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(LOCAL_CONFIG_FILE), "host_port = 9000\n").unwrap();
        assert_eq!(
            discover_config(tmp.path()),
            Some(tmp.path().join(LOCAL_CONFIG_FILE))
        );
    }

    #[test]
    fn test_local_config_directory_is_ignored() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join(LOCAL_CONFIG_FILE)).unwrap();
        assert_ne!(
            discover_config(tmp.path()),
            Some(tmp.path().join(LOCAL_CONFIG_FILE))
        );
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand("~/backups");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("backups"));
        }
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let cwd = Path::new("/srv/robot");
        assert_eq!(resolve(Path::new("build"), cwd), cwd.join("build"));
        assert_eq!(
            resolve(Path::new("/opt/api"), cwd),
            PathBuf::from("/opt/api")
        );
    }
}
