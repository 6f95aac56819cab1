//! Error types for container engine operations.
//!
//! Engine failures are categorized from the CLI's stderr so callers can
//! tell an unreachable daemon apart from a target that is simply absent.
//! Idempotent callers (cleanup, ensure-volume) use [`Error::is_ignorable`]
//! to suppress "already done" failures.

use thiserror::Error;

/// Categories of engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Engine CLI missing or daemon unreachable
    EngineUnavailable,
    /// Container, image or volume does not exist
    NotFound,
    /// Container exists but is not running
    NotRunning,
    /// Name already in use, or image still referenced by a container
    Conflict,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether the failed operation's goal is already satisfied.
    ///
    /// Stopping a stopped container or removing something that is gone
    /// leaves the engine in the state the caller asked for.
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::NotFound | Self::NotRunning)
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::EngineUnavailable => {
                "Install Docker and make sure the daemon is running (try `docker info`)"
            }
            Self::NotFound => "No action needed if the object was expected to be absent",
            Self::NotRunning => "Inspect the container logs to see why it stopped",
            Self::Conflict => "Remove the conflicting container or image first",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while driving the container engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The engine binary could not be executed or its daemon is unreachable
    #[error("container engine unavailable: {message}")]
    EngineUnavailable {
        /// What went wrong talking to the engine
        message: String,
    },

    /// The named object does not exist
    #[error("no such {kind}: {name}")]
    NotFound {
        /// Object kind ("container", "image", "volume")
        kind: &'static str,
        /// Name or reference that was looked up
        name: String,
    },

    /// The container exists but is stopped
    #[error("container is not running: {name}")]
    NotRunning {
        /// Container name
        name: String,
    },

    /// Name collision or object in use
    #[error("conflict: {message}")]
    Conflict {
        /// Engine message describing the conflict
        message: String,
    },

    /// Command execution failed
    #[error("{message}: {stderr}")]
    CommandFailed {
        /// Description of what command failed
        message: String,
        /// Standard error output from the failed command
        stderr: String,
    },

    /// Engine output could not be understood
    #[error("unexpected engine output: {0}")]
    Parse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::EngineUnavailable { .. } => ErrorCategory::EngineUnavailable,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::NotRunning { .. } => ErrorCategory::NotRunning,
            Error::Conflict { .. } => ErrorCategory::Conflict,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error can be safely ignored by an idempotent caller.
    pub fn is_ignorable(&self) -> bool {
        self.category().is_ignorable()
    }

    /// Create an error from engine command output.
    ///
    /// `kind` and `subject` describe the object the command acted on and
    /// are used for [`Error::NotFound`] / [`Error::NotRunning`].
    pub fn from_engine_output(stderr: &str, kind: &'static str, subject: &str) -> Self {
        let stderr_lower = stderr.to_lowercase();

        // Daemon unreachable
        if stderr_lower.contains("cannot connect to the docker daemon")
            || stderr_lower.contains("is the docker daemon running")
            || stderr_lower.contains("error during connect")
            || stderr_lower.contains("permission denied while trying to connect")
        {
            return Error::EngineUnavailable {
                message: stderr.trim().to_string(),
            };
        }

        // Not found
        if stderr_lower.contains("no such container")
            || stderr_lower.contains("no such image")
            || stderr_lower.contains("no such volume")
            || stderr_lower.contains("no such object")
        {
            return Error::NotFound {
                kind,
                name: subject.to_string(),
            };
        }

        if stderr_lower.contains("is not running") {
            return Error::NotRunning {
                name: subject.to_string(),
            };
        }

        // Conflicts
        if stderr_lower.contains("conflict")
            || stderr_lower.contains("is being used")
            || stderr_lower.contains("is already in use")
            || stderr_lower.contains("image is referenced")
        {
            return Error::Conflict {
                message: stderr.trim().to_string(),
            };
        }

        Error::CommandFailed {
            message: format!("engine command failed for {kind} {subject}"),
            stderr: stderr.trim().to_string(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_ignorable() {
        assert!(ErrorCategory::NotFound.is_ignorable());
        assert!(ErrorCategory::NotRunning.is_ignorable());
        assert!(!ErrorCategory::Conflict.is_ignorable());
        assert!(!ErrorCategory::EngineUnavailable.is_ignorable());
    }

    #[test]
    fn test_from_engine_output_daemon_down() {
        let err = Error::from_engine_output(
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?",
            "container",
            "api",
        );
        assert_eq!(err.category(), ErrorCategory::EngineUnavailable);
    }

    #[test]
    fn test_from_engine_output_not_found() {
        let err = Error::from_engine_output(
            "Error response from daemon: No such container: api",
            "container",
            "api",
        );
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert!(err.is_ignorable());
        assert_eq!(err.to_string(), "no such container: api");
    }

    #[test]
    fn test_from_engine_output_not_running() {
        let err = Error::from_engine_output(
            "Error response from daemon: container abc is not running",
            "container",
            "api",
        );
        assert_eq!(err.category(), ErrorCategory::NotRunning);
        assert!(err.is_ignorable());
    }

    #[test]
    fn test_from_engine_output_image_in_use() {
        let err = Error::from_engine_output(
            "Error response from daemon: conflict: unable to remove repository reference \"api:latest\" (must force) - container 1a2b is using its referenced image",
            "image",
            "api:latest",
        );
        assert_eq!(err.category(), ErrorCategory::Conflict);
        assert!(!err.is_ignorable());
    }

    #[test]
    fn test_from_engine_output_fallback() {
        let err = Error::from_engine_output("something odd", "volume", "data");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert!(err.to_string().contains("something odd"));
    }
}
