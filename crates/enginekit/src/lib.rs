//! # enginekit
//!
//! Typed access to a container engine for deployment tooling.
//!
//! This crate provides:
//! - The [`Engine`] trait: containers, images, volumes, logs, builds
//! - A Docker CLI backend that queries with exact-name filters and parses
//!   `{{json .}}` output instead of matching on free-form text
//! - An in-memory backend that behaves like the engine for tests, behind
//!   the `testing` feature
//! - Categorized errors so callers can suppress "already done" failures
//! - Bounded polling with exponential backoff for readiness checks
//!
//! ## Example
//!
//! ```no_run
//! use enginekit::{DockerCli, Engine};
//!
//! let engine = DockerCli::new("docker");
//! engine.server_version().expect("engine unavailable");
//!
//! if let Some(container) = engine.find_container("robot-sensor-api").unwrap() {
//!     println!("{} is {}", container.names, container.state);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod poll;
pub mod types;

pub use backend::Engine;
pub use backend::docker::DockerCli;
#[cfg(any(test, feature = "testing"))]
pub use backend::memory::MemoryEngine;
pub use error::{Error, ErrorCategory, Result};
pub use poll::{Attempt, PollConfig, PollError, poll_until};
pub use types::{
    BuildSpec, ContainerState, ContainerSummary, ImageSummary, Mount, MountSource, PortMapping,
    RunSpec, VolumeSummary,
};
