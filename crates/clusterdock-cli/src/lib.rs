//! # clusterdock-cli
//!
//! Command-line interface for clusterdock.
//!
//! Provides commands for:
//! - Starting a cluster from a topology file
//! - Listing active clusters
//! - Broadcasting commands to a cluster
//! - Removing clusters
//!
//! Commands take an `Arc<dyn Runtime>`; the binary connects to Docker and
//! tests pass a [`clusterdock_runtime::FakeRuntime`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, ExecArgs, Format, NukeArgs, StartArgs};
pub use error::CliError;
pub use output::OutputFormat;
