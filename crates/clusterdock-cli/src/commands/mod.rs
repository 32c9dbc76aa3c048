//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`start`] - Start a cluster from a topology file
//! - [`ps`] - List active clusters
//! - [`exec`] - Broadcast a command to a cluster
//! - [`nuke`] - Remove clusters

pub mod exec;
pub mod nuke;
pub mod ps;
pub mod start;

pub use exec::ExecCommand;
pub use nuke::NukeCommand;
pub use ps::PsCommand;
pub use start::StartCommand;
