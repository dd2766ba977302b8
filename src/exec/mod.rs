//! Host and cluster collaborators.
//!
//! Backends never touch processes or the cluster directly; they go through
//! the two traits defined here:
//!
//! - [`CommandExecutor`]: run a command on a host and capture its output
//!   ([`LocalExecutor`] in production)
//! - [`ClusterApi`]: create, get, list and delete cluster objects
//!   ([`KubectlCluster`] in production)

mod cluster;
mod command;
mod error;
mod kubectl;
mod local;

#[cfg(test)]
pub mod mock;

pub use cluster::{ClusterApi, ClusterObject, DeleteOutcome, ObjectRef, ResourceKind};
pub use command::{Command, CommandExecutor, CommandOutput};
pub use error::{ClusterError, ExecError};
pub use kubectl::KubectlCluster;
pub use local::LocalExecutor;
