//! vlan-isolate: VLAN isolation engine
//!
//! Realizes VLAN-tagged network configurations on Linux hosts, Windows
//! hosts, container runtimes and Kubernetes clusters, verifies that the
//! result is actually isolated and rolls back anything that is not.

pub mod backend;
pub mod cni;
pub mod config;
pub mod engine;
pub mod exec;
pub mod network;
pub mod scenario;
pub mod state;
pub mod time;
pub mod verify;
