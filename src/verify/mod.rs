//! Isolation verification.
//!
//! Platform-neutral checks that endpoints on the same VLAN reach each other
//! ([`Verifier::verify_same`]) and endpoints on different VLANs do not
//! ([`Verifier::verify_isolated`]). Probes go through the [`Prober`] trait;
//! [`ExecProber`] pings from the host, a container or a pod.

mod endpoint;
mod error;
mod policy;
mod prober;
mod verifier;

#[cfg(test)]
pub mod mock;

pub use endpoint::{Endpoint, ProbeVia};
pub use error::ProbeError;
pub use policy::ProbePolicy;
pub use prober::{ExecProber, Prober};
pub use verifier::{IsolationVerifier, Verifier};
