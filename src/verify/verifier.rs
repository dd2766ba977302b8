//! Same-VLAN reachability and cross-VLAN isolation checks.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{Endpoint, ProbePolicy, Prober};
use crate::time::{Sleeper, TokioSleeper};

/// Slack added on top of the probe's own timeout before the attempt is cut
/// off from outside.
const PROBE_GRACE: Duration = Duration::from_secs(1);

/// Platform-neutral connectivity checks.
pub trait Verifier: Send + Sync {
    /// Returns true if `b` is reachable from `a` within the budget.
    fn verify_same(&self, a: &Endpoint, b: &Endpoint) -> impl Future<Output = bool> + Send;

    /// Returns true if `b` stays unreachable from `a` for the whole budget.
    fn verify_isolated(&self, a: &Endpoint, b: &Endpoint) -> impl Future<Output = bool> + Send;
}

/// Result of one probe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Reachable,
    Unreachable,
    Inconclusive,
}

/// [`Verifier`] that repeats probes under a [`ProbePolicy`].
///
/// `verify_same` passes on the first reply. `verify_isolated` fails on the
/// first reply and passes once the budget is exhausted with at least one
/// definitive "no reply"; a budget spent entirely on inconclusive attempts
/// proves nothing and fails.
#[derive(Debug)]
pub struct IsolationVerifier<P, S = TokioSleeper> {
    prober: P,
    policy: ProbePolicy,
    sleeper: S,
}

impl<P: Prober> IsolationVerifier<P, TokioSleeper> {
    /// Creates a verifier with the default policy and real sleeps.
    pub const fn new(prober: P) -> Self {
        Self {
            prober,
            policy: ProbePolicy::new(),
            sleeper: TokioSleeper,
        }
    }
}

impl<P: Prober, S: Sleeper> IsolationVerifier<P, S> {
    #[must_use]
    pub const fn with_policy(mut self, policy: ProbePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the sleeper used between attempts.
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> IsolationVerifier<P, S2> {
        IsolationVerifier {
            prober: self.prober,
            policy: self.policy,
            sleeper,
        }
    }

    pub const fn prober(&self) -> &P {
        &self.prober
    }

    pub const fn policy(&self) -> &ProbePolicy {
        &self.policy
    }

    async fn attempt(&self, a: &Endpoint, b: &Endpoint) -> Attempt {
        let timeout = self.policy.timeout;
        match tokio::time::timeout(timeout + PROBE_GRACE, self.prober.probe(a, b, timeout)).await
        {
            Ok(Ok(true)) => Attempt::Reachable,
            Ok(Ok(false)) => Attempt::Unreachable,
            Ok(Err(e)) => {
                warn!(source = %a.name, target = %b.name, error = %e, "Probe inconclusive");
                Attempt::Inconclusive
            }
            Err(_) => {
                debug!(source = %a.name, target = %b.name, "Probe timed out");
                Attempt::Unreachable
            }
        }
    }

    /// Runs attempts until `stop` says so or the budget runs out, returning
    /// every outcome seen.
    async fn run(&self, a: &Endpoint, b: &Endpoint, stop: Attempt) -> Vec<Attempt> {
        let mut seen = Vec::new();
        for n in 1..=self.policy.attempts {
            let outcome = self.attempt(a, b).await;
            debug!(source = %a.name, target = %b.name, attempt = n, ?outcome, "Probe attempt");
            seen.push(outcome);
            if outcome == stop {
                break;
            }
            if n < self.policy.attempts {
                self.sleeper.sleep(self.policy.delay).await;
            }
        }
        seen
    }
}

impl<P: Prober, S: Sleeper> Verifier for IsolationVerifier<P, S> {
    async fn verify_same(&self, a: &Endpoint, b: &Endpoint) -> bool {
        let seen = self.run(a, b, Attempt::Reachable).await;
        let reached = seen.contains(&Attempt::Reachable);
        if reached {
            info!(source = %a, target = %b, "Same-VLAN peers reach each other");
        } else {
            warn!(source = %a, target = %b, attempts = seen.len(), "Same-VLAN peer unreachable");
        }
        reached
    }

    async fn verify_isolated(&self, a: &Endpoint, b: &Endpoint) -> bool {
        let seen = self.run(a, b, Attempt::Reachable).await;
        if seen.contains(&Attempt::Reachable) {
            warn!(source = %a, target = %b, "Isolation breached: cross-VLAN reply");
            return false;
        }
        if !seen.contains(&Attempt::Unreachable) {
            warn!(source = %a, target = %b, "Isolation unproven: every probe was inconclusive");
            return false;
        }
        info!(source = %a, target = %b, "Cross-VLAN endpoints isolated");
        true
    }
}

#[cfg(test)]
#[path = "verifier_tests.rs"]
mod tests;
