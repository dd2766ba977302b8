//! Scripted prober for tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{Endpoint, ProbeError, Prober};
use crate::exec::ExecError;

/// [`Prober`] driven by a reachability table.
///
/// By default endpoints on the same VLAN reach each other and nothing else
/// does, which is what a correctly isolated network looks like. Individual
/// pairs can be forced either way and sources can be made to error.
#[derive(Default)]
pub struct MockProber {
    forced_open: Mutex<HashSet<(String, String)>>,
    forced_closed: Mutex<HashSet<(String, String)>>,
    broken: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

fn pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl MockProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `a` and `b` reach each other regardless of VLAN.
    pub fn leak(&self, a: &str, b: &str) -> &Self {
        self.forced_open.lock().unwrap().insert(pair(a, b));
        self
    }

    /// Makes `a` and `b` unreachable regardless of VLAN.
    pub fn cut(&self, a: &str, b: &str) -> &Self {
        self.forced_closed.lock().unwrap().insert(pair(a, b));
        self
    }

    /// Probes from `source` fail to run.
    pub fn break_source(&self, source: &str) -> &Self {
        self.broken.lock().unwrap().insert(source.to_string());
        self
    }

    /// Probes from `source` never return.
    pub fn hang_source(&self, source: &str) -> &Self {
        self.hanging.lock().unwrap().insert(source.to_string());
        self
    }

    /// Number of probes run so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Prober for MockProber {
    async fn probe(
        &self,
        source: &Endpoint,
        target: &Endpoint,
        _timeout: Duration,
    ) -> Result<bool, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hanging.lock().unwrap().contains(&source.name) {
            std::future::pending::<()>().await;
        }
        if self.broken.lock().unwrap().contains(&source.name) {
            return Err(ProbeError::Exec(ExecError::Spawn {
                program: "ping".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock probe failure"),
            }));
        }
        let key = pair(&source.name, &target.name);
        if self.forced_open.lock().unwrap().contains(&key) {
            return Ok(true);
        }
        if self.forced_closed.lock().unwrap().contains(&key) {
            return Ok(false);
        }
        Ok(source.vlan_id == target.vlan_id)
    }
}
