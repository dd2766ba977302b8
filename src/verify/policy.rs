//! Probe budget.

use std::time::Duration;

/// Bounds how long a single verification may take.
///
/// A verification makes up to `attempts` probes, each limited to `timeout`,
/// sleeping `delay` between them.
///
/// # Defaults
///
/// - `attempts`: 3
/// - `timeout`: 2 seconds
/// - `delay`: 1 second
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    /// Number of probes, including the first.
    pub attempts: u32,
    /// Per-probe timeout.
    pub timeout: Duration,
    /// Pause between probes.
    pub delay: Duration,
}

impl ProbePolicy {
    /// Default number of attempts.
    pub const DEFAULT_ATTEMPTS: u32 = 3;

    /// Default per-probe timeout (2 seconds).
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

    /// Default pause between probes (1 second).
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

    #[must_use]
    pub const fn new() -> Self {
        Self {
            attempts: Self::DEFAULT_ATTEMPTS,
            timeout: Self::DEFAULT_TIMEOUT,
            delay: Self::DEFAULT_DELAY,
        }
    }

    /// Sets the number of attempts.
    ///
    /// # Panics
    ///
    /// Panics if `attempts` is zero.
    #[must_use]
    pub const fn with_attempts(mut self, attempts: u32) -> Self {
        assert!(attempts >= 1, "attempts must be at least 1");
        self.attempts = attempts;
        self
    }

    /// Sets the per-probe timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the pause between probes.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self::new()
    }
}
