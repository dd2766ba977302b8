//! Default values for scenario options.

use std::time::Duration;

/// Scenario file written by `init` and read when `--config` is omitted.
pub const SCENARIO_FILE: &str = "vlan-isolate.toml";

/// Per-backend-call timeout in seconds.
pub const CALL_TIMEOUT_SECS: u64 = 30;

/// Probe attempts per check.
pub const PROBE_ATTEMPTS: u32 = 3;

/// Single probe timeout in seconds.
pub const PROBE_TIMEOUT_SECS: u64 = 2;

/// Delay between probe attempts in seconds.
pub const PROBE_DELAY_SECS: u64 = 1;

/// Namespace for cluster objects.
pub const NAMESPACE: &str = "default";

/// `kubectl` binary.
pub const KUBECTL: &str = "kubectl";

/// Shell used for Windows address commands.
pub const WINDOWS_SHELL: &str = "powershell";

#[must_use]
pub const fn probe_timeout() -> Duration {
    Duration::from_secs(PROBE_TIMEOUT_SECS)
}

#[must_use]
pub const fn probe_delay() -> Duration {
    Duration::from_secs(PROBE_DELAY_SECS)
}
