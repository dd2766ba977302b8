//! Target platform identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kind of platform a configuration is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// Host networking via the Linux 802.1Q driver.
    Linux,
    /// Host networking via `PowerShell` `NetTCPIP` cmdlets.
    Windows,
    /// Macvlan networks managed by a container runtime.
    Container,
    /// CNI attachments and policies in a Kubernetes cluster.
    Kubernetes,
}

impl PlatformKind {
    /// All platform kinds in a stable order.
    pub const ALL: [Self; 4] = [Self::Linux, Self::Windows, Self::Container, Self::Kubernetes];

    /// Lower-case identifier used in logs and configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::Container => "container",
            Self::Kubernetes => "kubernetes",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown platform '{s}'"))
    }
}
