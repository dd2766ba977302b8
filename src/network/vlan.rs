//! VLAN identifiers and netmask parsing.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::NetworkConfigError;

/// Highest assignable 802.1Q VLAN identifier.
pub const MAX_VLAN_ID: u16 = 4094;

/// An 802.1Q VLAN identifier in `0..=4094`.
///
/// `0` means "no VLAN": the configuration describes a flat network and no
/// isolation is expected or verified.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u32", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    /// The untagged (flat network) identifier.
    pub const UNTAGGED: Self = Self(0);

    /// Creates a VLAN id, rejecting values above [`MAX_VLAN_ID`].
    ///
    /// # Errors
    ///
    /// Returns [`NetworkConfigError::VlanOutOfRange`] for values above 4094.
    pub fn new(value: u32) -> Result<Self, NetworkConfigError> {
        u16::try_from(value)
            .ok()
            .filter(|id| *id <= MAX_VLAN_ID)
            .map(Self)
            .ok_or(NetworkConfigError::VlanOutOfRange { value })
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Returns true for identifiers that carry an 802.1Q tag (non-zero).
    #[must_use]
    pub const fn is_tagged(self) -> bool {
        self.0 > 0
    }

    /// Label key used to mark workloads that belong to this VLAN.
    #[must_use]
    pub fn label_key(self) -> String {
        format!("vlan-{}", self.0)
    }
}

impl TryFrom<u32> for VlanId {
    type Error = NetworkConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VlanId> for u16 {
    fn from(id: VlanId) -> Self {
        id.0
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An IPv4 netmask stored as a prefix length.
///
/// Parses both dotted form (`255.255.255.0`) and prefix form (`24` or `/24`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Netmask(u8);

impl Netmask {
    /// Creates a netmask from a prefix length.
    ///
    /// # Errors
    ///
    /// Returns an error for prefixes above 32.
    pub fn from_prefix(prefix: u8) -> Result<Self, NetworkConfigError> {
        if prefix > 32 {
            return Err(NetworkConfigError::InvalidNetmask {
                value: prefix.to_string(),
                reason: "prefix length exceeds 32",
            });
        }
        Ok(Self(prefix))
    }

    /// Converts a dotted mask, rejecting non-contiguous masks.
    ///
    /// # Errors
    ///
    /// Returns an error when the set bits are not a contiguous prefix.
    pub fn from_dotted(mask: Ipv4Addr) -> Result<Self, NetworkConfigError> {
        let bits = u32::from(mask);
        let prefix = bits.leading_ones();
        if bits.checked_shl(prefix).unwrap_or(0) != 0 {
            return Err(NetworkConfigError::InvalidNetmask {
                value: mask.to_string(),
                reason: "mask bits are not contiguous",
            });
        }
        // leading_ones of a u32 is at most 32
        Ok(Self(u8::try_from(prefix).unwrap_or(32)))
    }

    /// Returns the prefix length.
    #[must_use]
    pub const fn prefix_len(self) -> u8 {
        self.0
    }

    /// Returns the dotted representation.
    #[must_use]
    pub fn to_dotted(self) -> Ipv4Addr {
        let bits = u32::MAX.checked_shl(32 - u32::from(self.0)).unwrap_or(0);
        Ipv4Addr::from(bits)
    }
}

impl FromStr for Netmask {
    type Err = NetworkConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('/').unwrap_or(trimmed);

        if let Ok(prefix) = digits.parse::<u8>() {
            return Self::from_prefix(prefix);
        }
        let mask: Ipv4Addr = trimmed
            .parse()
            .map_err(|_| NetworkConfigError::InvalidNetmask {
                value: s.to_string(),
                reason: "expected a prefix length or dotted mask",
            })?;
        Self::from_dotted(mask)
    }
}

impl TryFrom<String> for Netmask {
    type Error = NetworkConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Netmask> for String {
    fn from(mask: Netmask) -> Self {
        mask.to_dotted().to_string()
    }
}

impl fmt::Display for Netmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dotted())
    }
}
