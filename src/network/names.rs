//! Name validation shared by configuration and object rendering.

use std::sync::LazyLock;

use regex::Regex;

use super::NetworkConfigError;

/// Longest interface name the Linux kernel accepts (`IFNAMSIZ - 1`).
pub const MAX_LINUX_INTERFACE_LEN: usize = 15;

/// Longest Kubernetes object name (DNS-1123 subdomain limit used for labels).
pub const MAX_OBJECT_NAME_LEN: usize = 63;

static INTERFACE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    // Letters, digits and the separators common to Linux and Windows aliases.
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 ._:\-()]*$").unwrap_or_else(|_| unreachable!())
});

static DNS_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap_or_else(|_| unreachable!())
});

/// Validates an interface name or alias.
///
/// Windows aliases may contain spaces ("Ethernet 2"), so this only rejects
/// empty names and characters no platform accepts.
///
/// # Errors
///
/// Returns [`NetworkConfigError::InvalidName`] when the name is rejected.
pub fn validate_interface(name: &str) -> Result<(), NetworkConfigError> {
    if name.is_empty() {
        return Err(invalid("interface", name, "must not be empty"));
    }
    if !INTERFACE_NAME.is_match(name) {
        return Err(invalid("interface", name, "contains unsupported characters"));
    }
    Ok(())
}

/// Validates a Kubernetes object name (DNS-1123 label).
///
/// # Errors
///
/// Returns [`NetworkConfigError::InvalidName`] when the name is rejected.
pub fn validate_object_name(name: &str) -> Result<(), NetworkConfigError> {
    if name.len() > MAX_OBJECT_NAME_LEN {
        return Err(invalid("object", name, "longer than 63 characters"));
    }
    if !DNS_LABEL.is_match(name) {
        return Err(invalid(
            "object",
            name,
            "must be lower-case alphanumerics and '-', starting and ending alphanumeric",
        ));
    }
    Ok(())
}

/// Converts arbitrary text into a DNS-1123 label fragment.
///
/// Lower-cases, replaces unsupported characters with `-` and trims leading
/// and trailing separators.
#[must_use]
pub fn sanitize_object_name(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = mapped.trim_matches('-');
    let mut out = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    out.truncate(MAX_OBJECT_NAME_LEN);
    out.trim_end_matches('-').to_string()
}

fn invalid(kind: &'static str, value: &str, reason: &'static str) -> NetworkConfigError {
    NetworkConfigError::InvalidName {
        kind,
        value: value.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_accepts_common_names() {
        for name in ["eth0", "ens3f0", "Ethernet 2", "vEthernet (WSL)", "bond0.100"] {
            assert!(validate_interface(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn interface_rejects_empty_and_shell_metacharacters() {
        assert!(validate_interface("").is_err());
        assert!(validate_interface("eth0;reboot").is_err());
        assert!(validate_interface("$(id)").is_err());
    }

    #[test]
    fn object_name_rules() {
        assert!(validate_object_name("vlan-100-pool").is_ok());
        assert!(validate_object_name("Vlan100").is_err());
        assert!(validate_object_name("-vlan").is_err());
        assert!(validate_object_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn sanitize_produces_valid_names() {
        assert_eq!(sanitize_object_name("Web_Server.01"), "web-server-01");
        assert_eq!(sanitize_object_name("--a__b--"), "a-b");
        let long = sanitize_object_name(&"x".repeat(100));
        assert_eq!(long.len(), MAX_OBJECT_NAME_LEN);
        assert!(validate_object_name(&long).is_ok());
    }
}
