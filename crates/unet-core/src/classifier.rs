//! Interface classification: a pure function from SNMP interface metadata to
//! `{interface_type, isp_provider, is_critical, confidence}`.
//!
//! Evaluation order follows reliability: `ifAlias` (operator-set, most
//! reliable) beats `ifDescr` beats `ifName` beats the `ifType` fallback.
//! Classifying the same inputs twice always yields the same output — this is
//! relied on by the discovery walk's idempotence guarantee.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceClass {
    Isp,
    Trunk,
    Access,
    ServerLink,
    BranchLink,
    Management,
    Loopback,
    Voice,
    Camera,
    Unclassified,
}

impl InterfaceClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Isp => "isp",
            Self::Trunk => "trunk",
            Self::Access => "access",
            Self::ServerLink => "server_link",
            Self::BranchLink => "branch_link",
            Self::Management => "management",
            Self::Loopback => "loopback",
            Self::Voice => "voice",
            Self::Camera => "camera",
            Self::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for InterfaceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one interface's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub interface_type: InterfaceClass,
    pub isp_provider: Option<String>,
    pub is_critical: bool,
    pub confidence: f64,
}

struct Pattern {
    class: InterfaceClass,
    regex: Regex,
}

fn compiled(re: &'static str) -> Regex {
    Regex::new(re).expect("interface classifier pattern is a fixed literal")
}

// Ordered so that more specific classes are tried before generic ones — an
// alias like "ISP_Voice_Gateway" should not get bucketed as voice. Patterns
// are the §4.4 pattern sets verbatim, case-insensitive.
static TYPE_PATTERNS: LazyLock<[Pattern; 9]> = LazyLock::new(|| {
    [
        Pattern {
            class: InterfaceClass::Isp,
            regex: compiled(r"(?i)internet|wan|isp|uplink|inet"),
        },
        Pattern {
            class: InterfaceClass::Trunk,
            regex: compiled(r"(?i)po\d+|lag\d+|port-channel|trunk"),
        },
        Pattern {
            class: InterfaceClass::Loopback,
            regex: compiled(r"(?i)loopback|lo\d+"),
        },
        Pattern {
            class: InterfaceClass::Management,
            regex: compiled(r"(?i)mgmt|management|oob"),
        },
        Pattern {
            class: InterfaceClass::Voice,
            regex: compiled(r"(?i)voice|voip|sip"),
        },
        Pattern {
            class: InterfaceClass::Camera,
            regex: compiled(r"(?i)camera|cctv|nvr"),
        },
        Pattern {
            class: InterfaceClass::ServerLink,
            regex: compiled(r"(?i)server|srv"),
        },
        Pattern {
            class: InterfaceClass::BranchLink,
            regex: compiled(r"(?i)branch"),
        },
        Pattern {
            class: InterfaceClass::Access,
            regex: compiled(r"(?i)access"),
        },
    ]
});

static ISP_PROVIDER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| compiled(r"(?i)magti|silknet|veon|beeline|geocell|caucasus|globaltel"));

fn find_type(haystack: &str) -> Option<InterfaceClass> {
    TYPE_PATTERNS
        .iter()
        .find(|p| p.regex.is_match(haystack))
        .map(|p| p.class)
}

fn find_provider(haystack: &str) -> Option<String> {
    ISP_PROVIDER_PATTERN
        .find(haystack)
        .map(|m| m.as_str().to_lowercase())
}

/// `ifType` values (RFC 1213 `IANAifType`) that fall back to a class when no
/// textual metadata matched.
fn class_from_if_type(if_type: i32) -> Option<InterfaceClass> {
    match if_type {
        24 => Some(InterfaceClass::Loopback), // softwareLoopback
        _ => None,
    }
}

/// Classify an interface from its SNMP metadata. Pure and deterministic:
/// identical inputs always produce identical output.
#[must_use]
pub fn classify_interface(
    if_alias: &str,
    if_descr: &str,
    if_name: &str,
    if_type: i32,
) -> Classification {
    let mut provider = find_provider(if_alias)
        .or_else(|| find_provider(if_descr))
        .or_else(|| find_provider(if_name));

    let (class, confidence) = if let Some(class) = find_type(if_alias) {
        let confidence = if provider.is_some() { 0.9 } else { 0.8 };
        (class, confidence)
    } else if let Some(class) = find_type(if_descr) {
        (class, 0.6)
    } else if let Some(class) = find_type(if_name) {
        (class, 0.35)
    } else if let Some(class) = class_from_if_type(if_type) {
        (class, 0.2)
    } else {
        provider = None;
        (InterfaceClass::Unclassified, 0.0)
    };

    // An ISP keyword match stands even when no specific provider pattern
    // matched — `isp_provider` is simply left null in that case (§4.4 edge case).
    let is_critical = class == InterfaceClass::Isp;

    Classification {
        interface_type: class,
        isp_provider: provider,
        is_critical,
        confidence,
    }
}

/// §9 open question: the source's stand-in for "this device is the branch's
/// ISP router" before an explicit per-device flag existed — an IPv4 address
/// ending in `.5`. Kept as a secondary signal alongside `devices.is_isp_router`
/// (the explicit flag §9 recommends introducing); callers should log when
/// the two disagree rather than picking one silently.
#[must_use]
pub fn ip_suffix_isp_heuristic(ip_address: &str) -> bool {
    ip_address
        .rsplit('.')
        .next()
        .is_some_and(|octet| octet == "5")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magti_internet_uplink_classifies_as_critical_isp() {
        let c = classify_interface(
            "Magti_Internet_Uplink",
            "GigabitEthernet0/0/0",
            "Gi0/0/0",
            6,
        );
        assert_eq!(c.interface_type, InterfaceClass::Isp);
        assert_eq!(c.isp_provider.as_deref(), Some("magti"));
        assert!(c.is_critical);
        assert!(c.confidence >= 0.8);
    }

    #[test]
    fn classification_is_idempotent() {
        let a = classify_interface("WAN-1", "uplink to isp", "Gi0/1", 6);
        let b = classify_interface("WAN-1", "uplink to isp", "Gi0/1", 6);
        assert_eq!(a, b);
    }

    #[test]
    fn isp_keyword_without_provider_still_marks_isp() {
        let c = classify_interface("Internet_Uplink", "", "Gi0/2", 6);
        assert_eq!(c.interface_type, InterfaceClass::Isp);
        assert!(c.isp_provider.is_none());
        assert!(c.is_critical);
    }

    #[test]
    fn no_match_defaults_to_unclassified() {
        let c = classify_interface("", "", "", 6);
        assert_eq!(c.interface_type, InterfaceClass::Unclassified);
        assert!(!c.is_critical);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn port_channel_pattern_is_trunk() {
        let c = classify_interface("Po12", "", "", 161);
        assert_eq!(c.interface_type, InterfaceClass::Trunk);
    }

    #[test]
    fn non_isp_type_is_never_critical() {
        let c = classify_interface("Server-Farm-A", "", "", 6);
        assert_eq!(c.interface_type, InterfaceClass::ServerLink);
        assert!(!c.is_critical);
    }

    #[test]
    fn ip_suffix_heuristic_matches_only_dot_five() {
        assert!(ip_suffix_isp_heuristic("10.1.2.5"));
        assert!(!ip_suffix_isp_heuristic("10.1.2.50"));
        assert!(!ip_suffix_isp_heuristic("10.1.2.6"));
    }
}
