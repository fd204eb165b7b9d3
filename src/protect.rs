//! Protection gate: deny-lists of addresses and value names that must never
//! be deleted, plus the keyword check scanners use to raise severity.
//!
//! Every predicate here is pure and case-insensitive. The cleaning engine
//! consults this gate immediately before each deletion; scanners also call
//! it so protected entries never surface as issues in the first place.

use std::sync::LazyLock;

use crate::store::{KeyAddress, RootKey};

/// Subtrees that are never deleted, expressed as address prefixes.
///
/// An address is protected when it equals one of these or sits anywhere
/// underneath one. Prefix matching respects segment boundaries, so
/// `SOFTWARE\Microsoft\Cryptography` does not shadow
/// `SOFTWARE\Microsoft\CryptographyTools`.
static PROTECTED_PREFIXES: LazyLock<Vec<KeyAddress>> = LazyLock::new(|| {
    use RootKey::{ClassesRoot, CurrentUser, LocalMachine};

    let mut prefixes = vec![
        // OS configuration hives
        KeyAddress::new(LocalMachine, "SYSTEM"),
        KeyAddress::new(LocalMachine, "SECURITY"),
        KeyAddress::new(LocalMachine, "SAM"),
        KeyAddress::new(LocalMachine, "HARDWARE"),
        KeyAddress::new(LocalMachine, "BCD00000000"),
        // Windows identity and platform state
        KeyAddress::new(LocalMachine, "SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion"),
        KeyAddress::new(LocalMachine, "SOFTWARE\\Microsoft\\Cryptography"),
        KeyAddress::new(LocalMachine, "SOFTWARE\\Microsoft\\Windows Defender"),
        // Autostart roots themselves (individual values under them are fair
        // game for scanners, the keys are not)
        KeyAddress::new(LocalMachine, "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Run"),
        KeyAddress::new(LocalMachine, "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\RunOnce"),
        KeyAddress::new(CurrentUser, "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Run"),
        KeyAddress::new(CurrentUser, "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\RunOnce"),
        // Group policy
        KeyAddress::new(LocalMachine, "SOFTWARE\\Policies"),
        KeyAddress::new(CurrentUser, "SOFTWARE\\Policies"),
        KeyAddress::new(
            LocalMachine,
            "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Policies",
        ),
        KeyAddress::new(
            CurrentUser,
            "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Policies",
        ),
        // Per-user folder redirection
        KeyAddress::new(
            CurrentUser,
            "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Explorer\\Shell Folders",
        ),
        KeyAddress::new(
            CurrentUser,
            "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Explorer\\User Shell Folders",
        ),
    ];

    // Executable file-type associations: deleting any of these bricks the
    // shell's ability to launch programs.
    for class in [
        ".exe", ".dll", ".bat", ".cmd", ".com", ".lnk", ".msi", "exefile", "dllfile", "batfile",
        "cmdfile",
    ] {
        prefixes.push(KeyAddress::new(ClassesRoot, class));
    }

    prefixes
});

/// Value names that are never deleted regardless of where they live.
const PROTECTED_VALUE_NAMES: &[&str] = &[
    "",
    "(Default)",
    "@",
    "Path",
    "InstallPath",
    "ProgramFilesDir",
    "CommonFilesDir",
    "SystemRoot",
    "windir",
];

/// Substrings that mark an entry as OS-adjacent. Scanners use this to
/// classify matches as critical severity, which the engine refuses to clean.
const CRITICAL_KEYWORDS: &[&str] = &[
    "Microsoft",
    "Windows",
    "System32",
    "SysWOW64",
    "WinSxS",
    "Trusted",
    "Security",
    "Policy",
    "Crypto",
    "Driver",
    "Service",
];

/// Whether the address equals or sits under a protected subtree.
#[must_use]
pub fn is_protected_address(address: &KeyAddress) -> bool {
    address.is_root()
        || PROTECTED_PREFIXES
            .iter()
            .any(|prefix| address.starts_with(prefix))
}

/// Whether the value name is on the never-delete list (case-insensitive).
///
/// The empty name addresses a key's default value, same as `(Default)`.
#[must_use]
pub fn is_protected_value_name(name: &str) -> bool {
    PROTECTED_VALUE_NAMES
        .iter()
        .any(|protected| protected.eq_ignore_ascii_case(name))
}

/// Whether the text contains any OS-adjacent keyword (case-insensitive).
#[must_use]
pub fn is_critical_keyword(text: &str) -> bool {
    let folded = text.to_ascii_lowercase();
    CRITICAL_KEYWORDS
        .iter()
        .any(|keyword| folded.contains(&keyword.to_ascii_lowercase()))
}

/// Human-readable explanation for why an address is protected, if it is.
#[must_use]
pub fn protection_reason(address: &KeyAddress) -> Option<String> {
    if address.is_root() {
        return Some("root keys are never deleted".to_string());
    }
    PROTECTED_PREFIXES
        .iter()
        .find(|prefix| address.starts_with(prefix))
        .map(|prefix| format!("inside protected subtree {prefix}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roots_are_always_protected() {
        for root in [
            RootKey::ClassesRoot,
            RootKey::CurrentUser,
            RootKey::LocalMachine,
            RootKey::Users,
            RootKey::CurrentConfig,
        ] {
            assert!(is_protected_address(&KeyAddress::new(root, "")));
        }
    }

    #[test]
    fn system_hives_protected_recursively() {
        let nested = KeyAddress::new(
            RootKey::LocalMachine,
            "SYSTEM\\CurrentControlSet\\Services\\Tcpip",
        );
        assert!(is_protected_address(&nested));
        assert!(is_protected_address(&KeyAddress::new(
            RootKey::LocalMachine,
            "sam"
        )));
    }

    #[test]
    fn protection_is_case_insensitive() {
        let addr = KeyAddress::new(
            RootKey::CurrentUser,
            "software\\policies\\Vendor\\Setting",
        );
        assert!(is_protected_address(&addr));
    }

    #[test]
    fn prefix_match_respects_segment_boundaries() {
        // Not under SYSTEM, just shares the leading characters.
        let sibling = KeyAddress::new(RootKey::LocalMachine, "SYSTEMTOOLS\\Vendor");
        assert!(!is_protected_address(&sibling));
    }

    #[test]
    fn executable_classes_protected() {
        assert!(is_protected_address(&KeyAddress::new(
            RootKey::ClassesRoot,
            ".exe"
        )));
        assert!(is_protected_address(&KeyAddress::new(
            RootKey::ClassesRoot,
            "exefile\\shell\\open\\command"
        )));
        assert!(!is_protected_address(&KeyAddress::new(
            RootKey::ClassesRoot,
            ".xyzdata"
        )));
    }

    #[test]
    fn ordinary_software_keys_not_protected() {
        let addr = KeyAddress::new(RootKey::LocalMachine, "SOFTWARE\\DeadVendor\\OldApp");
        assert!(!is_protected_address(&addr));
        assert!(protection_reason(&addr).is_none());
    }

    #[test]
    fn value_name_list_is_case_insensitive() {
        assert!(is_protected_value_name("(Default)"));
        assert!(is_protected_value_name("(default)"));
        assert!(is_protected_value_name(""));
        assert!(is_protected_value_name("SYSTEMROOT"));
        assert!(is_protected_value_name("@"));
        assert!(!is_protected_value_name("OldInstaller"));
    }

    #[test]
    fn critical_keywords_match_substrings() {
        assert!(is_critical_keyword("C:\\Windows\\System32\\svchost.exe"));
        assert!(is_critical_keyword("microsoft shared"));
        assert!(is_critical_keyword("Intel Driver Update"));
        assert!(!is_critical_keyword("C:\\Games\\OldGame\\launcher.exe"));
    }

    #[test]
    fn protection_reason_names_the_subtree() {
        let addr = KeyAddress::new(RootKey::LocalMachine, "SECURITY\\Policy");
        let reason = protection_reason(&addr).unwrap();
        assert!(reason.contains("HKEY_LOCAL_MACHINE\\SECURITY"));
    }
}
