//! Scanner framework: the issue model, the `Scanner` trait, and the roster
//! of built-in heuristics.
//!
//! Scanners are strictly read-only. Each one walks a fixed set of well-known
//! addresses, swallows `NotFound`/`AccessDenied` on its own roots (a missing
//! hive is routine, not an error), and filters everything through the
//! protection gate so protected entries never surface as issues.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::config::ScanConfig;
use crate::store::value::RegValue;
use crate::store::{AccessMode, KeyAddress, StoreBackend};

pub mod pathex;

mod com;
mod empties;
mod extensions;
mod mru;
mod paths;
mod startup;
mod system;
mod uninstall;

pub use com::{ComScanner, SharedDllScanner};
pub use empties::EmptyKeyScanner;
pub use extensions::FileExtensionScanner;
pub use mru::{HistoryScanner, MruScanner};
pub use paths::{
    AppPathScanner, FontScanner, HelpFileScanner, SoftwarePathScanner, SoundEventScanner,
};
pub use startup::StartupScanner;
pub use system::{FirewallScanner, ImageExecutionScanner, MuiCacheScanner, ServiceScanner};
pub use uninstall::UninstallScanner;

// ──────────────────── issue model ────────────────────

/// What kind of problem a scanner detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueCategory {
    InvalidStartup,
    OrphanedUninstall,
    BrokenExtension,
    MruClutter,
    OversizedRecentDocs,
    OrphanedSharedDll,
    BrokenComReference,
    StaleAppPath,
    StaleInstallPath,
    MissingHelpFile,
    StaleFirewallRule,
    MissingFontFile,
    MissingSoundFile,
    StaleBrowserHistory,
    BrokenImageExecution,
    EmptyKey,
    UnreachableService,
    StaleShellCache,
    Uncategorized,
}

impl IssueCategory {
    /// Short label used in log events and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidStartup => "invalid_startup",
            Self::OrphanedUninstall => "orphaned_uninstall",
            Self::BrokenExtension => "broken_extension",
            Self::MruClutter => "mru_clutter",
            Self::OversizedRecentDocs => "oversized_recent_docs",
            Self::OrphanedSharedDll => "orphaned_shared_dll",
            Self::BrokenComReference => "broken_com_reference",
            Self::StaleAppPath => "stale_app_path",
            Self::StaleInstallPath => "stale_install_path",
            Self::MissingHelpFile => "missing_help_file",
            Self::StaleFirewallRule => "stale_firewall_rule",
            Self::MissingFontFile => "missing_font_file",
            Self::MissingSoundFile => "missing_sound_file",
            Self::StaleBrowserHistory => "stale_browser_history",
            Self::BrokenImageExecution => "broken_image_execution",
            Self::EmptyKey => "empty_key",
            Self::UnreachableService => "unreachable_service",
            Self::StaleShellCache => "stale_shell_cache",
            Self::Uncategorized => "uncategorized",
        }
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How risky deleting the entry is. `Critical` entries are reported but the
/// engine refuses to clean them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finding. Immutable after construction; an empty `value_name` means the
/// whole node is the subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub address: KeyAddress,
    pub value_name: String,
    pub description: String,
    pub details: String,
    pub category: IssueCategory,
    pub severity: Severity,
}

impl Issue {
    /// An issue against a single value.
    #[must_use]
    pub fn value(
        address: KeyAddress,
        value_name: impl Into<String>,
        category: IssueCategory,
        severity: Severity,
        description: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            address,
            value_name: value_name.into(),
            description: description.into(),
            details: details.into(),
            category,
            severity,
        }
    }

    /// An issue against a whole node.
    #[must_use]
    pub fn node(
        address: KeyAddress,
        category: IssueCategory,
        severity: Severity,
        description: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            address,
            value_name: String::new(),
            description: description.into(),
            details: details.into(),
            category,
            severity,
        }
    }

    /// Whether this issue targets a single value rather than a node.
    #[must_use]
    pub fn is_value_issue(&self) -> bool {
        !self.value_name.is_empty()
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_value_issue() {
            write!(f, "{}\\{}", self.address, self.value_name)
        } else {
            write!(f, "{}", self.address)
        }
    }
}

// ──────────────────── scanner trait ────────────────────

/// Shared read-only context handed to every scanner.
pub struct ScanContext<'a> {
    pub store: &'a dyn StoreBackend,
    pub probe: &'a dyn pathex::FileProbe,
    pub config: &'a ScanConfig,
}

/// Progress callback: scanner name, the address currently being visited, and
/// the number of issues found so far. A best-effort UI hint, nothing more.
pub type Progress<'a> = dyn FnMut(&str, &KeyAddress, usize) + 'a;

/// A single detection heuristic.
///
/// Implementations must not mutate the store and must tolerate any of their
/// well-known roots being absent or unreadable.
pub trait Scanner: Send {
    /// Stable human-readable name, used for enable/disable and progress.
    fn name(&self) -> &'static str;

    /// The primary category this scanner reports.
    fn category(&self) -> IssueCategory;

    /// Whether the engine should run this scanner.
    fn enabled(&self) -> bool;

    /// Toggle this scanner on or off.
    fn set_enabled(&mut self, enabled: bool);

    /// Walk the scanner's roots and report findings.
    fn scan(&self, ctx: &ScanContext<'_>, progress: &mut Progress<'_>) -> Vec<Issue>;
}

/// The full built-in roster, in the order scans run.
#[must_use]
pub fn default_scanners() -> Vec<Box<dyn Scanner>> {
    vec![
        Box::new(StartupScanner::new()),
        Box::new(UninstallScanner::new()),
        Box::new(FileExtensionScanner::new()),
        Box::new(MruScanner::new()),
        Box::new(SharedDllScanner::new()),
        Box::new(ComScanner::new()),
        Box::new(AppPathScanner::new()),
        Box::new(SoftwarePathScanner::new()),
        Box::new(HelpFileScanner::new()),
        Box::new(FirewallScanner::new()),
        Box::new(FontScanner::new()),
        Box::new(SoundEventScanner::new()),
        Box::new(HistoryScanner::new()),
        Box::new(ImageExecutionScanner::new()),
        Box::new(EmptyKeyScanner::new()),
        Box::new(ServiceScanner::new()),
        Box::new(MuiCacheScanner::new()),
    ]
}

// ──────────────────── shared walk helpers ────────────────────

/// List a node's children, treating any failure as "no children".
pub(crate) fn children_of(store: &dyn StoreBackend, address: &KeyAddress) -> Vec<String> {
    store
        .open(address, AccessMode::Read)
        .and_then(|handle| handle.list_children())
        .unwrap_or_default()
}

/// List a node's values, treating any failure as "no values".
pub(crate) fn values_of(store: &dyn StoreBackend, address: &KeyAddress) -> Vec<RegValue> {
    store
        .open(address, AccessMode::Read)
        .and_then(|handle| handle.list_values())
        .unwrap_or_default()
}

/// Read a node's default value as a string, if it has one.
pub(crate) fn default_string_of(store: &dyn StoreBackend, address: &KeyAddress) -> Option<String> {
    let handle = store.open(address, AccessMode::Read).ok()?;
    let value = handle.get_value("").ok()?;
    value.as_string().map(str::to_string)
}

/// Read a named value as a string, if present and string-typed.
pub(crate) fn string_value_of(
    store: &dyn StoreBackend,
    address: &KeyAddress,
    name: &str,
) -> Option<String> {
    let handle = store.open(address, AccessMode::Read).ok()?;
    let value = handle.get_value(name).ok()?;
    value.as_string().map(str::to_string)
}

/// Read a named value as a DWORD, if present and numeric.
pub(crate) fn dword_value_of(
    store: &dyn StoreBackend,
    address: &KeyAddress,
    name: &str,
) -> Option<u32> {
    let handle = store.open(address, AccessMode::Read).ok()?;
    handle.get_value(name).ok()?.as_dword()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RootKey;

    #[test]
    fn value_issue_display_includes_value_name() {
        let issue = Issue::value(
            KeyAddress::new(RootKey::CurrentUser, "Software\\Vendor"),
            "OldEntry",
            IssueCategory::InvalidStartup,
            Severity::Medium,
            "startup target missing",
            "C:\\gone.exe",
        );
        assert!(issue.is_value_issue());
        assert_eq!(
            issue.to_string(),
            "HKEY_CURRENT_USER\\Software\\Vendor\\OldEntry"
        );
    }

    #[test]
    fn node_issue_display_is_the_address() {
        let issue = Issue::node(
            KeyAddress::new(RootKey::LocalMachine, "SOFTWARE\\Dead"),
            IssueCategory::EmptyKey,
            Severity::Low,
            "empty key",
            "",
        );
        assert!(!issue.is_value_issue());
        assert_eq!(issue.to_string(), "HKEY_LOCAL_MACHINE\\SOFTWARE\\Dead");
    }

    #[test]
    fn severity_ordering_puts_critical_last() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn roster_has_all_built_in_scanners() {
        let scanners = default_scanners();
        assert_eq!(scanners.len(), 17);
        assert!(scanners.iter().all(|s| s.enabled()));

        let mut names: Vec<_> = scanners.iter().map(|s| s.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 17, "scanner names must be unique");
    }
}
