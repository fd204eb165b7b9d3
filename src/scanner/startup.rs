//! Startup entries whose target program no longer exists.

use crate::protect::{is_critical_keyword, is_protected_value_name};
use crate::scanner::pathex::{extract_file_path, target_exists};
use crate::scanner::{Issue, IssueCategory, Progress, ScanContext, Scanner, Severity, values_of};
use crate::store::{KeyAddress, RootKey};

const STARTUP_ROOTS: &[(RootKey, &str)] = &[
    (
        RootKey::CurrentUser,
        "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Run",
    ),
    (
        RootKey::CurrentUser,
        "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\RunOnce",
    ),
    (
        RootKey::LocalMachine,
        "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Run",
    ),
    (
        RootKey::LocalMachine,
        "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\RunOnce",
    ),
    (
        RootKey::LocalMachine,
        "SOFTWARE\\WOW6432Node\\Microsoft\\Windows\\CurrentVersion\\Run",
    ),
    (
        RootKey::LocalMachine,
        "SOFTWARE\\WOW6432Node\\Microsoft\\Windows\\CurrentVersion\\RunOnce",
    ),
];

/// Flags autostart values whose command points at a missing file.
pub struct StartupScanner {
    enabled: bool,
}

impl StartupScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self { enabled: true }
    }
}

impl Default for StartupScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for StartupScanner {
    fn name(&self) -> &'static str {
        "startup"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::InvalidStartup
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn scan(&self, ctx: &ScanContext<'_>, progress: &mut Progress<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();

        for &(root, subpath) in STARTUP_ROOTS {
            let address = KeyAddress::new(root, subpath);
            progress(self.name(), &address, issues.len());

            for value in values_of(ctx.store, &address) {
                if is_protected_value_name(&value.name) {
                    continue;
                }
                let Some(command) = value.as_string() else {
                    continue;
                };
                if command.trim().is_empty() || target_exists(command, ctx.probe) {
                    continue;
                }

                let target = extract_file_path(command, ctx.probe).unwrap_or_default();
                let severity = if is_critical_keyword(command) {
                    Severity::Critical
                } else {
                    Severity::Medium
                };
                issues.push(Issue::value(
                    address.clone(),
                    &value.name,
                    IssueCategory::InvalidStartup,
                    severity,
                    "startup command points at a missing file",
                    target,
                ));
            }
        }

        issues
    }
}
