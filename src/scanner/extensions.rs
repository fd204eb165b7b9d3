//! File-extension associations pointing at classes that no longer exist.

use crate::scanner::pathex::target_exists;
use crate::scanner::{
    children_of, default_string_of, Issue, IssueCategory, Progress, ScanContext, Scanner, Severity,
};
use crate::store::{KeyAddress, RootKey, StoreBackend};

/// Extensions the OS itself depends on; never reported regardless of state.
const SYSTEM_EXTENSIONS: &[&str] = &[
    ".exe", ".dll", ".bat", ".cmd", ".com", ".lnk", ".msi", ".sys", ".ini", ".inf", ".ocx",
    ".cpl", ".scr", ".drv",
];

/// Flags dot-keys whose `ProgID` class is gone (medium) or whose open
/// command is broken (low).
pub struct FileExtensionScanner {
    enabled: bool,
}

impl FileExtensionScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self { enabled: true }
    }
}

impl Default for FileExtensionScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for FileExtensionScanner {
    fn name(&self) -> &'static str {
        "file_extensions"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::BrokenExtension
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn scan(&self, ctx: &ScanContext<'_>, progress: &mut Progress<'_>) -> Vec<Issue> {
        let root = KeyAddress::new(RootKey::ClassesRoot, "");
        let mut issues = Vec::new();
        progress(self.name(), &root, issues.len());
        for child in children_of(ctx.store, &root) {
            if !child.starts_with('.') {
                continue;
            }
            if SYSTEM_EXTENSIONS
                .iter()
                .any(|ext| ext.eq_ignore_ascii_case(&child))
            {
                continue;
            }

            let ext_addr = root.child(&child);
            let Some(progid) = default_string_of(ctx.store, &ext_addr) else {
                continue;
            };
            if progid.trim().is_empty() {
                continue;
            }

            let class_addr = KeyAddress::new(RootKey::ClassesRoot, progid.trim());
            if !ctx.store.key_exists(&class_addr) {
                issues.push(Issue::node(
                    ext_addr,
                    IssueCategory::BrokenExtension,
                    Severity::Medium,
                    "extension maps to a class that does not exist",
                    progid.trim(),
                ));
                continue;
            }

            if let Some(broken_cmd) = broken_open_command(ctx, &class_addr) {
                issues.push(Issue::node(
                    ext_addr,
                    IssueCategory::BrokenExtension,
                    Severity::Low,
                    "extension class has a broken open command",
                    broken_cmd,
                ));
            }
        }

        issues
    }
}

/// The class's `shell\open\command` when it points at a missing program.
fn broken_open_command(ctx: &ScanContext<'_>, class_addr: &KeyAddress) -> Option<String> {
    let command_addr = class_addr.child("shell").child("open").child("command");
    let command = default_string_of(ctx.store, &command_addr)?;
    if command.trim().is_empty() || target_exists(&command, ctx.probe) {
        None
    } else {
        Some(command)
    }
}
