//! Uninstall registrations left behind by removed programs.

use crate::scanner::pathex::target_exists;
use crate::scanner::{
    children_of, dword_value_of, string_value_of, Issue, IssueCategory, Progress, ScanContext,
    Scanner, Severity,
};
use crate::store::{KeyAddress, RootKey};

const UNINSTALL_ROOTS: &[(RootKey, &str)] = &[
    (
        RootKey::LocalMachine,
        "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Uninstall",
    ),
    (
        RootKey::LocalMachine,
        "SOFTWARE\\WOW6432Node\\Microsoft\\Windows\\CurrentVersion\\Uninstall",
    ),
    (
        RootKey::CurrentUser,
        "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Uninstall",
    ),
];

/// Flags uninstall entries whose uninstaller and install location are both
/// gone.
///
/// OS servicing entries (SystemComponent=1, Update/Hotfix release types) are
/// left alone; they legitimately carry no uninstaller path.
pub struct UninstallScanner {
    enabled: bool,
}

impl UninstallScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self { enabled: true }
    }
}

impl Default for UninstallScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for UninstallScanner {
    fn name(&self) -> &'static str {
        "uninstall"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::OrphanedUninstall
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn scan(&self, ctx: &ScanContext<'_>, progress: &mut Progress<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();

        for &(root, subpath) in UNINSTALL_ROOTS {
            let base = KeyAddress::new(root, subpath);
            progress(self.name(), &base, issues.len());

            for entry in children_of(ctx.store, &base) {
                let addr = base.child(&entry);

                if dword_value_of(ctx.store, &addr, "SystemComponent") == Some(1) {
                    continue;
                }
                if let Some(release) = string_value_of(ctx.store, &addr, "ReleaseType") {
                    let folded = release.to_ascii_lowercase();
                    if folded.contains("update") || folded.contains("hotfix") {
                        continue;
                    }
                }

                let Some(display_name) = string_value_of(ctx.store, &addr, "DisplayName") else {
                    continue;
                };
                if display_name.trim().is_empty() {
                    continue;
                }

                let uninstaller_ok = ["UninstallString", "QuietUninstallString"]
                    .iter()
                    .filter_map(|name| string_value_of(ctx.store, &addr, name))
                    .any(|cmd| !cmd.trim().is_empty() && target_exists(&cmd, ctx.probe));
                let location_ok = string_value_of(ctx.store, &addr, "InstallLocation")
                    .is_some_and(|loc| !loc.trim().is_empty() && ctx.probe.exists(loc.trim()));

                if !uninstaller_ok && !location_ok {
                    issues.push(Issue::node(
                        addr,
                        IssueCategory::OrphanedUninstall,
                        Severity::Medium,
                        "uninstall entry with no uninstaller or install location",
                        display_name,
                    ));
                }
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ScanConfig;
    use crate::scanner::pathex::FixedProbe;
    use crate::store::memory::MemoryStore;
    use crate::store::value::RegValue;

    fn uninstall_root() -> KeyAddress {
        KeyAddress::new(
            RootKey::LocalMachine,
            "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Uninstall",
        )
    }

    fn scan(store: &MemoryStore, probe: &FixedProbe) -> Vec<Issue> {
        let config = ScanConfig::default();
        let ctx = ScanContext {
            store,
            probe,
            config: &config,
        };
        UninstallScanner::new().scan(&ctx, &mut |_, _, _| {})
    }

    #[test]
    fn orphaned_entry_is_reported_as_node_issue() {
        let store = MemoryStore::new();
        let entry = uninstall_root().child("DeadApp");
        store.add_key(&entry);
        store.add_value(&entry, RegValue::string("DisplayName", "Dead App 1.0"));
        store.add_value(
            &entry,
            RegValue::string("UninstallString", "C:\\Dead\\unins.exe /s"),
        );

        let issues = scan(&store, &FixedProbe::empty());
        assert_eq!(issues.len(), 1);
        assert!(!issues[0].is_value_issue());
        assert_eq!(issues[0].details, "Dead App 1.0");
    }

    #[test]
    fn live_uninstaller_or_location_clears_the_entry() {
        let store = MemoryStore::new();

        let by_uninstaller = uninstall_root().child("AppA");
        store.add_key(&by_uninstaller);
        store.add_value(&by_uninstaller, RegValue::string("DisplayName", "App A"));
        store.add_value(
            &by_uninstaller,
            RegValue::string("UninstallString", "\"C:\\AppA\\unins.exe\""),
        );

        let by_location = uninstall_root().child("AppB");
        store.add_key(&by_location);
        store.add_value(&by_location, RegValue::string("DisplayName", "App B"));
        store.add_value(
            &by_location,
            RegValue::string("InstallLocation", "C:\\AppB"),
        );

        let probe = FixedProbe::with_paths(["C:\\AppA\\unins.exe", "C:\\AppB"]);
        assert!(scan(&store, &probe).is_empty());
    }

    #[test]
    fn system_components_and_updates_are_skipped() {
        let store = MemoryStore::new();

        let component = uninstall_root().child("OsPiece");
        store.add_key(&component);
        store.add_value(&component, RegValue::string("DisplayName", "OS Piece"));
        store.add_value(&component, RegValue::dword("SystemComponent", 1));

        let hotfix = uninstall_root().child("KB123456");
        store.add_key(&hotfix);
        store.add_value(&hotfix, RegValue::string("DisplayName", "Hotfix KB123456"));
        store.add_value(&hotfix, RegValue::string("ReleaseType", "Hotfix"));

        assert!(scan(&store, &FixedProbe::empty()).is_empty());
    }

    #[test]
    fn entries_without_display_name_are_ignored() {
        let store = MemoryStore::new();
        let entry = uninstall_root().child("NoName");
        store.add_key(&entry);
        store.add_value(
            &entry,
            RegValue::string("UninstallString", "C:\\Gone\\u.exe"),
        );

        assert!(scan(&store, &FixedProbe::empty()).is_empty());
    }
}
