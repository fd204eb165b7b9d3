//! COM registrations and shared-DLL reference counts.

use crate::protect::is_critical_keyword;
use crate::scanner::pathex::{extract_file_path, target_exists};
use crate::scanner::{
    children_of, default_string_of, values_of, Issue, IssueCategory, Progress, ScanContext,
    Scanner, Severity,
};
use crate::store::{KeyAddress, RootKey, StoreBackend};

const SHARED_DLLS: &str = "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\SharedDLLs";

const APPROVED_EXTENSIONS: &str =
    "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Shell Extensions\\Approved";

const CONTEXT_MENU_ROOTS: &[&str] = &[
    "*\\shellex\\ContextMenuHandlers",
    "Directory\\shellex\\ContextMenuHandlers",
    "Folder\\shellex\\ContextMenuHandlers",
];

/// Flags shared-DLL refcount entries whose file is gone or whose count has
/// dropped to zero.
pub struct SharedDllScanner {
    enabled: bool,
}

impl SharedDllScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self { enabled: true }
    }
}

impl Default for SharedDllScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for SharedDllScanner {
    fn name(&self) -> &'static str {
        "shared_dlls"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::OrphanedSharedDll
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn scan(&self, ctx: &ScanContext<'_>, progress: &mut Progress<'_>) -> Vec<Issue> {
        let address = KeyAddress::new(RootKey::LocalMachine, SHARED_DLLS);
        let mut issues = Vec::new();
        progress(self.name(), &address, issues.len());
        for value in values_of(ctx.store, &address) {
            // the value NAME is the DLL path here
            let dll_path = value.name.trim();
            if dll_path.is_empty() {
                continue;
            }
            let expanded = crate::scanner::pathex::expand_env_vars(dll_path);

            let missing = !ctx.probe.exists(&expanded);
            let zero_refs = value.as_dword() == Some(0);
            if !missing && !zero_refs {
                continue;
            }

            let severity = if is_critical_keyword(dll_path) {
                Severity::Critical
            } else {
                Severity::Low
            };
            let details = if missing {
                "file missing"
            } else {
                "reference count is zero"
            };
            issues.push(Issue::value(
                address.clone(),
                dll_path,
                IssueCategory::OrphanedSharedDll,
                severity,
                "shared DLL entry is orphaned",
                details,
            ));
        }

        issues
    }
}

// ──────────────────── COM classes ────────────────────

/// Flags CLSID entries whose in-proc or local server file is missing, and
/// TypeLib versions whose platform paths are all gone.
pub struct ComScanner {
    enabled: bool,
}

impl ComScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self { enabled: true }
    }
}

impl Default for ComScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for ComScanner {
    fn name(&self) -> &'static str {
        "com"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::BrokenComReference
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn scan(&self, ctx: &ScanContext<'_>, progress: &mut Progress<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();

        let clsid_root = KeyAddress::new(RootKey::ClassesRoot, "CLSID");
        progress(self.name(), &clsid_root, issues.len());
        for guid in children_of(ctx.store, &clsid_root) {
            let class_addr = clsid_root.child(&guid);
            if let Some(issue) = broken_server(ctx, &class_addr) {
                issues.push(issue);
            }
        }

        let typelib_root = KeyAddress::new(RootKey::ClassesRoot, "TypeLib");
        progress(self.name(), &typelib_root, issues.len());
        for guid in children_of(ctx.store, &typelib_root) {
            let lib_addr = typelib_root.child(&guid);
            for version in children_of(ctx.store, &lib_addr) {
                let version_addr = lib_addr.child(&version);
                if let Some(issue) = dead_typelib_version(ctx, &version_addr) {
                    issues.push(issue);
                }
            }
        }

        // approved shell extensions whose CLSID no longer resolves
        let approved = KeyAddress::new(RootKey::LocalMachine, APPROVED_EXTENSIONS);
        progress(self.name(), &approved, issues.len());
        for value in values_of(ctx.store, &approved) {
            if !value.name.starts_with('{') || clsid_registered(ctx, &value.name) {
                continue;
            }
            let description = value.as_string().unwrap_or(&value.name).to_string();
            issues.push(Issue::value(
                approved.clone(),
                &value.name,
                IssueCategory::BrokenComReference,
                Severity::Low,
                "approved shell extension is orphaned",
                description,
            ));
        }

        // context-menu handlers pointing at unregistered CLSIDs
        for location in CONTEXT_MENU_ROOTS {
            let base = KeyAddress::new(RootKey::ClassesRoot, *location);
            progress(self.name(), &base, issues.len());
            for handler in children_of(ctx.store, &base) {
                let handler_addr = base.child(&handler);
                // the handler's default value carries the CLSID; the key
                // name itself is the fallback
                let clsid = default_string_of(ctx.store, &handler_addr)
                    .unwrap_or_else(|| handler.clone());
                if !clsid.starts_with('{') || clsid_registered(ctx, &clsid) {
                    continue;
                }
                issues.push(Issue::node(
                    handler_addr,
                    IssueCategory::BrokenComReference,
                    Severity::Medium,
                    "context menu handler references an unregistered COM class",
                    clsid,
                ));
            }
        }

        issues
    }
}

/// Whether a CLSID has a registration key under `HKCR\CLSID`.
fn clsid_registered(ctx: &ScanContext<'_>, clsid: &str) -> bool {
    let addr = KeyAddress::new(RootKey::ClassesRoot, format!("CLSID\\{clsid}"));
    ctx.store.key_exists(&addr)
}

/// A CLSID whose registered server file is missing.
fn broken_server(ctx: &ScanContext<'_>, class_addr: &KeyAddress) -> Option<Issue> {
    for server_key in ["InprocServer32", "LocalServer32"] {
        let server_addr = class_addr.child(server_key);
        let Some(raw) = default_string_of(ctx.store, &server_addr) else {
            continue;
        };
        if raw.trim().is_empty() || target_exists(&raw, ctx.probe) {
            continue;
        }
        let path = extract_file_path(&raw, ctx.probe).unwrap_or_default();
        let severity = if is_critical_keyword(&raw) {
            Severity::Critical
        } else {
            Severity::Medium
        };
        return Some(Issue::node(
            class_addr.clone(),
            IssueCategory::BrokenComReference,
            severity,
            "COM class server file is missing",
            format!("{server_key}: {path}"),
        ));
    }
    None
}

/// A TypeLib version where every platform path is missing.
///
/// Layout is `TypeLib\{guid}\<version>\<lcid>\<platform>` with the library
/// path as the platform key's default value.
fn dead_typelib_version(ctx: &ScanContext<'_>, version_addr: &KeyAddress) -> Option<Issue> {
    let mut saw_path = false;
    let mut example = String::new();

    for lcid in children_of(ctx.store, version_addr) {
        // numeric children are locale IDs; FLAGS / HELPDIR are metadata
        if !lcid.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let lcid_addr = version_addr.child(&lcid);
        for platform in children_of(ctx.store, &lcid_addr) {
            let platform_addr = lcid_addr.child(&platform);
            let Some(raw) = default_string_of(ctx.store, &platform_addr) else {
                continue;
            };
            if raw.trim().is_empty() {
                continue;
            }
            saw_path = true;
            if target_exists(&raw, ctx.probe) {
                return None;
            }
            example = raw;
        }
    }

    if saw_path {
        Some(Issue::node(
            version_addr.clone(),
            IssueCategory::BrokenComReference,
            Severity::Low,
            "type library has no resolvable platform path",
            example,
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ScanConfig;
    use crate::scanner::pathex::FixedProbe;
    use crate::store::memory::MemoryStore;
    use crate::store::value::RegValue;

    fn ctx<'a>(
        store: &'a MemoryStore,
        probe: &'a FixedProbe,
        config: &'a ScanConfig,
    ) -> ScanContext<'a> {
        ScanContext {
            store,
            probe,
            config,
        }
    }

    #[test]
    fn shared_dll_missing_file_and_zero_refcount() {
        let store = MemoryStore::new();
        let shared = KeyAddress::new(RootKey::LocalMachine, SHARED_DLLS);
        store.add_key(&shared);
        store.add_value(&shared, RegValue::dword("C:\\Gone\\old.dll", 3));
        store.add_value(&shared, RegValue::dword("C:\\App\\live.dll", 0));
        store.add_value(&shared, RegValue::dword("C:\\App\\used.dll", 2));

        let probe = FixedProbe::with_paths(["C:\\App\\live.dll", "C:\\App\\used.dll"]);
        let config = ScanConfig::default();
        let issues = SharedDllScanner::new().scan(&ctx(&store, &probe, &config), &mut |_, _, _| {});

        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.is_value_issue()));
        assert!(issues.iter().any(|i| i.details == "file missing"));
        assert!(issues.iter().any(|i| i.details == "reference count is zero"));
    }

    #[test]
    fn clsid_with_missing_inproc_server() {
        let store = MemoryStore::new();
        let server = KeyAddress::new(
            RootKey::ClassesRoot,
            "CLSID\\{11111111-2222-3333-4444-555555555555}\\InprocServer32",
        );
        store.add_key(&server);
        store.add_value(&server, RegValue::string("", "C:\\Gone\\comserver.dll"));

        let probe = FixedProbe::empty();
        let config = ScanConfig::default();
        let issues = ComScanner::new().scan(&ctx(&store, &probe, &config), &mut |_, _, _| {});

        assert_eq!(issues.len(), 1);
        assert!(!issues[0].is_value_issue());
        assert!(issues[0].details.starts_with("InprocServer32"));
    }

    #[test]
    fn clsid_with_live_server_is_clean() {
        let store = MemoryStore::new();
        let server = KeyAddress::new(
            RootKey::ClassesRoot,
            "CLSID\\{11111111-2222-3333-4444-555555555555}\\LocalServer32",
        );
        store.add_key(&server);
        store.add_value(&server, RegValue::string("", "\"C:\\App\\server.exe\""));

        let probe = FixedProbe::with_paths(["C:\\App\\server.exe"]);
        let config = ScanConfig::default();
        let issues = ComScanner::new().scan(&ctx(&store, &probe, &config), &mut |_, _, _| {});
        assert!(issues.is_empty());
    }

    #[test]
    fn approved_extension_reported_only_when_clsid_is_gone() {
        let store = MemoryStore::new();
        let approved = KeyAddress::new(RootKey::LocalMachine, APPROVED_EXTENSIONS);
        store.add_value(
            &approved,
            RegValue::string("{11111111-aaaa-bbbb-cccc-000000000001}", "Live Overlay"),
        );
        store.add_value(
            &approved,
            RegValue::string("{22222222-aaaa-bbbb-cccc-000000000002}", "Gone Overlay"),
        );
        // non-CLSID housekeeping values are ignored
        store.add_value(&approved, RegValue::dword("DefaultLevel", 1));
        store.add_key(&KeyAddress::new(
            RootKey::ClassesRoot,
            "CLSID\\{11111111-aaaa-bbbb-cccc-000000000001}",
        ));

        let probe = FixedProbe::empty();
        let config = ScanConfig::default();
        let issues = ComScanner::new().scan(&ctx(&store, &probe, &config), &mut |_, _, _| {});

        assert_eq!(issues.len(), 1);
        assert!(issues[0].is_value_issue());
        assert_eq!(
            issues[0].value_name,
            "{22222222-aaaa-bbbb-cccc-000000000002}"
        );
        assert_eq!(issues[0].details, "Gone Overlay");
        assert_eq!(issues[0].severity, Severity::Low);
    }

    #[test]
    fn context_menu_handler_with_unregistered_clsid() {
        let store = MemoryStore::new();
        let live = KeyAddress::new(
            RootKey::ClassesRoot,
            "Directory\\shellex\\ContextMenuHandlers\\LiveHandler",
        );
        store.add_value(
            &live,
            RegValue::string("", "{33333333-aaaa-bbbb-cccc-000000000003}"),
        );
        store.add_key(&KeyAddress::new(
            RootKey::ClassesRoot,
            "CLSID\\{33333333-aaaa-bbbb-cccc-000000000003}",
        ));

        // handler key named by its CLSID directly, with no registration
        store.add_key(&KeyAddress::new(
            RootKey::ClassesRoot,
            "*\\shellex\\ContextMenuHandlers\\{44444444-aaaa-bbbb-cccc-000000000004}",
        ));

        let probe = FixedProbe::empty();
        let config = ScanConfig::default();
        let issues = ComScanner::new().scan(&ctx(&store, &probe, &config), &mut |_, _, _| {});

        assert_eq!(issues.len(), 1);
        assert!(!issues[0].is_value_issue());
        assert_eq!(
            issues[0].address,
            KeyAddress::new(
                RootKey::ClassesRoot,
                "*\\shellex\\ContextMenuHandlers\\{44444444-aaaa-bbbb-cccc-000000000004}",
            )
        );
        assert_eq!(issues[0].severity, Severity::Medium);
    }

    #[test]
    fn typelib_dead_only_when_all_platforms_missing() {
        let store = MemoryStore::new();
        let win32 = KeyAddress::new(
            RootKey::ClassesRoot,
            "TypeLib\\{aaaa}\\1.0\\0\\win32",
        );
        let win64 = KeyAddress::new(
            RootKey::ClassesRoot,
            "TypeLib\\{aaaa}\\1.0\\0\\win64",
        );
        store.add_key(&win32);
        store.add_key(&win64);
        store.add_value(&win32, RegValue::string("", "C:\\Gone\\lib32.dll"));
        store.add_value(&win64, RegValue::string("", "C:\\App\\lib64.dll"));

        let config = ScanConfig::default();

        // one live platform keeps the version
        let live = FixedProbe::with_paths(["C:\\App\\lib64.dll"]);
        assert!(
            ComScanner::new()
                .scan(&ctx(&store, &live, &config), &mut |_, _, _| {})
                .is_empty()
        );

        // both gone: report the version key
        let none = FixedProbe::empty();
        let issues = ComScanner::new().scan(&ctx(&store, &none, &config), &mut |_, _, _| {});
        assert_eq!(issues.len(), 1);
        assert_eq!(
            issues[0].address,
            KeyAddress::new(RootKey::ClassesRoot, "TypeLib\\{aaaa}\\1.0")
        );
    }
}
