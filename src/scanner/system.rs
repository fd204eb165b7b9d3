//! System-plumbing leftovers: firewall rules, image-execution debuggers,
//! service registrations, and the shell's MuiCache.

use crate::protect::is_critical_keyword;
use crate::scanner::pathex::{expand_env_vars, extract_file_path, target_exists};
use crate::scanner::{
    children_of, dword_value_of, string_value_of, values_of, Issue, IssueCategory, Progress,
    ScanContext, Scanner, Severity,
};
use crate::store::{KeyAddress, RootKey};

// ──────────────────── firewall rules ────────────────────

const FIREWALL_RULES: &str =
    "SYSTEM\\CurrentControlSet\\Services\\SharedAccess\\Parameters\\FirewallPolicy\\FirewallRules";

/// Flags firewall rules whose `App=` target no longer exists.
pub struct FirewallScanner {
    enabled: bool,
}

impl FirewallScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self { enabled: true }
    }
}

impl Default for FirewallScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// The `App=` token of a rule string, when it names a concrete file.
fn rule_app_path(rule: &str) -> Option<String> {
    rule.split('|')
        .find_map(|token| token.strip_prefix("App="))
        .map(str::trim)
        .filter(|app| !app.is_empty() && app.contains('\\'))
        .map(expand_env_vars)
}

impl Scanner for FirewallScanner {
    fn name(&self) -> &'static str {
        "firewall"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::StaleFirewallRule
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn scan(&self, ctx: &ScanContext<'_>, progress: &mut Progress<'_>) -> Vec<Issue> {
        let address = KeyAddress::new(RootKey::LocalMachine, FIREWALL_RULES);
        let mut issues = Vec::new();
        progress(self.name(), &address, issues.len());
        for value in values_of(ctx.store, &address) {
            let Some(rule) = value.as_string() else {
                continue;
            };
            let Some(app) = rule_app_path(rule) else {
                continue;
            };
            if ctx.probe.exists(&app) {
                continue;
            }
            let severity = if is_critical_keyword(&app) {
                Severity::Critical
            } else {
                Severity::Low
            };
            issues.push(Issue::value(
                address.clone(),
                &value.name,
                IssueCategory::StaleFirewallRule,
                severity,
                "firewall rule targets a missing application",
                app,
            ));
        }

        issues
    }
}

// ──────────────────── image file execution options ────────────────────

const IFEO_ROOT: &str =
    "SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion\\Image File Execution Options";

/// Flags `Debugger` redirections pointing at missing debuggers.
///
/// These are also a classic malware persistence spot, so a stale one is
/// worth more than cosmetic cleanup.
pub struct ImageExecutionScanner {
    enabled: bool,
}

impl ImageExecutionScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self { enabled: true }
    }
}

impl Default for ImageExecutionScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for ImageExecutionScanner {
    fn name(&self) -> &'static str {
        "image_execution"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::BrokenImageExecution
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn scan(&self, ctx: &ScanContext<'_>, progress: &mut Progress<'_>) -> Vec<Issue> {
        let base = KeyAddress::new(RootKey::LocalMachine, IFEO_ROOT);
        let mut issues = Vec::new();
        progress(self.name(), &base, issues.len());
        for image in children_of(ctx.store, &base) {
            let addr = base.child(&image);
            let Some(debugger) = string_value_of(ctx.store, &addr, "Debugger") else {
                continue;
            };
            if debugger.trim().is_empty() || target_exists(&debugger, ctx.probe) {
                continue;
            }
            let path = extract_file_path(&debugger, ctx.probe).unwrap_or_default();
            issues.push(Issue::value(
                addr,
                "Debugger",
                IssueCategory::BrokenImageExecution,
                Severity::Medium,
                "image execution debugger is missing",
                path,
            ));
        }

        issues
    }
}

// ──────────────────── services ────────────────────

const SERVICES_ROOT: &str = "SYSTEM\\CurrentControlSet\\Services";

const SERVICE_KERNEL_DRIVER: u32 = 0x1;
const SERVICE_FS_DRIVER: u32 = 0x2;
const SERVICE_START_DISABLED: u32 = 4;

/// Flags enabled non-driver services whose binary is missing.
pub struct ServiceScanner {
    enabled: bool,
}

impl ServiceScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self { enabled: true }
    }
}

impl Default for ServiceScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a service `ImagePath` into a plain filesystem path.
///
/// Handles the `\??\` device prefix and the boot-time `\SystemRoot\`
/// notation before the usual command-line extraction.
fn resolve_image_path(raw: &str, ctx: &ScanContext<'_>) -> Option<String> {
    let mut text = raw.trim().to_string();
    if let Some(stripped) = text.strip_prefix("\\??\\") {
        text = stripped.to_string();
    }
    let folded = text.to_ascii_lowercase();
    if let Some(rest) = folded.strip_prefix("\\systemroot\\") {
        let tail = &text[text.len() - rest.len()..];
        text = expand_env_vars(&format!("%SystemRoot%\\{tail}"));
    }
    extract_file_path(&text, ctx.probe)
}

impl Scanner for ServiceScanner {
    fn name(&self) -> &'static str {
        "services"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::UnreachableService
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn scan(&self, ctx: &ScanContext<'_>, progress: &mut Progress<'_>) -> Vec<Issue> {
        let base = KeyAddress::new(RootKey::LocalMachine, SERVICES_ROOT);
        let mut issues = Vec::new();
        progress(self.name(), &base, issues.len());
        for service in children_of(ctx.store, &base) {
            let addr = base.child(&service);

            let service_type = dword_value_of(ctx.store, &addr, "Type").unwrap_or(0);
            if service_type & (SERVICE_KERNEL_DRIVER | SERVICE_FS_DRIVER) != 0 {
                continue;
            }
            if dword_value_of(ctx.store, &addr, "Start") == Some(SERVICE_START_DISABLED) {
                continue;
            }
            let Some(image) = string_value_of(ctx.store, &addr, "ImagePath") else {
                continue;
            };
            let Some(path) = resolve_image_path(&image, ctx) else {
                continue;
            };
            if ctx.probe.exists(&path) {
                continue;
            }
            let severity = if is_critical_keyword(&service) {
                Severity::Critical
            } else {
                Severity::Medium
            };
            issues.push(Issue::node(
                addr,
                IssueCategory::UnreachableService,
                severity,
                "service binary is missing",
                path,
            ));
        }

        issues
    }
}

// ──────────────────── MuiCache ────────────────────

const MUI_CACHE: &str =
    "SOFTWARE\\Classes\\Local Settings\\Software\\Microsoft\\Windows\\Shell\\MuiCache";

/// Flags MuiCache display-name entries for executables that are gone.
///
/// Value names look like `C:\App\tool.exe.FriendlyAppName`; the extension
/// boundary recovers the executable path.
pub struct MuiCacheScanner {
    enabled: bool,
}

impl MuiCacheScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self { enabled: true }
    }
}

impl Default for MuiCacheScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for MuiCacheScanner {
    fn name(&self) -> &'static str {
        "mui_cache"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::StaleShellCache
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn scan(&self, ctx: &ScanContext<'_>, progress: &mut Progress<'_>) -> Vec<Issue> {
        let address = KeyAddress::new(RootKey::CurrentUser, MUI_CACHE);
        let mut issues = Vec::new();
        progress(self.name(), &address, issues.len());
        for value in values_of(ctx.store, &address) {
            let name = value.name.as_str();
            // resource references and bookkeeping values stay
            if name.starts_with('@') || name.eq_ignore_ascii_case("LangID") {
                continue;
            }
            if !name.contains('\\') {
                continue;
            }
            let Some(path) = extract_file_path(name, ctx.probe) else {
                continue;
            };
            if !path.contains('.') || ctx.probe.exists(&path) {
                continue;
            }
            issues.push(Issue::value(
                address.clone(),
                name,
                IssueCategory::StaleShellCache,
                Severity::Low,
                "cached display name for a missing executable",
                path,
            ));
        }

        issues
    }
}
