//! Registered filesystem paths: App Paths, vendor install paths, help
//! files, fonts, and sound events.

use crate::protect::is_critical_keyword;
use crate::scanner::pathex::{expand_env_vars, extract_file_path, target_exists};
use crate::scanner::{
    children_of, default_string_of, string_value_of, values_of, Issue, IssueCategory, Progress,
    ScanContext, Scanner, Severity,
};
use crate::store::{KeyAddress, RootKey};

/// Vendor subtrees the install-path walk never descends into.
const SKIPPED_VENDORS: &[&str] = &[
    "Microsoft",
    "Windows",
    "Classes",
    "Policies",
    "Wow6432Node",
    "Clients",
];

// ──────────────────── App Paths ────────────────────

const APP_PATHS: &str = "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\App Paths";

/// Flags App Paths entries whose registered executable is missing.
pub struct AppPathScanner {
    enabled: bool,
}

impl AppPathScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self { enabled: true }
    }
}

impl Default for AppPathScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for AppPathScanner {
    fn name(&self) -> &'static str {
        "app_paths"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::StaleAppPath
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn scan(&self, ctx: &ScanContext<'_>, progress: &mut Progress<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();

        for root in [RootKey::LocalMachine, RootKey::CurrentUser] {
            let base = KeyAddress::new(root, APP_PATHS);
            progress(self.name(), &base, issues.len());

            for entry in children_of(ctx.store, &base) {
                let addr = base.child(&entry);
                let Some(raw) = default_string_of(ctx.store, &addr) else {
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
                issues.push(Issue::node(
                    addr,
                    IssueCategory::StaleAppPath,
                    severity,
                    "registered application path is missing",
                    path,
                ));
            }
        }

        issues
    }
}

// ──────────────────── vendor install paths ────────────────────

/// Value names vendors use to record where a product landed.
const INSTALL_PATH_VALUES: &[&str] = &["InstallPath", "InstallLocation", "InstallDir"];

/// Flags `company\product` keys whose recorded install directory is gone.
///
/// Walks exactly two levels under each SOFTWARE hive and leaves the core
/// vendor subtrees alone.
pub struct SoftwarePathScanner {
    enabled: bool,
}

impl SoftwarePathScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self { enabled: true }
    }
}

impl Default for SoftwarePathScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn skipped_vendor(name: &str) -> bool {
    SKIPPED_VENDORS
        .iter()
        .any(|vendor| vendor.eq_ignore_ascii_case(name))
}

/// The recorded install directory when it no longer exists.
fn stale_install_dir(ctx: &ScanContext<'_>, addr: &KeyAddress) -> Option<String> {
    for name in INSTALL_PATH_VALUES {
        let Some(raw) = string_value_of(ctx.store, addr, name) else {
            continue;
        };
        let expanded = expand_env_vars(raw.trim());
        if expanded.is_empty() {
            continue;
        }
        if ctx.probe.exists(&expanded) {
            return None;
        }
        return Some(expanded);
    }
    None
}

impl Scanner for SoftwarePathScanner {
    fn name(&self) -> &'static str {
        "software_paths"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::StaleInstallPath
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn scan(&self, ctx: &ScanContext<'_>, progress: &mut Progress<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();

        for root in [RootKey::LocalMachine, RootKey::CurrentUser] {
            let software = KeyAddress::new(root, "SOFTWARE");
            progress(self.name(), &software, issues.len());

            for company in children_of(ctx.store, &software) {
                if skipped_vendor(&company) || is_critical_keyword(&company) {
                    continue;
                }
                let company_addr = software.child(&company);
                for product in children_of(ctx.store, &company_addr) {
                    let product_addr = company_addr.child(&product);
                    if let Some(dir) = stale_install_dir(ctx, &product_addr) {
                        issues.push(Issue::node(
                            product_addr,
                            IssueCategory::StaleInstallPath,
                            Severity::Low,
                            "recorded install directory no longer exists",
                            dir,
                        ));
                    }
                }
            }
        }

        issues
    }
}

// ──────────────────── help files ────────────────────

const HELP_ROOT: &str = "SOFTWARE\\Microsoft\\Windows\\Help";

/// Flags help-file registrations pointing at files that are gone.
///
/// Value name is the help file, data the directory holding it.
pub struct HelpFileScanner {
    enabled: bool,
}

impl HelpFileScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self { enabled: true }
    }
}

impl Default for HelpFileScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for HelpFileScanner {
    fn name(&self) -> &'static str {
        "help_files"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::MissingHelpFile
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn scan(&self, ctx: &ScanContext<'_>, progress: &mut Progress<'_>) -> Vec<Issue> {
        let address = KeyAddress::new(RootKey::LocalMachine, HELP_ROOT);
        let mut issues = Vec::new();
        progress(self.name(), &address, issues.len());
        for value in values_of(ctx.store, &address) {
            if value.name.trim().is_empty() {
                continue;
            }
            let Some(dir) = value.as_string() else {
                continue;
            };
            let dir = expand_env_vars(dir.trim());
            if dir.is_empty() {
                continue;
            }
            let full = format!("{}\\{}", dir.trim_end_matches('\\'), value.name);
            if ctx.probe.exists(&full) {
                continue;
            }
            issues.push(Issue::value(
                address.clone(),
                &value.name,
                IssueCategory::MissingHelpFile,
                Severity::Low,
                "registered help file is missing",
                full,
            ));
        }

        issues
    }
}

// ──────────────────── fonts ────────────────────

const FONTS_ROOT: &str = "SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion\\Fonts";

/// Flags font registrations whose file is gone. Bare filenames resolve
/// under `%SystemRoot%\Fonts`.
pub struct FontScanner {
    enabled: bool,
}

impl FontScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self { enabled: true }
    }
}

impl Default for FontScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for FontScanner {
    fn name(&self) -> &'static str {
        "fonts"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::MissingFontFile
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn scan(&self, ctx: &ScanContext<'_>, progress: &mut Progress<'_>) -> Vec<Issue> {
        let address = KeyAddress::new(RootKey::LocalMachine, FONTS_ROOT);
        let mut issues = Vec::new();
        progress(self.name(), &address, issues.len());
        for value in values_of(ctx.store, &address) {
            let Some(file) = value.as_string() else {
                continue;
            };
            let file = file.trim();
            if file.is_empty() {
                continue;
            }
            let full = if file.contains('\\') {
                expand_env_vars(file)
            } else {
                expand_env_vars(&format!("%SystemRoot%\\Fonts\\{file}"))
            };
            if ctx.probe.exists(&full) {
                continue;
            }
            issues.push(Issue::value(
                address.clone(),
                &value.name,
                IssueCategory::MissingFontFile,
                Severity::Low,
                "registered font file is missing",
                full,
            ));
        }

        issues
    }
}

// ──────────────────── sound events ────────────────────

const SOUND_APPS: &str = "AppEvents\\Schemes\\Apps";

/// Flags sound-scheme `.Current` keys whose media file is gone.
pub struct SoundEventScanner {
    enabled: bool,
}

impl SoundEventScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self { enabled: true }
    }
}

impl Default for SoundEventScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for SoundEventScanner {
    fn name(&self) -> &'static str {
        "sound_events"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::MissingSoundFile
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn scan(&self, ctx: &ScanContext<'_>, progress: &mut Progress<'_>) -> Vec<Issue> {
        let apps = KeyAddress::new(RootKey::CurrentUser, SOUND_APPS);
        let mut issues = Vec::new();
        progress(self.name(), &apps, issues.len());
        for app in children_of(ctx.store, &apps) {
            let app_addr = apps.child(&app);
            for event in children_of(ctx.store, &app_addr) {
                let current = app_addr.child(&event).child(".Current");
                let Some(raw) = default_string_of(ctx.store, &current) else {
                    continue;
                };
                let media = expand_env_vars(raw.trim());
                // an empty assignment means "no sound", which is valid
                if media.is_empty() || ctx.probe.exists(&media) {
                    continue;
                }
                issues.push(Issue::node(
                    current,
                    IssueCategory::MissingSoundFile,
                    Severity::Low,
                    "sound event points at missing media",
                    media,
                ));
            }
        }

        issues
    }
}
