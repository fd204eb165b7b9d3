//! Most-recently-used clutter and typed browser history.

use crate::scanner::{
    children_of, values_of, Issue, IssueCategory, Progress, ScanContext, Scanner, Severity,
};
use crate::store::{KeyAddress, RootKey};

/// Ordering bookkeeping values; not user data, never counted or reported.
const MRU_ORDERING_VALUES: &[&str] = &["MRUList", "MRUListEx"];

const MRU_ROOTS: &[&str] = &[
    "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Explorer\\ComDlg32\\OpenSavePidlMRU",
    "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Explorer\\ComDlg32\\LastVisitedPidlMRU",
    "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Explorer\\RecentDocs",
    "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Explorer\\RunMRU",
];

const OFFICE_ROOT: &str = "SOFTWARE\\Microsoft\\Office";

fn is_ordering_value(name: &str) -> bool {
    MRU_ORDERING_VALUES
        .iter()
        .any(|ordering| ordering.eq_ignore_ascii_case(name))
}

fn entry_count(ctx: &ScanContext<'_>, address: &KeyAddress) -> usize {
    values_of(ctx.store, address)
        .iter()
        .filter(|value| !is_ordering_value(&value.name))
        .count()
}

/// Flags MRU keys holding more entries than the hygiene threshold.
///
/// Each key is reported as a whole-node issue; deleting it resets the list
/// without touching anything the shell cannot rebuild.
pub struct MruScanner {
    enabled: bool,
}

impl MruScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self { enabled: true }
    }

    fn walk(
        &self,
        ctx: &ScanContext<'_>,
        address: &KeyAddress,
        depth: usize,
        recent_docs: bool,
        issues: &mut Vec<Issue>,
    ) {
        let count = entry_count(ctx, address);
        if count > ctx.config.mru_threshold {
            let category = if recent_docs {
                IssueCategory::OversizedRecentDocs
            } else {
                IssueCategory::MruClutter
            };
            issues.push(Issue::node(
                address.clone(),
                category,
                Severity::Low,
                "recently-used list exceeds the hygiene threshold",
                format!("{count} entries"),
            ));
            // the whole subtree goes with the node, no need to descend
            return;
        }

        if depth < ctx.config.mru_depth {
            for child in children_of(ctx.store, address) {
                self.walk(ctx, &address.child(&child), depth + 1, recent_docs, issues);
            }
        }
    }
}

impl Default for MruScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for MruScanner {
    fn name(&self) -> &'static str {
        "mru"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::MruClutter
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn scan(&self, ctx: &ScanContext<'_>, progress: &mut Progress<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();

        for subpath in MRU_ROOTS {
            let address = KeyAddress::new(RootKey::CurrentUser, *subpath);
            progress(self.name(), &address, issues.len());
            let recent_docs = subpath.ends_with("RecentDocs");
            self.walk(ctx, &address, 0, recent_docs, &mut issues);
        }

        // Office keeps per-application "File MRU" / "Place MRU" keys nested
        // under version and application keys.
        let office = KeyAddress::new(RootKey::CurrentUser, OFFICE_ROOT);
        progress(self.name(), &office, issues.len());
        self.walk_office(ctx, &office, 0, &mut issues);

        issues
    }
}

impl MruScanner {
    fn walk_office(
        &self,
        ctx: &ScanContext<'_>,
        address: &KeyAddress,
        depth: usize,
        issues: &mut Vec<Issue>,
    ) {
        if depth >= ctx.config.mru_depth {
            return;
        }
        for child in children_of(ctx.store, address) {
            let child_addr = address.child(&child);
            if child.to_ascii_lowercase().ends_with(" mru") {
                let count = entry_count(ctx, &child_addr);
                if count > ctx.config.mru_threshold {
                    issues.push(Issue::node(
                        child_addr,
                        IssueCategory::MruClutter,
                        Severity::Low,
                        "recently-used list exceeds the hygiene threshold",
                        format!("{count} entries"),
                    ));
                }
            } else {
                self.walk_office(ctx, &child_addr, depth + 1, issues);
            }
        }
    }
}

// ──────────────────── typed history ────────────────────

const TYPED_URLS: &str = "SOFTWARE\\Microsoft\\Internet Explorer\\TypedURLs";
const TYPED_PATHS: &str =
    "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Explorer\\TypedPaths";

/// Flags oversized typed-URL history and typed local paths that no longer
/// resolve.
pub struct HistoryScanner {
    enabled: bool,
}

impl HistoryScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self { enabled: true }
    }
}

impl Default for HistoryScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// A typed entry that names a local filesystem path, as opposed to a URL.
fn is_local_path(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() > 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'\\'
}

impl Scanner for HistoryScanner {
    fn name(&self) -> &'static str {
        "history"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::StaleBrowserHistory
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn scan(&self, ctx: &ScanContext<'_>, progress: &mut Progress<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();

        let typed_urls = KeyAddress::new(RootKey::CurrentUser, TYPED_URLS);
        progress(self.name(), &typed_urls, issues.len());
        let count = entry_count(ctx, &typed_urls);
        if count > ctx.config.history_threshold {
            issues.push(Issue::node(
                typed_urls,
                IssueCategory::StaleBrowserHistory,
                Severity::Low,
                "typed-URL history exceeds the hygiene threshold",
                format!("{count} entries"),
            ));
        }

        let typed_paths = KeyAddress::new(RootKey::CurrentUser, TYPED_PATHS);
        progress(self.name(), &typed_paths, issues.len());
        for value in values_of(ctx.store, &typed_paths) {
            if is_ordering_value(&value.name) {
                continue;
            }
            let Some(text) = value.as_string() else {
                continue;
            };
            if is_local_path(text) && !ctx.probe.exists(text) {
                issues.push(Issue::value(
                    typed_paths.clone(),
                    &value.name,
                    IssueCategory::StaleBrowserHistory,
                    Severity::Low,
                    "typed path no longer resolves",
                    text,
                ));
            }
        }

        issues
    }
}
