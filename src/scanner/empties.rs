//! Empty leaf keys under the SOFTWARE hives.

use crate::protect::{is_critical_keyword, is_protected_address};
use crate::scanner::{
    children_of, Issue, IssueCategory, Progress, ScanContext, Scanner, Severity,
};
use crate::store::{AccessMode, KeyAddress, RootKey};

/// Vendor subtrees never descended into; they keep empty keys on purpose.
const SKIPPED_SUBTREES: &[&str] = &[
    "Microsoft",
    "Windows",
    "Classes",
    "Policies",
    "Wow6432Node",
    "Clients",
];

/// Flags keys with no values and no children, bounded by the configured
/// walk depth. Only leaves are reported; a parent emptied by cleaning its
/// children shows up on the next scan.
pub struct EmptyKeyScanner {
    enabled: bool,
}

impl EmptyKeyScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self { enabled: true }
    }

    fn walk(
        &self,
        ctx: &ScanContext<'_>,
        address: &KeyAddress,
        depth: usize,
        issues: &mut Vec<Issue>,
    ) {
        if depth > ctx.config.empty_key_depth {
            return;
        }

        let Ok(handle) = ctx.store.open(address, AccessMode::Read) else {
            return;
        };
        let Ok((child_count, value_count)) = handle.counts() else {
            return;
        };
        drop(handle);

        if child_count == 0 && value_count == 0 {
            if !is_protected_address(address) {
                issues.push(Issue::node(
                    address.clone(),
                    IssueCategory::EmptyKey,
                    Severity::Low,
                    "key holds no values and no subkeys",
                    format!("depth {depth}"),
                ));
            }
            return;
        }

        for child in children_of(ctx.store, address) {
            if is_critical_keyword(&child) {
                continue;
            }
            self.walk(ctx, &address.child(&child), depth + 1, issues);
        }
    }
}

impl Default for EmptyKeyScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for EmptyKeyScanner {
    fn name(&self) -> &'static str {
        "empty_keys"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::EmptyKey
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn scan(&self, ctx: &ScanContext<'_>, progress: &mut Progress<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();

        for root in [RootKey::CurrentUser, RootKey::LocalMachine] {
            let software = KeyAddress::new(root, "SOFTWARE");
            progress(self.name(), &software, issues.len());

            for company in children_of(ctx.store, &software) {
                if SKIPPED_SUBTREES
                    .iter()
                    .any(|skip| skip.eq_ignore_ascii_case(&company))
                {
                    continue;
                }
                self.walk(ctx, &software.child(&company), 1, &mut issues);
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

    fn scan_with(store: &MemoryStore, config: &ScanConfig) -> Vec<Issue> {
        let probe = FixedProbe::empty();
        let ctx = ScanContext {
            store,
            probe: &probe,
            config,
        };
        EmptyKeyScanner::new().scan(&ctx, &mut |_, _, _| {})
    }

    #[test]
    fn empty_leaf_is_reported_once() {
        let store = MemoryStore::new();
        let empty = KeyAddress::new(RootKey::CurrentUser, "SOFTWARE\\DeadCorp\\Leftover");
        store.add_key(&empty);

        let full = KeyAddress::new(RootKey::CurrentUser, "SOFTWARE\\LiveCorp\\Tool");
        store.add_key(&full);
        store.add_value(&full, RegValue::string("Setting", "1"));

        let issues = scan_with(&store, &ScanConfig::default());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].address, empty);
    }

    #[test]
    fn vendor_subtrees_left_alone() {
        let store = MemoryStore::new();
        let vendor_empty =
            KeyAddress::new(RootKey::LocalMachine, "SOFTWARE\\Microsoft\\EmptyLeft");
        store.add_key(&vendor_empty);

        assert!(scan_with(&store, &ScanConfig::default()).is_empty());
    }

    #[test]
    fn depth_cap_bounds_the_walk() {
        let store = MemoryStore::new();
        let deep = KeyAddress::new(
            RootKey::CurrentUser,
            "SOFTWARE\\A\\B\\C\\D\\E\\TooDeep",
        );
        store.add_key(&deep);

        let mut config = ScanConfig::default();
        config.empty_key_depth = 3;
        assert!(scan_with(&store, &config).is_empty());
    }

    #[test]
    fn only_the_leaf_is_reported_not_the_chain() {
        let store = MemoryStore::new();
        // A\B\C where only C is empty; A and B have a child each
        let leaf = KeyAddress::new(RootKey::CurrentUser, "SOFTWARE\\Chain\\Mid\\Leaf");
        store.add_key(&leaf);

        let issues = scan_with(&store, &ScanConfig::default());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].address, leaf);
    }
}
