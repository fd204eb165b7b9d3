//! The engine: scanner orchestration, pre-clean backups, and the escalating
//! deletion protocol, with running statistics and JSONL activity logging.

pub mod protocol;
pub mod stats;

use std::path::Path;
use std::time::Instant;

use crate::backup::{BackupHandle, BackupManager, RestoreReport};
use crate::cleaner::protocol::{CleanMethod, DeletionOutcome};
use crate::cleaner::stats::CleaningStats;
use crate::core::config::Config;
use crate::core::errors::Result;
use crate::escalate::PrivilegeCache;
use crate::logger::{EventType, JsonlConfig, JsonlWriter, LogEntry, LogLevel};
use crate::scanner::pathex::{DiskProbe, FileProbe};
use crate::scanner::{default_scanners, Issue, Progress, ScanContext, Scanner};
use crate::store::{KeyAddress, StoreBackend};

/// Per-issue progress callback for clean passes: the issue just processed,
/// its outcome, and current/total position in the pass.
pub type CleanProgress<'a> = dyn FnMut(&Issue, &DeletionOutcome, usize, usize) + 'a;

/// Ties the whole system together over one storage backend.
///
/// The engine never propagates per-item failures as errors; they land in the
/// returned [`CleaningStats`] and the activity log instead. Construction is
/// the only fallible step.
pub struct Engine<'s> {
    store: &'s dyn StoreBackend,
    config: Config,
    scanners: Vec<Box<dyn Scanner>>,
    probe: Box<dyn FileProbe>,
    backup: BackupManager,
    privs: PrivilegeCache,
    logger: Option<JsonlWriter>,
    totals: CleaningStats,
    last_backup: Option<BackupHandle>,
}

impl<'s> Engine<'s> {
    /// Build an engine over a backend with the full built-in scanner roster.
    ///
    /// Acquires escalation privileges once, creates the backup directory, and
    /// opens the activity log when one is configured.
    pub fn new(store: &'s dyn StoreBackend, config: Config) -> Result<Self> {
        config.validate()?;
        let backup = BackupManager::new(config.backup_dir(), config.backup.retention)?;
        let logger = config
            .log
            .path
            .as_ref()
            .map(|path| JsonlWriter::open(JsonlConfig::at(path)));

        Ok(Self {
            store,
            config,
            scanners: default_scanners(),
            probe: Box::new(DiskProbe),
            backup,
            privs: PrivilegeCache::acquire(),
            logger,
            totals: CleaningStats::default(),
            last_backup: None,
        })
    }

    /// Swap the filesystem probe. Hosts use this to scan against a fixed
    /// file list instead of the live disk.
    #[must_use]
    pub fn with_probe(mut self, probe: Box<dyn FileProbe>) -> Self {
        self.probe = probe;
        self
    }

    // ──────────────────── scanner roster ────────────────────

    /// Register an additional scanner; it runs after the built-in roster.
    pub fn add_scanner(&mut self, scanner: Box<dyn Scanner>) {
        self.scanners.push(scanner);
    }

    /// Toggle a scanner by name. Returns false when no scanner matches.
    pub fn set_scanner_enabled(&mut self, name: &str, enabled: bool) -> bool {
        for scanner in &mut self.scanners {
            if scanner.name() == name {
                scanner.set_enabled(enabled);
                return true;
            }
        }
        false
    }

    /// The roster as (name, enabled) pairs, in run order.
    pub fn scanners(&self) -> Vec<(&'static str, bool)> {
        self.scanners
            .iter()
            .map(|s| (s.name(), s.enabled()))
            .collect()
    }

    // ──────────────────── scan ────────────────────

    /// Run every enabled scanner and collect findings in run order.
    pub fn scan(&mut self, mut progress: Option<&mut Progress<'_>>) -> Vec<Issue> {
        let started = Instant::now();
        log(
            &mut self.logger,
            LogEntry::new(EventType::ScanStart, LogLevel::Info),
        );

        let mut visited: u64 = 0;
        let mut issues = Vec::new();
        {
            let ctx = ScanContext {
                store: self.store,
                probe: self.probe.as_ref(),
                config: &self.config.scan,
            };
            for scanner in &self.scanners {
                if !scanner.enabled() {
                    continue;
                }
                // scanners report their own running count; fold in the
                // issues already collected from earlier scanners
                let base = issues.len();
                let mut relay = |name: &str, address: &KeyAddress, found: usize| {
                    visited += 1;
                    if let Some(cb) = progress.as_deref_mut() {
                        cb(name, address, base + found);
                    }
                };
                issues.extend(scanner.scan(&ctx, &mut relay));
            }
        }

        let duration = started.elapsed();
        self.totals.total_scanned += visited;
        self.totals.issues_found += issues.len() as u64;
        self.totals.scan_duration += duration;

        let mut entry = LogEntry::new(EventType::ScanComplete, LogLevel::Info);
        entry.count = Some(issues.len() as u64);
        entry.duration_ms = Some(duration.as_millis() as u64);
        log(&mut self.logger, entry);

        issues
    }

    // ──────────────────── clean ────────────────────

    /// Run the given issues through the deletion protocol.
    ///
    /// A backup is written first when `create_backup` is set and backups are
    /// enabled in the configuration; a backup failure downgrades to a logged
    /// warning and the clean proceeds. `force_delete` turns on the
    /// escalation and reboot-deferral stages.
    pub fn clean(
        &mut self,
        issues: &[Issue],
        create_backup: bool,
        force_delete: bool,
        mut progress: Option<&mut CleanProgress<'_>>,
    ) -> CleaningStats {
        let started = Instant::now();
        let mut entry = LogEntry::new(EventType::CleanStart, LogLevel::Info);
        entry.count = Some(issues.len() as u64);
        log(&mut self.logger, entry);

        if create_backup && self.config.backup.enabled {
            match self.backup.create_backup(self.store, issues, "pre-clean") {
                Ok(handle) => {
                    let mut entry = LogEntry::new(EventType::BackupCreated, LogLevel::Info);
                    entry.count = Some(handle.record_count as u64);
                    entry.details = Some(handle.path.display().to_string());
                    log(&mut self.logger, entry);
                    self.last_backup = Some(handle);
                }
                Err(err) => {
                    // the clean still runs; the operator sees the warning
                    let entry = LogEntry::new(EventType::Error, LogLevel::Warning)
                        .with_error(&err);
                    log(&mut self.logger, entry);
                }
            }
        }

        let mut stats = CleaningStats::default();
        let total = issues.len();
        for (index, issue) in issues.iter().enumerate() {
            let outcome =
                protocol::delete_issue(self.store, issue, force_delete, self.privs);
            self.log_outcome(issue, outcome);
            stats.record(outcome, &issue.to_string());
            if let Some(cb) = progress.as_deref_mut() {
                cb(issue, &outcome, index + 1, total);
            }
        }

        stats.clean_duration = started.elapsed();

        let mut entry = LogEntry::new(EventType::CleanComplete, LogLevel::Info);
        entry.count = Some(stats.issues_cleaned);
        entry.duration_ms = Some(stats.clean_duration.as_millis() as u64);
        entry.ok = Some(stats.issues_failed == 0);
        log(&mut self.logger, entry);

        self.totals.merge(&stats);
        if let Some(w) = self.logger.as_mut() {
            w.flush();
        }
        stats
    }

    fn log_outcome(&mut self, issue: &Issue, outcome: DeletionOutcome) {
        let (event, level, detail) = match outcome {
            DeletionOutcome::Cleaned(CleanMethod::Forced) => {
                (EventType::ForceDelete, LogLevel::Info, None)
            }
            DeletionOutcome::Cleaned(CleanMethod::RebootScheduled) => {
                (EventType::RebootScheduled, LogLevel::Info, None)
            }
            DeletionOutcome::Cleaned(CleanMethod::Normal) => {
                (EventType::ItemCleaned, LogLevel::Info, None)
            }
            DeletionOutcome::Skipped(reason) => (
                EventType::ItemSkipped,
                LogLevel::Info,
                Some(reason.as_str()),
            ),
            DeletionOutcome::Failed => (EventType::ItemFailed, LogLevel::Error, None),
        };

        let mut entry = LogEntry::new(event, level).with_address(issue.address.to_string());
        if issue.is_value_issue() {
            entry.value_name = Some(issue.value_name.clone());
        }
        entry.category = Some(issue.category.as_str().to_string());
        if let DeletionOutcome::Cleaned(method) = outcome {
            entry.method = Some(method.as_str().to_string());
        }
        entry.details = detail.map(str::to_string);
        log(&mut self.logger, entry);
    }

    // ──────────────────── backups and accessors ────────────────────

    /// Replay a backup file into the store.
    pub fn restore(&mut self, path: &Path) -> Result<RestoreReport> {
        let report = self.backup.restore_backup(self.store, path)?;
        let mut entry = LogEntry::new(EventType::BackupRestored, LogLevel::Info);
        entry.count = Some(report.restored as u64);
        entry.ok = Some(report.is_complete());
        entry.details = Some(path.display().to_string());
        log(&mut self.logger, entry);
        Ok(report)
    }

    /// Running totals across every scan and clean this engine has run.
    pub const fn stats(&self) -> &CleaningStats {
        &self.totals
    }

    /// The backup journal.
    pub const fn backup_manager(&self) -> &BackupManager {
        &self.backup
    }

    /// Handle of the most recent pre-clean backup, if any.
    pub const fn last_backup(&self) -> Option<&BackupHandle> {
        self.last_backup.as_ref()
    }

    /// Effective configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }
}

/// Best-effort write to the activity log.
fn log(logger: &mut Option<JsonlWriter>, entry: LogEntry) {
    if let Some(w) = logger.as_mut() {
        w.write_entry(&entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::protocol::SkipReason;
    use crate::scanner::pathex::FixedProbe;
    use crate::scanner::{IssueCategory, Severity};
    use crate::store::memory::MemoryStore;
    use crate::store::value::RegValue;
    use crate::store::{KeyAddress, RootKey};

    fn engine_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.backup.directory = Some(dir.to_path_buf());
        config
    }

    #[test]
    fn roster_can_be_toggled_by_name() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(&store, engine_config(dir.path())).unwrap();

        assert!(engine.set_scanner_enabled("startup", false));
        assert!(!engine.set_scanner_enabled("no_such_scanner", false));

        let roster = engine.scanners();
        let startup = roster.iter().find(|(name, _)| *name == "startup").unwrap();
        assert!(!startup.1);
        assert!(roster.iter().filter(|(_, enabled)| *enabled).count() > 10);
    }

    #[test]
    fn scan_finds_seeded_startup_issue_and_counts_visits() {
        let store = MemoryStore::new();
        let run = KeyAddress::new(
            RootKey::CurrentUser,
            "Software\\Microsoft\\Windows\\CurrentVersion\\Run",
        );
        store.add_value(&run, RegValue::string("DeadApp", "C:\\gone\\dead.exe"));

        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(&store, engine_config(dir.path()))
            .unwrap()
            .with_probe(Box::new(FixedProbe::empty()));

        let mut visits = 0usize;
        let mut running = Vec::new();
        let mut relay = |_: &str, _: &KeyAddress, found: usize| {
            visits += 1;
            running.push(found);
        };
        let issues = engine.scan(Some(&mut relay));

        // the running count never goes backwards and ends at the final total
        assert!(running.windows(2).all(|w| w[0] <= w[1]));
        assert!(*running.last().unwrap() <= issues.len());

        assert!(visits > 0);
        assert_eq!(engine.stats().total_scanned, visits as u64);
        assert!(issues
            .iter()
            .any(|i| i.category == IssueCategory::InvalidStartup && i.value_name == "DeadApp"));
        assert_eq!(engine.stats().issues_found, issues.len() as u64);
    }

    #[test]
    fn clean_removes_value_issue_and_writes_backup() {
        let store = MemoryStore::new();
        let run = KeyAddress::new(
            RootKey::CurrentUser,
            "Software\\Microsoft\\Windows\\CurrentVersion\\Run",
        );
        store.add_value(&run, RegValue::string("DeadApp", "C:\\gone\\dead.exe"));

        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(&store, engine_config(dir.path())).unwrap();

        let issue = Issue::value(
            run.clone(),
            "DeadApp",
            IssueCategory::InvalidStartup,
            Severity::Medium,
            "startup target missing",
            "C:\\gone\\dead.exe",
        );
        let stats = engine.clean(&[issue], true, false, None);

        assert_eq!(stats.issues_cleaned, 1);
        assert_eq!(stats.issues_failed, 0);
        assert!(store.value_of(&run, "DeadApp").is_none());

        let backups = engine.backup_manager().list_backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(engine.last_backup().unwrap().record_count, 1);
    }

    #[test]
    fn clean_skips_protected_node_and_reports_it() {
        let store = MemoryStore::new();
        let target = KeyAddress::new(RootKey::LocalMachine, "SYSTEM\\CurrentControlSet");
        store.add_key(&target);

        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(&store, engine_config(dir.path())).unwrap();

        let issue = Issue::node(
            target.clone(),
            IssueCategory::EmptyKey,
            Severity::Low,
            "empty key",
            "",
        );

        let mut outcomes = Vec::new();
        let mut relay = |_: &Issue, outcome: &DeletionOutcome, current: usize, total: usize| {
            outcomes.push((*outcome, current, total));
        };
        let stats = engine.clean(&[issue], false, true, Some(&mut relay));

        assert_eq!(stats.issues_skipped, 1);
        assert_eq!(
            outcomes,
            vec![(
                DeletionOutcome::Skipped(SkipReason::ProtectedAddress),
                1,
                1
            )]
        );
        assert!(store.key_exists(&target));
        assert!(store.escalation_log().is_empty());
    }

    #[test]
    fn failed_items_carry_full_paths_and_totals_accumulate() {
        let store = MemoryStore::new();
        let target = KeyAddress::new(RootKey::CurrentUser, "Software\\Guarded");
        store.add_key(&target);
        store.set_perms(
            &target,
            crate::store::memory::NodePerms {
                deny_write: true,
                ..Default::default()
            },
        );

        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(&store, engine_config(dir.path())).unwrap();

        let issue = Issue::node(
            target.clone(),
            IssueCategory::EmptyKey,
            Severity::Low,
            "empty key",
            "",
        );
        let first = engine.clean(std::slice::from_ref(&issue), false, false, None);
        assert_eq!(first.issues_failed, 1);
        assert_eq!(
            first.failed_items,
            vec!["HKEY_CURRENT_USER\\Software\\Guarded".to_string()]
        );

        let second = engine.clean(&[issue], false, false, None);
        assert_eq!(second.issues_failed, 1);
        assert_eq!(engine.stats().issues_failed, 2);
        assert_eq!(engine.stats().failed_items.len(), 2);
    }

    #[test]
    fn restore_puts_cleaned_value_back() {
        let store = MemoryStore::new();
        let run = KeyAddress::new(
            RootKey::CurrentUser,
            "Software\\Microsoft\\Windows\\CurrentVersion\\Run",
        );
        store.add_value(&run, RegValue::string("DeadApp", "C:\\gone\\dead.exe"));

        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(&store, engine_config(dir.path())).unwrap();

        let issue = Issue::value(
            run.clone(),
            "DeadApp",
            IssueCategory::InvalidStartup,
            Severity::Medium,
            "startup target missing",
            "C:\\gone\\dead.exe",
        );
        engine.clean(&[issue], true, false, None);
        assert!(store.value_of(&run, "DeadApp").is_none());

        let path = engine.last_backup().unwrap().path.clone();
        let report = engine.restore(&path).unwrap();
        assert!(report.is_complete());
        assert_eq!(
            store.value_of(&run, "DeadApp").unwrap().as_string(),
            Some("C:\\gone\\dead.exe")
        );
    }

    #[test]
    fn clean_logs_every_item_to_the_activity_log() {
        let store = MemoryStore::new();
        let key = KeyAddress::new(RootKey::CurrentUser, "Software\\App");
        store.add_value(&key, RegValue::string("Old", "x"));

        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("activity.jsonl");
        let mut config = engine_config(dir.path());
        config.log.path = Some(log_path.clone());

        let mut engine = Engine::new(&store, config).unwrap();
        let issue = Issue::value(
            key,
            "Old",
            IssueCategory::Uncategorized,
            Severity::Low,
            "stale value",
            "",
        );
        engine.clean(&[issue], false, false, None);

        let raw = std::fs::read_to_string(&log_path).unwrap();
        let events: Vec<String> = raw
            .lines()
            .map(|line| {
                let v: serde_json::Value = serde_json::from_str(line).unwrap();
                v["event"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(events, vec!["clean_start", "item_cleaned", "clean_complete"]);
    }
}
