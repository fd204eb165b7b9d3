//! The escalating deletion protocol.
//!
//! Every issue runs the same state machine: protection gate, normal delete,
//! then (in force mode only) ownership/ACL escalation, and for node issues a
//! final deferred delete-on-reboot. The caller learns exactly what happened
//! through [`DeletionOutcome`]; nothing here panics or aborts a run.

use serde::{Deserialize, Serialize};

use crate::core::errors::Result;
use crate::escalate::{Escalator, PrivilegeCache};
use crate::protect::{is_protected_address, is_protected_value_name};
use crate::scanner::{Issue, Severity};
use crate::store::{AccessMode, KeyAddress, StoreBackend};

/// How a cleaned entry actually went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanMethod {
    /// Plain delete with the rights the process already had.
    Normal,
    /// Deleted after ownership transfer and ACL rewrite.
    Forced,
    /// Deferred: a one-shot delete runs at next boot.
    RebootScheduled,
}

impl CleanMethod {
    /// Label used in log events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Forced => "forced",
            Self::RebootScheduled => "reboot_scheduled",
        }
    }
}

/// Why an issue was skipped without any delete attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The address sits inside a protected subtree.
    ProtectedAddress,
    /// The value name is on the never-delete list.
    ProtectedValueName,
    /// Critical-severity issues are reported, never cleaned.
    CriticalSeverity,
}

impl SkipReason {
    /// Label used in log events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProtectedAddress => "protected_address",
            Self::ProtectedValueName => "protected_value_name",
            Self::CriticalSeverity => "critical_severity",
        }
    }
}

/// Terminal state of one issue's pass through the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionOutcome {
    Cleaned(CleanMethod),
    Skipped(SkipReason),
    Failed,
}

/// Run one issue through the protocol.
///
/// The protection gate can never be bypassed, force mode included. A target
/// that is already gone counts as cleaned; the goal state holds.
pub fn delete_issue(
    store: &dyn StoreBackend,
    issue: &Issue,
    force_delete: bool,
    privs: PrivilegeCache,
) -> DeletionOutcome {
    if issue.severity == Severity::Critical {
        return DeletionOutcome::Skipped(SkipReason::CriticalSeverity);
    }
    if issue.is_value_issue() {
        if is_protected_value_name(&issue.value_name) {
            return DeletionOutcome::Skipped(SkipReason::ProtectedValueName);
        }
    } else if is_protected_address(&issue.address) {
        return DeletionOutcome::Skipped(SkipReason::ProtectedAddress);
    }

    let normal = if issue.is_value_issue() {
        delete_value_normal(store, &issue.address, &issue.value_name)
    } else {
        delete_key_normal(store, &issue.address)
    };

    match normal {
        Ok(()) => DeletionOutcome::Cleaned(CleanMethod::Normal),
        Err(err) if err.is_not_found() => DeletionOutcome::Cleaned(CleanMethod::Normal),
        Err(_) if !force_delete => DeletionOutcome::Failed,
        Err(_) => escalate(store, issue, privs),
    }
}

/// Delete a single value: `SetValue` access, falling back to `Write`.
fn delete_value_normal(
    store: &dyn StoreBackend,
    address: &KeyAddress,
    name: &str,
) -> Result<()> {
    let handle = store
        .open(address, AccessMode::SetValue)
        .or_else(|_| store.open(address, AccessMode::Write))?;
    handle.delete_value(name)
}

/// Delete a node with the rights at hand.
///
/// Direct children of a root go through the three decreasingly specific
/// root-level delete calls; nested nodes open the parent with the broadest
/// access that succeeds and delete the leaf, exact first, subtree second.
fn delete_key_normal(store: &dyn StoreBackend, address: &KeyAddress) -> Result<()> {
    let Some((parent, leaf)) = address.parent() else {
        return store
            .delete_key(address)
            .or_else(|_| store.delete_key_redirected(address))
            .or_else(|_| store.delete_key_tree(address));
    };

    let handle = store
        .open(&parent, AccessMode::AllAccess)
        .or_else(|_| store.open(&parent, AccessMode::Write))?;
    match handle.delete_child(&leaf) {
        Ok(()) => Ok(()),
        Err(err) if err.is_not_found() => Err(err),
        Err(_) => handle.delete_subtree(&leaf),
    }
}

/// The force branch: escalate, and for node issues fall through to the
/// reboot deferral when even escalation cannot remove the node now.
fn escalate(store: &dyn StoreBackend, issue: &Issue, privs: PrivilegeCache) -> DeletionOutcome {
    let escalator = Escalator::new(store, privs);

    if issue.is_value_issue() {
        return match escalator.force_delete_value(&issue.address, &issue.value_name) {
            Ok(()) => DeletionOutcome::Cleaned(CleanMethod::Forced),
            Err(err) if err.is_not_found() => DeletionOutcome::Cleaned(CleanMethod::Forced),
            Err(_) => DeletionOutcome::Failed,
        };
    }

    match escalator.force_delete_key(&issue.address) {
        Ok(()) => DeletionOutcome::Cleaned(CleanMethod::Forced),
        Err(err) if err.is_not_found() => DeletionOutcome::Cleaned(CleanMethod::Forced),
        Err(_) => match escalator.schedule_reboot_delete(&issue.address) {
            Ok(()) => DeletionOutcome::Cleaned(CleanMethod::RebootScheduled),
            Err(_) => DeletionOutcome::Failed,
        },
    }
}
