//! Permission escalation: ownership transfer, ACL rewrite, and deferred
//! delete-on-reboot scheduling for entries the current principal cannot
//! otherwise mutate.
//!
//! Token privileges are acquired once into a [`PrivilegeCache`] and passed
//! explicitly into every call that needs them; there are no hidden statics.

use sha2::{Digest, Sha256};

use crate::core::errors::{RegError, Result};
use crate::store::{AccessMode, KeyAddress, RootKey, StoreBackend};
use crate::store::value::RegValue;

/// Run-once location used for deferred deletions.
pub const RUN_ONCE_SUBPATH: &str = "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\RunOnce";

/// Process-wide capability record: which escalation privileges the current
/// process token actually holds.
///
/// Acquired once at escalation-layer startup. The portable in-memory backend
/// imposes no token model, so acquisition always succeeds off-Windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivilegeCache {
    /// `SeTakeOwnershipPrivilege` is enabled.
    pub take_ownership: bool,
    /// `SeBackupPrivilege` is enabled.
    pub backup: bool,
    /// `SeRestorePrivilege` is enabled.
    pub restore: bool,
}

impl PrivilegeCache {
    /// Enable the escalation privileges on the current process token and
    /// record which ones were granted.
    #[must_use]
    pub fn acquire() -> Self {
        #[cfg(windows)]
        {
            crate::store::native::enable_escalation_privileges()
        }
        #[cfg(not(windows))]
        {
            Self {
                take_ownership: true,
                backup: true,
                restore: true,
            }
        }
    }

    /// A cache with nothing granted, for hosts running unprivileged.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            take_ownership: false,
            backup: false,
            restore: false,
        }
    }

    /// Whether ownership transfer is possible at all.
    #[must_use]
    pub const fn can_escalate(&self) -> bool {
        self.take_ownership && self.restore
    }
}

/// Drives forced deletion against a backend: ownership, ACL rewrite, then
/// the regular delete-call sequence, recursing into children first.
pub struct Escalator<'s> {
    backend: &'s dyn StoreBackend,
    privs: PrivilegeCache,
}

impl<'s> Escalator<'s> {
    /// Bind an escalator to a backend with an already-acquired cache.
    #[must_use]
    pub const fn new(backend: &'s dyn StoreBackend, privs: PrivilegeCache) -> Self {
        Self { backend, privs }
    }

    /// Transfer ownership of the node to the administrators principal.
    pub fn take_ownership(&self, address: &KeyAddress) -> Result<()> {
        if !self.privs.can_escalate() {
            return Err(RegError::Escalation {
                address: address.to_string(),
                details: "required token privileges are not held".to_string(),
            });
        }
        self.backend.take_ownership(&self.privs, address)
    }

    /// Take ownership, then rewrite the DACL to grant administrators full
    /// control (inheriting into the subtree).
    pub fn grant_full_control(&self, address: &KeyAddress) -> Result<()> {
        self.take_ownership(address)?;
        self.backend.grant_full_control(&self.privs, address)
    }

    /// Force-delete a node: escalate the ACL, recurse into children first,
    /// then run the delete-call sequence on the node itself.
    pub fn force_delete_key(&self, address: &KeyAddress) -> Result<()> {
        // ACL rewrite failure is tolerated; existing rights may suffice.
        let _ = self.grant_full_control(address);

        if let Ok(handle) = self.backend.open(address, AccessMode::Read) {
            let children = handle.list_children().unwrap_or_default();
            for child in children {
                let child_addr = address.child(&child);
                if self.force_delete_key(&child_addr).is_err() {
                    // fall back to a blunt subtree delete for this child
                    let _ = handle.delete_subtree(&child);
                }
            }
        }

        self.backend
            .delete_key(address)
            .or_else(|_| self.backend.delete_key_redirected(address))
            .or_else(|_| self.backend.delete_key_tree(address))
    }

    /// Force-delete a single value after escalating the node's ACL.
    pub fn force_delete_value(&self, address: &KeyAddress, value_name: &str) -> Result<()> {
        let _ = self.grant_full_control(address);

        let handle = self
            .backend
            .open(address, AccessMode::SetValue)
            .or_else(|_| self.backend.open(address, AccessMode::Write))?;
        handle.delete_value(value_name)
    }

    /// Register a one-shot delete command under the run-once location.
    ///
    /// The value name is derived from a stable hash of the subpath, so
    /// scheduling the same address twice overwrites rather than duplicates.
    pub fn schedule_reboot_delete(&self, address: &KeyAddress) -> Result<()> {
        if !matches!(
            address.root(),
            RootKey::LocalMachine | RootKey::CurrentUser | RootKey::ClassesRoot
        ) {
            return Err(RegError::Escalation {
                address: address.to_string(),
                details: "root not supported for deferred deletion".to_string(),
            });
        }

        let command = format!(
            "reg delete \"{}\\{}\" /f",
            address.root().abbrev(),
            address.subpath()
        );

        let run_once = KeyAddress::new(RootKey::LocalMachine, RUN_ONCE_SUBPATH);
        let handle = self.backend.create(&run_once, AccessMode::SetValue)?;
        handle.set_value(&RegValue::string(reboot_value_name(address), command))
    }
}

/// Stable run-once value name for an address: a truncated SHA-256 of the
/// case-folded full address. The root is part of the input, so the same
/// subpath under two roots schedules two distinct entries.
#[must_use]
pub fn reboot_value_name(address: &KeyAddress) -> String {
    let digest = Sha256::digest(address.to_string().to_ascii_lowercase().as_bytes());
    let mut tag = String::with_capacity(16);
    for byte in &digest[..8] {
        tag.push_str(&format!("{byte:02x}"));
    }
    format!("RegSweep_Delete_{tag}")
}
