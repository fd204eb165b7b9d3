//! Key/value access layer: addresses, access modes, and the store backend trait.
//!
//! Every node in the hierarchical store is identified by a [`KeyAddress`]
//! (one of five fixed roots plus a backslash-delimited subpath, compared
//! case-insensitively). Nodes are opened through a [`StoreBackend`] and held
//! as move-only [`KeyHandle`]s that release the underlying handle on drop,
//! on every exit path.

pub mod memory;
#[cfg(windows)]
pub mod native;
pub mod value;

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::core::errors::Result;
use crate::escalate::PrivilegeCache;
use crate::store::value::RegValue;

// ──────────────────── roots and addresses ────────────────────

/// The five fixed roots of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RootKey {
    /// `HKEY_CLASSES_ROOT`: file associations, COM registrations.
    ClassesRoot,
    /// `HKEY_CURRENT_USER`: per-user settings.
    CurrentUser,
    /// `HKEY_LOCAL_MACHINE`: machine-wide settings.
    LocalMachine,
    /// `HKEY_USERS`: all loaded user profiles.
    Users,
    /// `HKEY_CURRENT_CONFIG`: current hardware profile.
    CurrentConfig,
}

impl RootKey {
    /// Canonical long name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClassesRoot => "HKEY_CLASSES_ROOT",
            Self::CurrentUser => "HKEY_CURRENT_USER",
            Self::LocalMachine => "HKEY_LOCAL_MACHINE",
            Self::Users => "HKEY_USERS",
            Self::CurrentConfig => "HKEY_CURRENT_CONFIG",
        }
    }

    /// Conventional abbreviation (`HKLM`, `HKCU`, ...).
    #[must_use]
    pub const fn abbrev(self) -> &'static str {
        match self {
            Self::ClassesRoot => "HKCR",
            Self::CurrentUser => "HKCU",
            Self::LocalMachine => "HKLM",
            Self::Users => "HKU",
            Self::CurrentConfig => "HKCC",
        }
    }

    /// Parse a long or abbreviated root name, case-insensitively.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let upper = text.to_ascii_uppercase();
        match upper.as_str() {
            "HKEY_CLASSES_ROOT" | "HKCR" => Some(Self::ClassesRoot),
            "HKEY_CURRENT_USER" | "HKCU" => Some(Self::CurrentUser),
            "HKEY_LOCAL_MACHINE" | "HKLM" => Some(Self::LocalMachine),
            "HKEY_USERS" | "HKU" => Some(Self::Users),
            "HKEY_CURRENT_CONFIG" | "HKCC" => Some(Self::CurrentConfig),
            _ => None,
        }
    }
}

impl fmt::Display for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node's address: a root plus a backslash-delimited subpath.
///
/// The subpath keeps its original casing for display; equality, hashing and
/// prefix matching fold ASCII case, matching native registry semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyAddress {
    root: RootKey,
    subpath: String,
}

impl KeyAddress {
    /// Build an address; leading/trailing separators are trimmed away.
    #[must_use]
    pub fn new(root: RootKey, subpath: impl Into<String>) -> Self {
        let subpath = subpath.into();
        let trimmed = subpath.trim_matches('\\');
        Self {
            root,
            subpath: trimmed.to_string(),
        }
    }

    /// Parse a full path such as `HKLM\SOFTWARE\Vendor` or
    /// `HKEY_CURRENT_USER\Software`.
    #[must_use]
    pub fn parse(full: &str) -> Option<Self> {
        match full.split_once('\\') {
            Some((root, rest)) => Some(Self::new(RootKey::parse(root)?, rest)),
            None => Some(Self::new(RootKey::parse(full)?, "")),
        }
    }

    #[must_use]
    pub const fn root(&self) -> RootKey {
        self.root
    }

    #[must_use]
    pub fn subpath(&self) -> &str {
        &self.subpath
    }

    /// True when the address denotes the root itself.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.subpath.is_empty()
    }

    /// Address of a named child node.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        if self.subpath.is_empty() {
            Self::new(self.root, name)
        } else {
            Self::new(self.root, format!("{}\\{}", self.subpath, name))
        }
    }

    /// Split into the parent address and the leaf name.
    ///
    /// Returns `None` when the subpath has no parent separator (the node is
    /// a direct child of the root, or the root itself).
    #[must_use]
    pub fn parent(&self) -> Option<(Self, String)> {
        let idx = self.subpath.rfind('\\')?;
        let parent = Self::new(self.root, &self.subpath[..idx]);
        let leaf = self.subpath[idx + 1..].to_string();
        Some((parent, leaf))
    }

    /// Case-insensitive prefix match on whole path segments.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        if self.root != prefix.root {
            return false;
        }
        if prefix.subpath.is_empty() {
            return true;
        }
        let own = self.subpath.to_ascii_lowercase();
        let pre = prefix.subpath.to_ascii_lowercase();
        own == pre || (own.starts_with(&pre) && own.as_bytes().get(pre.len()) == Some(&b'\\'))
    }

    /// Path segment count of the subpath.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.subpath.is_empty() {
            0
        } else {
            self.subpath.split('\\').count()
        }
    }
}

impl PartialEq for KeyAddress {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.subpath.eq_ignore_ascii_case(&other.subpath)
    }
}

impl Eq for KeyAddress {}

impl Hash for KeyAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.root.hash(state);
        self.subpath.to_ascii_lowercase().hash(state);
    }
}

impl fmt::Display for KeyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subpath.is_empty() {
            f.write_str(self.root.as_str())
        } else {
            write!(f, "{}\\{}", self.root.as_str(), self.subpath)
        }
    }
}

// ──────────────────── access modes ────────────────────

/// Requested rights when opening or creating a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Query values and enumerate children.
    Read,
    /// Write and delete values on the node itself.
    SetValue,
    /// Value mutation plus child creation/deletion.
    Write,
    /// Full-control-equivalent access.
    AllAccess,
}

impl AccessMode {
    /// Whether the mode permits any persistent mutation.
    #[must_use]
    pub const fn is_write(self) -> bool {
        !matches!(self, Self::Read)
    }

    /// Whether the mode permits deleting child nodes.
    #[must_use]
    pub const fn allows_child_delete(self) -> bool {
        matches!(self, Self::Write | Self::AllAccess)
    }
}

// ──────────────────── backend trait ────────────────────

/// Opaque per-backend handle identifier.
pub type HandleId = u64;

/// The store backend: everything the engine needs from the hierarchical
/// store, behind one object-safe trait.
///
/// `open`/`create` hand out RAII [`KeyHandle`]s; the `handle_*` methods are
/// the handle-scoped operations those forward to. The root-level `delete_key*`
/// family mirrors the three decreasingly specific native delete calls used
/// for nodes that sit directly under a root.
pub trait StoreBackend: Send + Sync {
    /// Open an existing node.
    fn open(&self, address: &KeyAddress, access: AccessMode) -> Result<KeyHandle<'_>>;

    /// Create (or open) a node, creating missing parents.
    fn create(&self, address: &KeyAddress, access: AccessMode) -> Result<KeyHandle<'_>>;

    /// Cheap existence probe; never escalates and never errors.
    fn key_exists(&self, address: &KeyAddress) -> bool;

    /// Delete a node that must be empty.
    fn delete_key(&self, address: &KeyAddress) -> Result<()>;

    /// Delete a node ignoring registry redirection (WOW64 view).
    fn delete_key_redirected(&self, address: &KeyAddress) -> Result<()>;

    /// Delete a node and its whole subtree.
    fn delete_key_tree(&self, address: &KeyAddress) -> Result<()>;

    /// Enumerate child node names.
    fn handle_list_children(&self, handle: HandleId) -> Result<Vec<String>>;

    /// Enumerate values, decoding each payload by its type tag.
    fn handle_list_values(&self, handle: HandleId) -> Result<Vec<RegValue>>;

    /// Read one value by name (empty name: the node default).
    fn handle_get_value(&self, handle: HandleId, name: &str) -> Result<RegValue>;

    /// Write one value.
    fn handle_set_value(&self, handle: HandleId, value: &RegValue) -> Result<()>;

    /// Delete one value by name.
    fn handle_delete_value(&self, handle: HandleId, name: &str) -> Result<()>;

    /// Delete an empty child node.
    fn handle_delete_child(&self, handle: HandleId, name: &str) -> Result<()>;

    /// Delete a child node and its subtree.
    fn handle_delete_subtree(&self, handle: HandleId, name: &str) -> Result<()>;

    /// `(child count, value count)` for the node.
    fn handle_counts(&self, handle: HandleId) -> Result<(usize, usize)>;

    /// Release a handle. Called exactly once, from [`KeyHandle::drop`].
    fn handle_release(&self, handle: HandleId);

    /// Transfer ownership of the node to the administrators principal.
    fn take_ownership(&self, privs: &PrivilegeCache, address: &KeyAddress) -> Result<()>;

    /// Rewrite the node's DACL to grant administrators full control.
    fn grant_full_control(&self, privs: &PrivilegeCache, address: &KeyAddress) -> Result<()>;
}

// ──────────────────── RAII handle ────────────────────

/// A scoped, move-only handle to one open node.
///
/// The underlying backend handle is released exactly once, when this value
/// drops, including on early-return error paths. Handles are never shared.
pub struct KeyHandle<'s> {
    backend: &'s dyn StoreBackend,
    id: HandleId,
    address: KeyAddress,
    access: AccessMode,
}

impl<'s> KeyHandle<'s> {
    /// Wrap a raw backend handle. Backends call this from `open`/`create`.
    #[must_use]
    pub fn from_raw(
        backend: &'s dyn StoreBackend,
        id: HandleId,
        address: KeyAddress,
        access: AccessMode,
    ) -> Self {
        Self {
            backend,
            id,
            address,
            access,
        }
    }

    /// The address this handle was opened at.
    #[must_use]
    pub const fn address(&self) -> &KeyAddress {
        &self.address
    }

    /// The access mode the handle was opened with.
    #[must_use]
    pub const fn access(&self) -> AccessMode {
        self.access
    }

    /// Enumerate child node names.
    pub fn list_children(&self) -> Result<Vec<String>> {
        self.backend.handle_list_children(self.id)
    }

    /// Enumerate all values on the node.
    pub fn list_values(&self) -> Result<Vec<RegValue>> {
        self.backend.handle_list_values(self.id)
    }

    /// Read one value by name.
    pub fn get_value(&self, name: &str) -> Result<RegValue> {
        self.backend.handle_get_value(self.id, name)
    }

    /// Write one value.
    pub fn set_value(&self, value: &RegValue) -> Result<()> {
        self.backend.handle_set_value(self.id, value)
    }

    /// Delete one value by name.
    pub fn delete_value(&self, name: &str) -> Result<()> {
        self.backend.handle_delete_value(self.id, name)
    }

    /// Delete an empty child node.
    pub fn delete_child(&self, name: &str) -> Result<()> {
        self.backend.handle_delete_child(self.id, name)
    }

    /// Delete a child node and everything under it.
    pub fn delete_subtree(&self, name: &str) -> Result<()> {
        self.backend.handle_delete_subtree(self.id, name)
    }

    /// `(child count, value count)`.
    pub fn counts(&self) -> Result<(usize, usize)> {
        self.backend.handle_counts(self.id)
    }
}

impl Drop for KeyHandle<'_> {
    fn drop(&mut self) {
        self.backend.handle_release(self.id);
    }
}

impl fmt::Debug for KeyHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHandle")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}
