//! Portable in-memory store backend.
//!
//! Used on non-Windows hosts and throughout the test suite. The node tree
//! carries a small per-node permission model (`deny_read`, `deny_write`,
//! `locked`) so rights failures and escalation outcomes can be reproduced
//! deterministically: a `locked` node resists deletion even after ownership
//! and ACL escalation, which is what pushes the deletion protocol into its
//! reboot-deferral branch.
//!
//! The store also counts live handles and records escalation calls, letting
//! callers assert the scoped-acquisition discipline and the "no escalation
//! for protected addresses" guarantee.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::collections::HashMap;

use parking_lot::RwLock;

use crate::core::errors::{RegError, Result};
use crate::escalate::PrivilegeCache;
use crate::store::value::RegValue;
use crate::store::{AccessMode, HandleId, KeyAddress, KeyHandle, RootKey, StoreBackend};

/// Per-node permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodePerms {
    /// Opening for read fails with access-denied.
    pub deny_read: bool,
    /// Opening for write and all mutation fails with access-denied.
    pub deny_write: bool,
    /// Deletion fails even after ownership/ACL escalation.
    pub locked: bool,
}

/// Which escalation hook was invoked, for test assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationOp {
    TakeOwnership,
    GrantFullControl,
}

#[derive(Debug, Default)]
struct Node {
    /// Original-case name, preserved for enumeration.
    name: String,
    children: BTreeMap<String, Node>,
    values: BTreeMap<String, StoredValue>,
    perms: NodePerms,
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: RegValue,
}

impl Node {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    fn subtree_has_lock(&self) -> bool {
        self.perms.locked || self.children.values().any(Node::subtree_has_lock)
    }
}

#[derive(Debug)]
struct OpenHandle {
    address: KeyAddress,
    access: AccessMode,
}

#[derive(Debug, Default)]
struct Inner {
    roots: HashMap<RootKey, Node>,
    handles: HashMap<HandleId, OpenHandle>,
    next_handle: HandleId,
    escalations: Vec<(EscalationOp, KeyAddress)>,
}

/// In-memory registry tree with case-insensitive child and value names.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// An empty store with all five roots present.
    #[must_use]
    pub fn new() -> Self {
        let mut inner = Inner::default();
        for root in [
            RootKey::ClassesRoot,
            RootKey::CurrentUser,
            RootKey::LocalMachine,
            RootKey::Users,
            RootKey::CurrentConfig,
        ] {
            inner.roots.insert(root, Node::named(root.as_str()));
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    // ──────────────────── fixture helpers ────────────────────

    /// Ensure a key exists, creating missing ancestors.
    pub fn add_key(&self, address: &KeyAddress) {
        let mut inner = self.inner.write();
        let _ = ensure_node(&mut inner, address);
    }

    /// Ensure a key exists and set one value on it.
    pub fn add_value(&self, address: &KeyAddress, value: RegValue) {
        let mut inner = self.inner.write();
        let node = ensure_node(&mut inner, address);
        node.values
            .insert(value.name.to_ascii_lowercase(), StoredValue { value });
    }

    /// Overwrite a node's permission bits (node must exist).
    pub fn set_perms(&self, address: &KeyAddress, perms: NodePerms) {
        let mut inner = self.inner.write();
        if let Some(node) = resolve_mut(&mut inner, address) {
            node.perms = perms;
        }
    }

    /// Read one value without going through a handle; test convenience.
    #[must_use]
    pub fn value_of(&self, address: &KeyAddress, name: &str) -> Option<RegValue> {
        let inner = self.inner.read();
        resolve(&inner, address)
            .and_then(|node| node.values.get(&name.to_ascii_lowercase()))
            .map(|stored| stored.value.clone())
    }

    /// Number of currently open handles.
    #[must_use]
    pub fn open_handle_count(&self) -> usize {
        self.inner.read().handles.len()
    }

    /// Every escalation hook invocation so far, in call order.
    #[must_use]
    pub fn escalation_log(&self) -> Vec<(EscalationOp, KeyAddress)> {
        self.inner.read().escalations.clone()
    }

    // ──────────────────── internals ────────────────────

    fn with_handle<T>(
        &self,
        handle: HandleId,
        f: impl FnOnce(&mut Inner, KeyAddress, AccessMode) -> Result<T>,
    ) -> Result<T> {
        let mut inner = self.inner.write();
        let (address, access) = match inner.handles.get(&handle) {
            Some(open) => (open.address.clone(), open.access),
            None => {
                return Err(RegError::Os {
                    code: 6,
                    message: "invalid handle".to_string(),
                    address: String::new(),
                })
            }
        };
        f(&mut inner, address, access)
    }

    fn register_handle(&self, address: KeyAddress, access: AccessMode) -> HandleId {
        let mut inner = self.inner.write();
        inner.next_handle += 1;
        let id = inner.next_handle;
        inner.handles.insert(id, OpenHandle { address, access });
        id
    }
}

fn segments(address: &KeyAddress) -> Vec<&str> {
    if address.subpath().is_empty() {
        Vec::new()
    } else {
        address.subpath().split('\\').collect()
    }
}

fn resolve<'a>(inner: &'a Inner, address: &KeyAddress) -> Option<&'a Node> {
    let mut node = inner.roots.get(&address.root())?;
    for segment in segments(address) {
        node = node.children.get(&segment.to_ascii_lowercase())?;
    }
    Some(node)
}

fn resolve_mut<'a>(inner: &'a mut Inner, address: &KeyAddress) -> Option<&'a mut Node> {
    let mut node = inner.roots.get_mut(&address.root())?;
    for segment in segments(address) {
        node = node.children.get_mut(&segment.to_ascii_lowercase())?;
    }
    Some(node)
}

/// The deepest node on the address's path that already exists.
fn nearest_existing<'a>(inner: &'a Inner, address: &KeyAddress) -> Option<&'a Node> {
    let mut probe = address.clone();
    loop {
        if let Some(node) = resolve(inner, &probe) {
            return Some(node);
        }
        match probe.parent() {
            Some((parent, _)) => probe = parent,
            None => return inner.roots.get(&address.root()),
        }
    }
}

fn ensure_node<'a>(inner: &'a mut Inner, address: &KeyAddress) -> &'a mut Node {
    let mut node = inner
        .roots
        .entry(address.root())
        .or_insert_with(|| Node::named(address.root().as_str()));
    for segment in segments(address) {
        node = node
            .children
            .entry(segment.to_ascii_lowercase())
            .or_insert_with(|| Node::named(segment));
    }
    node
}

fn check_open_access(node: &Node, address: &KeyAddress, access: AccessMode) -> Result<()> {
    if node.perms.deny_read {
        return Err(RegError::access_denied(address.to_string()));
    }
    if access.is_write() && node.perms.deny_write {
        return Err(RegError::access_denied(address.to_string()));
    }
    Ok(())
}

fn require_write(access: AccessMode, address: &KeyAddress) -> Result<()> {
    if access.is_write() {
        Ok(())
    } else {
        Err(RegError::access_denied(address.to_string()))
    }
}

fn require_child_delete(access: AccessMode, address: &KeyAddress) -> Result<()> {
    if access.allows_child_delete() {
        Ok(())
    } else {
        Err(RegError::access_denied(address.to_string()))
    }
}

/// Shared deletion guts for `delete_key` / `delete_key_tree`.
fn delete_at(inner: &mut Inner, address: &KeyAddress, recursive: bool) -> Result<()> {
    if address.is_root() {
        // the roots themselves are not deletable
        return Err(RegError::access_denied(address.to_string()));
    }
    let (parent_addr, leaf) = address.parent().unwrap_or_else(|| {
        (
            KeyAddress::new(address.root(), ""),
            address.subpath().to_string(),
        )
    });

    let Some(parent) = resolve_mut(inner, &parent_addr) else {
        return Err(RegError::not_found(address.to_string()));
    };
    let key = leaf.to_ascii_lowercase();
    let Some(target) = parent.children.get(&key) else {
        return Err(RegError::not_found(address.to_string()));
    };

    if target.perms.deny_write {
        return Err(RegError::access_denied(address.to_string()));
    }
    if recursive {
        if target.subtree_has_lock() {
            return Err(RegError::access_denied(address.to_string()));
        }
    } else {
        if target.perms.locked {
            return Err(RegError::access_denied(address.to_string()));
        }
        if !target.children.is_empty() {
            return Err(RegError::Os {
                code: 5,
                message: "key has subkeys".to_string(),
                address: address.to_string(),
            });
        }
    }

    parent.children.remove(&key);
    Ok(())
}

impl StoreBackend for MemoryStore {
    fn open(&self, address: &KeyAddress, access: AccessMode) -> Result<KeyHandle<'_>> {
        {
            let inner = self.inner.read();
            let node = resolve(&inner, address)
                .ok_or_else(|| RegError::not_found(address.to_string()))?;
            check_open_access(node, address, access)?;
        }
        let id = self.register_handle(address.clone(), access);
        Ok(KeyHandle::from_raw(self, id, address.clone(), access))
    }

    fn create(&self, address: &KeyAddress, access: AccessMode) -> Result<KeyHandle<'_>> {
        {
            let mut inner = self.inner.write();
            if let Some(node) = resolve(&inner, address) {
                check_open_access(node, address, access)?;
            } else {
                // creating new nodes needs write rights on the nearest
                // existing ancestor
                let blocked = nearest_existing(&inner, address)
                    .is_some_and(|node| node.perms.deny_write || node.perms.deny_read);
                if blocked {
                    return Err(RegError::access_denied(address.to_string()));
                }
                ensure_node(&mut inner, address);
            }
        }
        let id = self.register_handle(address.clone(), access);
        Ok(KeyHandle::from_raw(self, id, address.clone(), access))
    }

    fn key_exists(&self, address: &KeyAddress) -> bool {
        resolve(&self.inner.read(), address).is_some()
    }

    fn delete_key(&self, address: &KeyAddress) -> Result<()> {
        delete_at(&mut self.inner.write(), address, false)
    }

    fn delete_key_redirected(&self, address: &KeyAddress) -> Result<()> {
        // no WOW64 view in the portable tree; same as the exact delete
        delete_at(&mut self.inner.write(), address, false)
    }

    fn delete_key_tree(&self, address: &KeyAddress) -> Result<()> {
        delete_at(&mut self.inner.write(), address, true)
    }

    fn handle_list_children(&self, handle: HandleId) -> Result<Vec<String>> {
        self.with_handle(handle, |inner, address, _| {
            let node = resolve(inner, &address)
                .ok_or_else(|| RegError::not_found(address.to_string()))?;
            Ok(node.children.values().map(|c| c.name.clone()).collect())
        })
    }

    fn handle_list_values(&self, handle: HandleId) -> Result<Vec<RegValue>> {
        self.with_handle(handle, |inner, address, _| {
            let node = resolve(inner, &address)
                .ok_or_else(|| RegError::not_found(address.to_string()))?;
            Ok(node.values.values().map(|s| s.value.clone()).collect())
        })
    }

    fn handle_get_value(&self, handle: HandleId, name: &str) -> Result<RegValue> {
        self.with_handle(handle, |inner, address, _| {
            let node = resolve(inner, &address)
                .ok_or_else(|| RegError::not_found(address.to_string()))?;
            node.values
                .get(&name.to_ascii_lowercase())
                .map(|s| s.value.clone())
                .ok_or_else(|| RegError::not_found(format!("{address}\\{name}")))
        })
    }

    fn handle_set_value(&self, handle: HandleId, value: &RegValue) -> Result<()> {
        self.with_handle(handle, |inner, address, access| {
            require_write(access, &address)?;
            let node = resolve_mut(inner, &address)
                .ok_or_else(|| RegError::not_found(address.to_string()))?;
            if node.perms.deny_write {
                return Err(RegError::access_denied(address.to_string()));
            }
            node.values.insert(
                value.name.to_ascii_lowercase(),
                StoredValue {
                    value: value.clone(),
                },
            );
            Ok(())
        })
    }

    fn handle_delete_value(&self, handle: HandleId, name: &str) -> Result<()> {
        self.with_handle(handle, |inner, address, access| {
            require_write(access, &address)?;
            let node = resolve_mut(inner, &address)
                .ok_or_else(|| RegError::not_found(address.to_string()))?;
            if node.perms.deny_write {
                return Err(RegError::access_denied(address.to_string()));
            }
            node.values
                .remove(&name.to_ascii_lowercase())
                .map(|_| ())
                .ok_or_else(|| RegError::not_found(format!("{address}\\{name}")))
        })
    }

    fn handle_delete_child(&self, handle: HandleId, name: &str) -> Result<()> {
        self.with_handle(handle, |inner, address, access| {
            require_child_delete(access, &address)?;
            delete_at(inner, &address.child(name), false)
        })
    }

    fn handle_delete_subtree(&self, handle: HandleId, name: &str) -> Result<()> {
        self.with_handle(handle, |inner, address, access| {
            require_child_delete(access, &address)?;
            delete_at(inner, &address.child(name), true)
        })
    }

    fn handle_counts(&self, handle: HandleId) -> Result<(usize, usize)> {
        self.with_handle(handle, |inner, address, _| {
            let node = resolve(inner, &address)
                .ok_or_else(|| RegError::not_found(address.to_string()))?;
            Ok((node.children.len(), node.values.len()))
        })
    }

    fn handle_release(&self, handle: HandleId) {
        self.inner.write().handles.remove(&handle);
    }

    fn take_ownership(&self, _privs: &PrivilegeCache, address: &KeyAddress) -> Result<()> {
        let mut inner = self.inner.write();
        inner
            .escalations
            .push((EscalationOp::TakeOwnership, address.clone()));
        match resolve(&inner, address) {
            Some(node) if node.perms.locked => Err(RegError::access_denied(address.to_string())),
            Some(_) => Ok(()),
            None => Err(RegError::not_found(address.to_string())),
        }
    }

    fn grant_full_control(&self, _privs: &PrivilegeCache, address: &KeyAddress) -> Result<()> {
        let mut inner = self.inner.write();
        inner
            .escalations
            .push((EscalationOp::GrantFullControl, address.clone()));
        match resolve_mut(&mut inner, address) {
            Some(node) if node.perms.locked => Err(RegError::access_denied(address.to_string())),
            Some(node) => {
                // full control inherits into the subtree
                clear_write_denial(node);
                Ok(())
            }
            None => Err(RegError::not_found(address.to_string())),
        }
    }
}

fn clear_write_denial(node: &mut Node) {
    if !node.perms.locked {
        node.perms.deny_write = false;
    }
    for child in node.children.values_mut() {
        clear_write_denial(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::value::ValueData;
    use crate::store::value::ValueType;

    fn addr(path: &str) -> KeyAddress {
        KeyAddress::parse(path).unwrap()
    }

    #[test]
    fn open_missing_key_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .open(&addr("HKCU\\Software\\Nope"), AccessMode::Read)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn handles_release_on_every_exit_path() {
        let store = MemoryStore::new();
        store.add_key(&addr("HKCU\\Software\\App"));

        {
            let handle = store.open(&addr("HKCU\\Software\\App"), AccessMode::Read).unwrap();
            assert_eq!(store.open_handle_count(), 1);
            // error path inside the scope
            assert!(handle.get_value("missing").unwrap_err().is_not_found());
        }
        assert_eq!(store.open_handle_count(), 0);
    }

    #[test]
    fn value_names_are_case_insensitive() {
        let store = MemoryStore::new();
        let key = addr("HKCU\\Software\\App");
        store.add_value(&key, RegValue::string("Startup", "x"));

        let handle = store.open(&key, AccessMode::Read).unwrap();
        assert_eq!(handle.get_value("sTaRtUp").unwrap().as_string(), Some("x"));
    }

    #[test]
    fn set_value_requires_write_access() {
        let store = MemoryStore::new();
        let key = addr("HKCU\\Software\\App");
        store.add_key(&key);

        let handle = store.open(&key, AccessMode::Read).unwrap();
        let err = handle.set_value(&RegValue::string("a", "b")).unwrap_err();
        assert!(err.is_access_denied());

        let handle = store.open(&key, AccessMode::SetValue).unwrap();
        handle.set_value(&RegValue::string("a", "b")).unwrap();
        assert_eq!(store.value_of(&key, "a").unwrap().as_string(), Some("b"));
    }

    #[test]
    fn deny_read_blocks_open() {
        let store = MemoryStore::new();
        let key = addr("HKLM\\SECURITY\\Hidden");
        store.add_key(&key);
        store.set_perms(
            &key,
            NodePerms {
                deny_read: true,
                ..NodePerms::default()
            },
        );
        assert!(store
            .open(&key, AccessMode::Read)
            .unwrap_err()
            .is_access_denied());
    }

    #[test]
    fn delete_key_refuses_non_empty_then_tree_succeeds() {
        let store = MemoryStore::new();
        store.add_key(&addr("HKCU\\Software\\Old\\Child"));

        let target = addr("HKCU\\Software\\Old");
        let err = store.delete_key(&target).unwrap_err();
        assert!(matches!(err, RegError::Os { code: 5, .. }));

        store.delete_key_tree(&target).unwrap();
        assert!(!store.key_exists(&target));
        assert!(store.key_exists(&addr("HKCU\\Software")));
    }

    #[test]
    fn locked_node_survives_tree_delete_and_escalation() {
        let store = MemoryStore::new();
        let target = addr("HKLM\\SOFTWARE\\Stuck");
        store.add_key(&target.child("Inner"));
        store.set_perms(
            &target,
            NodePerms {
                locked: true,
                ..NodePerms::default()
            },
        );

        assert!(store.delete_key_tree(&target).unwrap_err().is_access_denied());
        let privs = PrivilegeCache::acquire();
        assert!(store
            .grant_full_control(&privs, &target)
            .unwrap_err()
            .is_access_denied());
        assert!(store.key_exists(&target));
        assert_eq!(store.escalation_log().len(), 1);
    }

    #[test]
    fn grant_full_control_clears_write_denial_recursively() {
        let store = MemoryStore::new();
        let parent = addr("HKLM\\SOFTWARE\\Guarded");
        let child = parent.child("Sub");
        store.add_key(&child);
        for a in [&parent, &child] {
            store.set_perms(
                a,
                NodePerms {
                    deny_write: true,
                    ..NodePerms::default()
                },
            );
        }

        assert!(store
            .open(&parent, AccessMode::Write)
            .unwrap_err()
            .is_access_denied());

        let privs = PrivilegeCache::acquire();
        store.grant_full_control(&privs, &parent).unwrap();
        assert!(store.open(&parent, AccessMode::Write).is_ok());
        assert!(store.open(&child, AccessMode::Write).is_ok());
    }

    #[test]
    fn create_under_write_denied_parent_fails() {
        let store = MemoryStore::new();
        let sealed = addr("HKCU\\Software\\Sealed");
        store.add_key(&sealed);
        store.set_perms(
            &sealed,
            NodePerms {
                deny_write: true,
                ..NodePerms::default()
            },
        );

        let err = store
            .create(&sealed.child("Inner"), AccessMode::Write)
            .unwrap_err();
        assert!(err.is_access_denied());
        assert!(!store.key_exists(&sealed.child("Inner")));
    }

    #[test]
    fn list_children_preserves_original_case() {
        let store = MemoryStore::new();
        store.add_key(&addr("HKCR\\CLSID\\{AAAA}"));
        store.add_key(&addr("HKCR\\CLSID\\{bbbb}"));

        let handle = store.open(&addr("HKCR\\CLSID"), AccessMode::Read).unwrap();
        let children = handle.list_children().unwrap();
        assert_eq!(children, vec!["{AAAA}".to_string(), "{bbbb}".to_string()]);
    }

    #[test]
    fn multi_typed_values_enumerate() {
        let store = MemoryStore::new();
        let key = addr("HKCU\\Software\\Mixed");
        store.add_value(&key, RegValue::string("s", "text"));
        store.add_value(&key, RegValue::dword("d", 42));
        store.add_value(
            &key,
            RegValue::new("b", ValueType::Binary, ValueData::Binary(vec![1, 2])),
        );

        let handle = store.open(&key, AccessMode::Read).unwrap();
        assert_eq!(handle.list_values().unwrap().len(), 3);
        assert_eq!(handle.counts().unwrap(), (0, 3));
    }
}
