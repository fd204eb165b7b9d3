//! Native Windows registry backend: winreg for key/value access, raw
//! security APIs for ownership transfer and DACL rewrite.
//!
//! Only compiled on Windows. The unsafe surface is confined to the privilege
//! and ACL calls at the bottom of this file.

#![allow(unsafe_code)]
#![allow(missing_docs)]
#![allow(clippy::cast_possible_truncation)]

use std::collections::HashMap;
use std::io;

use parking_lot::Mutex;
use winreg::enums::{
    HKEY_CLASSES_ROOT, HKEY_CURRENT_CONFIG, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS,
    KEY_ALL_ACCESS, KEY_READ, KEY_SET_VALUE, KEY_WOW64_64KEY, KEY_WRITE, RegType,
};
use winreg::{HKEY, RegKey};

use crate::core::errors::{RegError, Result};
use crate::escalate::PrivilegeCache;
use crate::store::value::{RegValue, ValueType};
use crate::store::{AccessMode, HandleId, KeyAddress, KeyHandle, RootKey, StoreBackend};

const fn root_hkey(root: RootKey) -> HKEY {
    match root {
        RootKey::ClassesRoot => HKEY_CLASSES_ROOT,
        RootKey::CurrentUser => HKEY_CURRENT_USER,
        RootKey::LocalMachine => HKEY_LOCAL_MACHINE,
        RootKey::Users => HKEY_USERS,
        RootKey::CurrentConfig => HKEY_CURRENT_CONFIG,
    }
}

const fn access_flags(access: AccessMode) -> u32 {
    match access {
        AccessMode::Read => KEY_READ,
        AccessMode::SetValue => KEY_SET_VALUE,
        AccessMode::Write => KEY_WRITE,
        AccessMode::AllAccess => KEY_ALL_ACCESS,
    }
}

fn map_io_error(err: &io::Error, address: &KeyAddress) -> RegError {
    match err.raw_os_error() {
        Some(2 | 3) => RegError::not_found(address.to_string()),
        Some(5) => RegError::access_denied(address.to_string()),
        Some(code) => RegError::Os {
            code,
            message: err.to_string(),
            address: address.to_string(),
        },
        None => RegError::Os {
            code: -1,
            message: err.to_string(),
            address: address.to_string(),
        },
    }
}

fn decode_native(name: String, raw: &winreg::RegValue) -> RegValue {
    let code = raw.vtype as u32;
    RegValue::from_bytes(name, ValueType::from_code(code), &raw.bytes)
}

fn encode_native(value: &RegValue) -> winreg::RegValue {
    // RegType discriminants match the native codes our tags carry.
    let vtype = match value.value_type.code() {
        0 => RegType::REG_NONE,
        1 => RegType::REG_SZ,
        2 => RegType::REG_EXPAND_SZ,
        4 => RegType::REG_DWORD,
        5 => RegType::REG_DWORD_BIG_ENDIAN,
        6 => RegType::REG_LINK,
        7 => RegType::REG_MULTI_SZ,
        8 => RegType::REG_RESOURCE_LIST,
        9 => RegType::REG_FULL_RESOURCE_DESCRIPTOR,
        10 => RegType::REG_RESOURCE_REQUIREMENTS_LIST,
        11 => RegType::REG_QWORD,
        _ => RegType::REG_BINARY,
    };
    winreg::RegValue {
        bytes: value.to_bytes(),
        vtype,
    }
}

struct OpenKey {
    key: RegKey,
    address: KeyAddress,
}

/// Live-registry backend.
pub struct NativeStore {
    handles: Mutex<HashMap<HandleId, OpenKey>>,
    next_handle: Mutex<HandleId>,
}

impl Default for NativeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            next_handle: Mutex::new(0),
        }
    }

    fn register(&self, key: RegKey, address: KeyAddress) -> HandleId {
        let mut next = self.next_handle.lock();
        *next += 1;
        let id = *next;
        self.handles.lock().insert(id, OpenKey { key, address });
        id
    }

    fn with_key<T>(
        &self,
        handle: HandleId,
        f: impl FnOnce(&RegKey, &KeyAddress) -> Result<T>,
    ) -> Result<T> {
        let handles = self.handles.lock();
        let open = handles.get(&handle).ok_or_else(|| RegError::Os {
            code: 6,
            message: "invalid handle".to_string(),
            address: String::new(),
        })?;
        f(&open.key, &open.address)
    }
}

impl StoreBackend for NativeStore {
    fn open(&self, address: &KeyAddress, access: AccessMode) -> Result<KeyHandle<'_>> {
        let key = RegKey::predef(root_hkey(address.root()))
            .open_subkey_with_flags(address.subpath(), access_flags(access))
            .map_err(|e| map_io_error(&e, address))?;
        let id = self.register(key, address.clone());
        Ok(KeyHandle::from_raw(self, id, address.clone(), access))
    }

    fn create(&self, address: &KeyAddress, access: AccessMode) -> Result<KeyHandle<'_>> {
        let (key, _) = RegKey::predef(root_hkey(address.root()))
            .create_subkey_with_flags(address.subpath(), access_flags(access))
            .map_err(|e| map_io_error(&e, address))?;
        let id = self.register(key, address.clone());
        Ok(KeyHandle::from_raw(self, id, address.clone(), access))
    }

    fn key_exists(&self, address: &KeyAddress) -> bool {
        RegKey::predef(root_hkey(address.root()))
            .open_subkey_with_flags(address.subpath(), KEY_READ)
            .is_ok()
    }

    fn delete_key(&self, address: &KeyAddress) -> Result<()> {
        RegKey::predef(root_hkey(address.root()))
            .delete_subkey(address.subpath())
            .map_err(|e| map_io_error(&e, address))
    }

    fn delete_key_redirected(&self, address: &KeyAddress) -> Result<()> {
        RegKey::predef(root_hkey(address.root()))
            .delete_subkey_with_flags(address.subpath(), KEY_WOW64_64KEY)
            .map_err(|e| map_io_error(&e, address))
    }

    fn delete_key_tree(&self, address: &KeyAddress) -> Result<()> {
        RegKey::predef(root_hkey(address.root()))
            .delete_subkey_all(address.subpath())
            .map_err(|e| map_io_error(&e, address))
    }

    fn handle_list_children(&self, handle: HandleId) -> Result<Vec<String>> {
        self.with_key(handle, |key, address| {
            key.enum_keys()
                .map(|entry| entry.map_err(|e| map_io_error(&e, address)))
                .collect()
        })
    }

    fn handle_list_values(&self, handle: HandleId) -> Result<Vec<RegValue>> {
        // winreg re-queries with a grown buffer on ERROR_MORE_DATA, so the
        // transparent-retry contract holds here.
        self.with_key(handle, |key, address| {
            key.enum_values()
                .map(|entry| {
                    entry
                        .map(|(name, raw)| decode_native(name, &raw))
                        .map_err(|e| map_io_error(&e, address))
                })
                .collect()
        })
    }

    fn handle_get_value(&self, handle: HandleId, name: &str) -> Result<RegValue> {
        self.with_key(handle, |key, address| {
            key.get_raw_value(name)
                .map(|raw| decode_native(name.to_string(), &raw))
                .map_err(|e| map_io_error(&e, address))
        })
    }

    fn handle_set_value(&self, handle: HandleId, value: &RegValue) -> Result<()> {
        self.with_key(handle, |key, address| {
            key.set_raw_value(&value.name, &encode_native(value))
                .map_err(|e| map_io_error(&e, address))
        })
    }

    fn handle_delete_value(&self, handle: HandleId, name: &str) -> Result<()> {
        self.with_key(handle, |key, address| {
            key.delete_value(name).map_err(|e| map_io_error(&e, address))
        })
    }

    fn handle_delete_child(&self, handle: HandleId, name: &str) -> Result<()> {
        self.with_key(handle, |key, address| {
            key.delete_subkey(name)
                .map_err(|e| map_io_error(&e, &address.child(name)))
        })
    }

    fn handle_delete_subtree(&self, handle: HandleId, name: &str) -> Result<()> {
        self.with_key(handle, |key, address| {
            key.delete_subkey_all(name)
                .map_err(|e| map_io_error(&e, &address.child(name)))
        })
    }

    fn handle_counts(&self, handle: HandleId) -> Result<(usize, usize)> {
        self.with_key(handle, |key, address| {
            let info = key.query_info().map_err(|e| map_io_error(&e, address))?;
            Ok((info.sub_keys as usize, info.values as usize))
        })
    }

    fn handle_release(&self, handle: HandleId) {
        // dropping the RegKey closes the OS handle
        self.handles.lock().remove(&handle);
    }

    fn take_ownership(&self, privs: &PrivilegeCache, address: &KeyAddress) -> Result<()> {
        if !privs.can_escalate() {
            return Err(RegError::Escalation {
                address: address.to_string(),
                details: "required token privileges are not held".to_string(),
            });
        }
        security::set_owner_to_administrators(address)
    }

    fn grant_full_control(&self, _privs: &PrivilegeCache, address: &KeyAddress) -> Result<()> {
        security::grant_administrators_full_control(address)
    }
}

/// Enable the escalation privileges on the current process token.
#[must_use]
pub fn enable_escalation_privileges() -> PrivilegeCache {
    PrivilegeCache {
        take_ownership: security::enable_privilege(windows_sys::core::w!(
            "SeTakeOwnershipPrivilege"
        )),
        backup: security::enable_privilege(windows_sys::core::w!("SeBackupPrivilege")),
        restore: security::enable_privilege(windows_sys::core::w!("SeRestorePrivilege")),
    }
}

mod security {
    use std::ffi::c_void;
    use std::ptr;

    use windows_sys::Win32::Foundation::{CloseHandle, ERROR_SUCCESS, HANDLE, LocalFree};
    use windows_sys::Win32::Security::Authorization::{
        EXPLICIT_ACCESS_W, GRANT_ACCESS, SE_REGISTRY_KEY, SetEntriesInAclW, SetSecurityInfo,
        TRUSTEE_IS_GROUP, TRUSTEE_IS_SID, TRUSTEE_W,
    };
    use windows_sys::Win32::Security::{
        ACL, AdjustTokenPrivileges, CreateWellKnownSid, DACL_SECURITY_INFORMATION,
        LUID_AND_ATTRIBUTES, LookupPrivilegeValueW, OWNER_SECURITY_INFORMATION,
        SE_PRIVILEGE_ENABLED, SECURITY_MAX_SID_SIZE, SUB_CONTAINERS_AND_OBJECTS_INHERIT,
        TOKEN_ADJUST_PRIVILEGES, TOKEN_PRIVILEGES, TOKEN_QUERY, WinBuiltinAdministratorsSid,
    };
    use windows_sys::Win32::System::Registry::KEY_ALL_ACCESS;
    use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};
    use winreg::RegKey;

    use crate::core::errors::{RegError, Result};
    use crate::store::KeyAddress;

    use super::{map_io_error, root_hkey};

    pub(super) fn enable_privilege(name: *const u16) -> bool {
        unsafe {
            let mut token: HANDLE = ptr::null_mut();
            if OpenProcessToken(
                GetCurrentProcess(),
                TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY,
                &mut token,
            ) == 0
            {
                return false;
            }

            let mut privileges = TOKEN_PRIVILEGES {
                PrivilegeCount: 1,
                Privileges: [LUID_AND_ATTRIBUTES {
                    Luid: std::mem::zeroed(),
                    Attributes: SE_PRIVILEGE_ENABLED,
                }],
            };
            if LookupPrivilegeValueW(ptr::null(), name, &mut privileges.Privileges[0].Luid) == 0 {
                CloseHandle(token);
                return false;
            }

            let ok = AdjustTokenPrivileges(
                token,
                0,
                &privileges,
                std::mem::size_of::<TOKEN_PRIVILEGES>() as u32,
                ptr::null_mut(),
                ptr::null_mut(),
            ) != 0;
            CloseHandle(token);
            ok
        }
    }

    fn administrators_sid(buffer: &mut [u8; SECURITY_MAX_SID_SIZE as usize]) -> Result<*mut c_void> {
        let mut size = buffer.len() as u32;
        let sid = buffer.as_mut_ptr().cast::<c_void>();
        let ok = unsafe {
            CreateWellKnownSid(WinBuiltinAdministratorsSid, ptr::null_mut(), sid, &mut size)
        };
        if ok == 0 {
            return Err(RegError::Escalation {
                address: String::new(),
                details: "could not build administrators SID".to_string(),
            });
        }
        Ok(sid)
    }

    fn open_for_security(address: &KeyAddress, sam: u32) -> Result<RegKey> {
        RegKey::predef(root_hkey(address.root()))
            .open_subkey_with_flags(address.subpath(), sam)
            .map_err(|e| map_io_error(&e, address))
    }

    pub(super) fn set_owner_to_administrators(address: &KeyAddress) -> Result<()> {
        // WRITE_OWNER
        let key = open_for_security(address, 0x0008_0000)?;
        let mut sid_buffer = [0u8; SECURITY_MAX_SID_SIZE as usize];
        let sid = administrators_sid(&mut sid_buffer)?;

        let status = unsafe {
            SetSecurityInfo(
                key.raw_handle() as HANDLE,
                SE_REGISTRY_KEY,
                OWNER_SECURITY_INFORMATION,
                sid,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        if status != ERROR_SUCCESS {
            return Err(RegError::Escalation {
                address: address.to_string(),
                details: format!("ownership transfer failed with status {status}"),
            });
        }
        Ok(())
    }

    pub(super) fn grant_administrators_full_control(address: &KeyAddress) -> Result<()> {
        // WRITE_DAC
        let key = open_for_security(address, 0x0004_0000)?;
        let mut sid_buffer = [0u8; SECURITY_MAX_SID_SIZE as usize];
        let sid = administrators_sid(&mut sid_buffer)?;

        let mut entry: EXPLICIT_ACCESS_W = unsafe { std::mem::zeroed() };
        entry.grfAccessPermissions = KEY_ALL_ACCESS;
        entry.grfAccessMode = GRANT_ACCESS;
        entry.grfInheritance = SUB_CONTAINERS_AND_OBJECTS_INHERIT;
        entry.Trustee = TRUSTEE_W {
            pMultipleTrustee: ptr::null_mut(),
            MultipleTrusteeOperation: 0,
            TrusteeForm: TRUSTEE_IS_SID,
            TrusteeType: TRUSTEE_IS_GROUP,
            ptstrName: sid.cast(),
        };

        let mut new_dacl: *mut ACL = ptr::null_mut();
        let status = unsafe { SetEntriesInAclW(1, &entry, ptr::null(), &mut new_dacl) };
        if status != ERROR_SUCCESS {
            return Err(RegError::Escalation {
                address: address.to_string(),
                details: format!("DACL construction failed with status {status}"),
            });
        }

        let status = unsafe {
            let result = SetSecurityInfo(
                key.raw_handle() as HANDLE,
                SE_REGISTRY_KEY,
                DACL_SECURITY_INFORMATION,
                ptr::null_mut(),
                ptr::null_mut(),
                new_dacl,
                ptr::null_mut(),
            );
            LocalFree(new_dacl.cast());
            result
        };
        if status != ERROR_SUCCESS {
            return Err(RegError::Escalation {
                address: address.to_string(),
                details: format!("DACL rewrite failed with status {status}"),
            });
        }
        Ok(())
    }
}
