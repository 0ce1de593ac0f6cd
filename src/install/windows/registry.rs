//! Read-only access to `HKEY_LOCAL_MACHINE` uninstall entries.

use std::io;

use windows::Win32::Foundation::ERROR_NO_MORE_ITEMS;
use windows::Win32::System::Registry::{
    HKEY, HKEY_LOCAL_MACHINE, KEY_READ, REG_DWORD, REG_EXPAND_SZ, REG_SZ, REG_VALUE_TYPE,
    RegEnumKeyExW, RegOpenKeyExW, RegQueryValueExW,
};
use windows::core::{PCWSTR, PWSTR};

use super::handles::RegistryHandle;
use super::utils::{MAX_KEY_NAME, to_wide, wide_bytes_to_string};
use crate::install::registry::RegistryValue;

fn open_local_machine(path: &str) -> io::Result<RegistryHandle> {
    let path_w = to_wide(path);
    let mut key_handle: HKEY = HKEY::default();

    unsafe {
        RegOpenKeyExW(
            HKEY_LOCAL_MACHINE,
            PCWSTR::from_raw(path_w.as_ptr()),
            None,
            KEY_READ,
            &mut key_handle,
        )
        .ok()?;
    }

    Ok(RegistryHandle(key_handle))
}

/// Names of the immediate subkeys of `HKLM\<root>`
pub(crate) fn subkeys(root: &str) -> io::Result<Vec<String>> {
    let key = open_local_machine(root)?;
    let mut names = Vec::new();
    let mut name_buf = [0u16; MAX_KEY_NAME];

    for index in 0u32.. {
        let mut len = name_buf.len() as u32;
        let status = unsafe {
            RegEnumKeyExW(
                key.handle(),
                index,
                Some(PWSTR::from_raw(name_buf.as_mut_ptr())),
                &mut len,
                None,
                None,
                None,
                None,
            )
        };
        if status == ERROR_NO_MORE_ITEMS {
            break;
        }
        status.ok()?;
        names.push(String::from_utf16_lossy(&name_buf[..len as usize]));
    }

    Ok(names)
}

/// Value `name` of `HKLM\<key>`, as a string or DWORD
pub(crate) fn value(key: &str, name: &str) -> io::Result<RegistryValue> {
    let key = open_local_machine(key)?;
    let name_w = to_wide(name);
    let mut kind = REG_VALUE_TYPE::default();
    let mut size: u32 = 0;

    // First call sizes the buffer
    unsafe {
        RegQueryValueExW(
            key.handle(),
            PCWSTR::from_raw(name_w.as_ptr()),
            None,
            Some(&mut kind),
            None,
            Some(&mut size),
        )
        .ok()?;
    }

    let mut data = vec![0u8; size as usize];
    unsafe {
        RegQueryValueExW(
            key.handle(),
            PCWSTR::from_raw(name_w.as_ptr()),
            None,
            Some(&mut kind),
            Some(data.as_mut_ptr()),
            Some(&mut size),
        )
        .ok()?;
    }
    data.truncate(size as usize);

    match kind {
        REG_SZ | REG_EXPAND_SZ => Ok(RegistryValue::String(wide_bytes_to_string(&data))),
        REG_DWORD => {
            let bytes: [u8; 4] = data
                .get(..4)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "truncated DWORD"))?;
            Ok(RegistryValue::Dword(u32::from_le_bytes(bytes)))
        }
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported registry value type {}", other.0),
        )),
    }
}
