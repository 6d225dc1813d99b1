//! Windows registry backend (`HKEY_CURRENT_USER`)

use super::errors::{StoreError, StoreResult};
use super::store::{SettingsKey, SettingsStore};
use winreg::enums::{HKEY_CURRENT_USER, KEY_READ, KEY_WRITE};
use winreg::RegKey;

/// Settings store over the current user's registry hive
///
/// Every `open_key` opens a fresh `RegKey`; the handle is closed when the
/// returned box is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrySettingsStore;

impl RegistrySettingsStore {
    pub fn current_user() -> Self {
        RegistrySettingsStore
    }
}

impl SettingsStore for RegistrySettingsStore {
    fn open_key(&self, path: &str) -> StoreResult<Box<dyn SettingsKey + '_>> {
        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        let key = hkcu
            .open_subkey_with_flags(path, KEY_READ | KEY_WRITE)
            .map_err(StoreError::from)?;
        tracing::trace!(target = "sysproxy", path, "registry key opened");
        Ok(Box::new(RegistryKey {
            path: path.to_string(),
            key,
        }))
    }
}

struct RegistryKey {
    path: String,
    key: RegKey,
}

impl SettingsKey for RegistryKey {
    fn path(&self) -> &str {
        &self.path
    }

    fn get_u32(&self, name: &str) -> StoreResult<u32> {
        self.key.get_value::<u32, _>(name).map_err(StoreError::from)
    }

    fn get_string(&self, name: &str) -> StoreResult<String> {
        self.key.get_value::<String, _>(name).map_err(StoreError::from)
    }

    fn set_u32(&self, name: &str, value: u32) -> StoreResult<()> {
        self.key.set_value(name, &value).map_err(StoreError::from)
    }

    fn set_string(&self, name: &str, value: &str) -> StoreResult<()> {
        self.key.set_value(name, &value).map_err(StoreError::from)
    }

    fn delete_value(&self, name: &str) -> StoreResult<()> {
        self.key.delete_value(name).map_err(StoreError::from)
    }
}
