//! Point reads and writes against the platform property service.
//!
//! On Android this is the system property area; elsewhere a small TOML file
//! stands in for it so the daemon can be exercised on a build host.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, RildError};

/// Platform PROPERTY_VALUE_MAX, including the trailing NUL.
pub const PROPERTY_VALUE_MAX: usize = 92;

pub trait PropertyStore: Send + Sync {
    /// Returns `None` for unset and empty values alike.
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;
}

fn check_value(key: &str, value: &str) -> Result<()> {
    if value.len() >= PROPERTY_VALUE_MAX {
        return Err(RildError::Property(format!(
            "value for {} is {} bytes (max {})",
            key,
            value.len(),
            PROPERTY_VALUE_MAX - 1
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryPropertyStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryPropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: Mutex::new(values),
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

impl PropertyStore for MemoryPropertyStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().ok()?;
        values.get(key).filter(|v| !v.is_empty()).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        check_value(key, value)?;
        let mut values = self
            .values
            .lock()
            .map_err(|_| RildError::Property("property map lock poisoned".into()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// Flat `key = "value"` TOML table. Re-read on every access so values
/// written by other processes are observed.
pub struct FilePropertyStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FilePropertyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        toml::from_str(&content).map_err(|e| {
            RildError::Property(format!("failed to parse {}: {}", self.path.display(), e))
        })
    }
}

impl PropertyStore for FilePropertyStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.read_all() {
            Ok(values) => values.get(key).filter(|v| !v.is_empty()).cloned(),
            Err(e) => {
                tracing::warn!("Failed to read properties from {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        check_value(key, value)?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| RildError::Property("property file lock poisoned".into()))?;

        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string(&values)
            .map_err(|e| RildError::Property(format!("failed to serialize properties: {}", e)))?;
        fs::write(&self.path, content)?;

        tracing::trace!(key = %key, value = %value, "Property written");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Android system properties
// ---------------------------------------------------------------------------

#[cfg(target_os = "android")]
pub struct SystemProperties;

#[cfg(target_os = "android")]
impl PropertyStore for SystemProperties {
    fn get(&self, key: &str) -> Option<String> {
        let key = std::ffi::CString::new(key).ok()?;
        let mut buf = [0 as libc::c_char; PROPERTY_VALUE_MAX];
        // SAFETY: buf holds PROPERTY_VALUE_MAX bytes as the API requires.
        let len = unsafe { libc::__system_property_get(key.as_ptr(), buf.as_mut_ptr()) };
        if len <= 0 {
            return None;
        }
        // SAFETY: the property service always NUL-terminates within the buffer.
        let value = unsafe { std::ffi::CStr::from_ptr(buf.as_ptr()) };
        Some(value.to_string_lossy().into_owned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        check_value(key, value)?;
        let c_key = std::ffi::CString::new(key)
            .map_err(|_| RildError::Property(format!("invalid key {:?}", key)))?;
        let c_value = std::ffi::CString::new(value)
            .map_err(|_| RildError::Property(format!("invalid value for {}", key)))?;
        // SAFETY: both pointers are valid NUL-terminated strings.
        let rc = unsafe { libc::__system_property_set(c_key.as_ptr(), c_value.as_ptr()) };
        if rc != 0 {
            return Err(RildError::Property(format!("failed to set {}", key)));
        }
        Ok(())
    }
}

/// The store this platform actually uses.
pub fn platform_store(config: &crate::config::PropertiesConfig) -> Box<dyn PropertyStore> {
    #[cfg(target_os = "android")]
    {
        let _ = config;
        Box::new(SystemProperties)
    }

    #[cfg(not(target_os = "android"))]
    {
        let path = crate::clienv::properties_file().unwrap_or_else(|| config.file.clone());
        tracing::debug!(path = %path.display(), "Using file-backed property store");
        Box::new(FilePropertyStore::new(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_empty_value_reads_as_unset() {
        let store = MemoryPropertyStore::with([("rild.libpath", "")]);
        assert_eq!(store.get("rild.libpath"), None);
        assert_eq!(store.get("rild.libargs"), None);
    }

    #[test]
    fn test_value_length_is_bounded() {
        let store = MemoryPropertyStore::new();
        let long = "x".repeat(PROPERTY_VALUE_MAX);
        assert!(matches!(
            store.set("rild.libargs", &long),
            Err(RildError::Property(_))
        ));

        let fits = "x".repeat(PROPERTY_VALUE_MAX - 1);
        store.set("rild.libargs", &fits).unwrap();
        assert_eq!(store.get("rild.libargs"), Some(fits));
    }

    #[test]
    fn test_file_store_persists_between_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("properties.toml");

        let store = FilePropertyStore::new(&path);
        assert_eq!(store.get("rild.libpath"), None);
        store.set("rild.libpath", "/vendor/lib/libvendor-ril.so").unwrap();
        store.set("ro.HOME_APP_ADJ", "4").unwrap();

        let reopened = FilePropertyStore::new(&path);
        assert_eq!(
            reopened.get("rild.libpath").as_deref(),
            Some("/vendor/lib/libvendor-ril.so")
        );
        assert_eq!(reopened.get("ro.HOME_APP_ADJ").as_deref(), Some("4"));
    }

    #[test]
    fn test_file_store_unparseable_file_reads_as_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("properties.toml");
        fs::write(&path, "not [valid toml").unwrap();

        let store = FilePropertyStore::new(&path);
        assert_eq!(store.get("rild.libpath"), None);
        assert!(store.set("rild.libpath", "x").is_err());
    }
}
