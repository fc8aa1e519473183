//! User preferences shared with the settings surface.
//!
//! Only one preference exists today: `cache_data`, which gates writing fetch
//! results through to the persisted cache.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Source of the caching preference, consulted before every write-through.
///
/// Implementations may block; the engine calls them on the blocking pool.
pub trait CachingPreference: Send + Sync + 'static {
  fn cache_enabled(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
  #[serde(default = "default_cache_data")]
  pub cache_data: bool,
}

fn default_cache_data() -> bool {
  true
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      cache_data: default_cache_data(),
    }
  }
}

/// Preferences persisted as YAML.
///
/// The file is re-read on every check so another process can change the
/// preference while the engine runs.
pub struct SettingsStore {
  path: PathBuf,
  last_known: Mutex<Settings>,
}

impl SettingsStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      last_known: Mutex::new(Settings::default()),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Read the settings file. A missing file means defaults.
  pub fn load(&self) -> Result<Settings> {
    let contents = match std::fs::read_to_string(&self.path) {
      Ok(c) => c,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
      Err(e) => {
        return Err(eyre!(
          "Failed to read settings file {}: {}",
          self.path.display(),
          e
        ))
      }
    };

    if contents.trim().is_empty() {
      return Ok(Settings::default());
    }

    let settings: Settings = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse settings file {}: {}", self.path.display(), e))?;

    if let Ok(mut last) = self.last_known.lock() {
      *last = settings;
    }
    Ok(settings)
  }

  /// Persist a new value for `cache_data`.
  pub fn set_cache_enabled(&self, enabled: bool) -> Result<()> {
    let mut settings = self.load().unwrap_or_default();
    settings.cache_data = enabled;
    self.save(&settings)?;

    if let Ok(mut last) = self.last_known.lock() {
      *last = settings;
    }
    tracing::info!("cache_data preference set to {}", enabled);
    Ok(())
  }

  fn save(&self, settings: &Settings) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create settings directory: {}", e))?;
    }

    let contents = serde_yaml::to_string(settings)?;

    // Write then rename so readers never see a half-written file.
    let tmp = self.path.with_extension("yaml.tmp");
    std::fs::write(&tmp, contents)
      .map_err(|e| eyre!("Failed to write settings file {}: {}", tmp.display(), e))?;
    std::fs::rename(&tmp, &self.path)
      .map_err(|e| eyre!("Failed to replace settings file {}: {}", self.path.display(), e))?;

    Ok(())
  }
}

impl CachingPreference for SettingsStore {
  fn cache_enabled(&self) -> bool {
    match self.load() {
      Ok(settings) => settings.cache_data,
      Err(e) => {
        tracing::warn!("{}; using last known preference", e);
        self
          .last_known
          .lock()
          .map(|s| s.cache_data)
          .unwrap_or_else(|_| default_cache_data())
      }
    }
  }
}

/// Preference held only in memory.
#[derive(Debug)]
pub struct MemoryPreference {
  enabled: AtomicBool,
}

impl MemoryPreference {
  pub fn new(enabled: bool) -> Self {
    Self {
      enabled: AtomicBool::new(enabled),
    }
  }

  pub fn set(&self, enabled: bool) {
    self.enabled.store(enabled, Ordering::SeqCst);
  }
}

impl Default for MemoryPreference {
  fn default() -> Self {
    Self::new(default_cache_data())
  }
}

impl CachingPreference for MemoryPreference {
  fn cache_enabled(&self) -> bool {
    self.enabled.load(Ordering::SeqCst)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_missing_file_defaults_to_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let store = SettingsStore::new(dir.path().join("settings.yaml"));

    assert_eq!(store.load().unwrap(), Settings::default());
    assert!(store.cache_enabled());
  }

  #[test]
  fn test_set_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs").join("settings.yaml");
    let store = SettingsStore::new(&path);

    store.set_cache_enabled(false).unwrap();
    assert!(!store.cache_enabled());

    // A second handle on the same file sees the change.
    let other = SettingsStore::new(&path);
    assert!(!other.cache_enabled());

    other.set_cache_enabled(true).unwrap();
    assert!(store.cache_enabled());
  }

  #[test]
  fn test_corrupt_file_uses_last_known() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.yaml");
    let store = SettingsStore::new(&path);
    store.set_cache_enabled(false).unwrap();

    std::fs::write(&path, "cache_data: [not, a, bool]").unwrap();
    assert!(store.load().is_err());
    assert!(!store.cache_enabled());
  }

  #[test]
  fn test_missing_key_defaults_to_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.yaml");
    std::fs::write(&path, "{}\n").unwrap();

    assert!(SettingsStore::new(&path).cache_enabled());
  }

  #[test]
  fn test_memory_preference() {
    let pref = MemoryPreference::default();
    assert!(pref.cache_enabled());
    pref.set(false);
    assert!(!pref.cache_enabled());
  }
}
