//! Persistent session state.
//!
//! A flat JSON map of key/value pairs that survives power loss. Writes are
//! coalesced: a plain `set_value` only hits the disk when the last flush is
//! at least ten seconds old, a forced one flushes immediately. The file is
//! replaced atomically via a temp file and rename so a crash mid-write
//! never leaves a half-written state behind.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::StateError;

const FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Key prefixes wiped by `reset`; everything else survives a ride reset.
const RESET_PREFIXES: &[&str] = &["manual_status", "sealevel_", "ant_"];

struct StateInner {
    values: HashMap<String, Value>,
    last_flush: Option<Instant>,
    dirty: bool,
}

pub struct StateStore {
    path: PathBuf,
    inner: Mutex<StateInner>,
}

impl StateStore {
    /// Open the store, loading any existing state file. A file that does
    /// not parse is moved aside and the store starts empty.
    pub fn open(path: &Path) -> Result<Self, StateError> {
        let values = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, Value>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "state file unreadable, starting fresh");
                    sideline_corrupt(path)?;
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(StateError::Io(e)),
        };
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(StateInner {
                values,
                last_flush: None,
                dirty: false,
            }),
        })
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.inner.lock().values.get(key).cloned()
    }

    /// Set a key. Persists immediately when `force` is set, otherwise only
    /// when the coalescing interval has elapsed.
    pub fn set_value(&self, key: &str, value: Value, force: bool) -> Result<(), StateError> {
        let mut inner = self.inner.lock();
        inner.values.insert(key.to_string(), value);
        inner.dirty = true;
        let due = match inner.last_flush {
            Some(at) => at.elapsed() >= FLUSH_INTERVAL,
            None => true,
        };
        if force || due {
            self.flush_locked(&mut inner)?;
        }
        Ok(())
    }

    pub fn remove_value(&self, key: &str) -> Result<(), StateError> {
        let mut inner = self.inner.lock();
        if inner.values.remove(key).is_some() {
            inner.dirty = true;
            self.flush_locked(&mut inner)?;
        }
        Ok(())
    }

    /// Write any pending values out now.
    pub fn flush(&self) -> Result<(), StateError> {
        let mut inner = self.inner.lock();
        if inner.dirty {
            self.flush_locked(&mut inner)?;
        }
        Ok(())
    }

    /// Drop the per-ride keys, keeping device-level settings.
    pub fn reset(&self) -> Result<(), StateError> {
        let mut inner = self.inner.lock();
        let before = inner.values.len();
        inner
            .values
            .retain(|k, _| !RESET_PREFIXES.iter().any(|p| k.starts_with(p)));
        if inner.values.len() != before {
            inner.dirty = true;
            self.flush_locked(&mut inner)?;
            info!(removed = before - inner.values.len(), "session state reset");
        }
        Ok(())
    }

    fn flush_locked(&self, inner: &mut StateInner) -> Result<(), StateError> {
        let encoded = serde_json::to_vec_pretty(&inner.values).map_err(StateError::Encode)?;
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        {
            let mut f = std::fs::File::create(&tmp)?;
            f.write_all(&encoded)?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        inner.last_flush = Some(Instant::now());
        inner.dirty = false;
        Ok(())
    }
}

/// Move an unparseable state file to `<name>.corrupt-<ts>`, never
/// overwriting an earlier one.
fn sideline_corrupt(path: &Path) -> Result<(), StateError> {
    let ts = chrono::Local::now().format("%Y%m%d%H%M%S");
    let mut target = PathBuf::from(format!("{}.corrupt-{ts}", path.display()));
    let mut n = 1;
    while target.exists() {
        target = PathBuf::from(format!("{}.corrupt-{ts}.{n}", path.display()));
        n += 1;
    }
    std::fs::rename(path, &target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_round_trip_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        {
            let store = StateStore::open(&path).unwrap();
            store.set_value("manual_status", json!("paused"), true).unwrap();
            store.set_value("sealevel_pressure", json!(1013.25), true).unwrap();
        }
        let store = StateStore::open(&path).unwrap();
        assert_eq!(store.get_value("manual_status"), Some(json!("paused")));
        assert_eq!(store.get_value("sealevel_pressure"), Some(json!(1013.25)));
    }

    #[test]
    fn unforced_writes_are_coalesced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::open(&path).unwrap();
        // the first unforced write flushes, the next one within the
        // interval does not
        store.set_value("a", json!(1), false).unwrap();
        store.set_value("a", json!(2), false).unwrap();
        let on_disk: HashMap<String, Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["a"], json!(1));
        // but the value is pending and a flush writes it
        store.flush().unwrap();
        let on_disk: HashMap<String, Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["a"], json!(2));
    }

    #[test]
    fn forced_writes_always_land() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::open(&path).unwrap();
        store.set_value("a", json!(1), false).unwrap();
        store.set_value("a", json!(2), true).unwrap();
        let on_disk: HashMap<String, Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["a"], json!(2));
    }

    #[test]
    fn corrupt_file_is_sidelined_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = StateStore::open(&path).unwrap();
        assert_eq!(store.get_value("anything"), None);
        let sidelined = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .any(|e| e.file_name().to_string_lossy().contains(".corrupt-"));
        assert!(sidelined);
    }

    #[test]
    fn reset_wipes_only_the_ride_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::open(&path).unwrap();
        store.set_value("manual_status", json!("running"), true).unwrap();
        store.set_value("sealevel_pressure", json!(1013.25), true).unwrap();
        store.set_value("ant_hr_device", json!(1234), true).unwrap();
        store.set_value("display_brightness", json!(80), true).unwrap();
        store.reset().unwrap();
        assert_eq!(store.get_value("manual_status"), None);
        assert_eq!(store.get_value("sealevel_pressure"), None);
        assert_eq!(store.get_value("ant_hr_device"), None);
        assert_eq!(store.get_value("display_brightness"), Some(json!(80)));
    }

    #[test]
    fn remove_value_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::open(&path).unwrap();
        store.set_value("a", json!(1), true).unwrap();
        store.remove_value("a").unwrap();
        let on_disk: HashMap<String, Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(on_disk.is_empty());
    }
}
