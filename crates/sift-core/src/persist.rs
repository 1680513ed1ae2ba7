//! Durable offset storage.
//!
//! A [`Database`] wraps a single sled file shared by the whole agent; each
//! operator owns a [`Persister`] scoped to a tree named by its id. The
//! persister keeps an in-memory working set: `load` snapshots the tree,
//! `get`/`set` touch only memory, and `sync` writes dirty keys back in one
//! atomic batch. Input operators run `sync` on a periodic tick and once more
//! on shutdown.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crate::error::PersistError;

/// Handle to the agent's embedded key-value store.
#[derive(Debug, Clone)]
pub struct Database {
    db: sled::Db,
}

impl Database {
    /// Opens (or creates) the store at the provided path. Intermediate
    /// directories are created; sled does not do so itself.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let db = sled::Config::new().path(path).open()?;
        Ok(Database { db })
    }

    /// Opens an in-memory store. Offsets do not survive a restart; used by
    /// tests and by hosts running without a database path.
    pub fn ephemeral() -> Result<Self, PersistError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Database { db })
    }

    /// Opens the persister scoped to `scope` (an operator id).
    pub fn scoped(&self, scope: impl Into<String>) -> Result<Persister, PersistError> {
        let scope = scope.into();
        let tree = self.db.open_tree(scope.as_bytes())?;
        Ok(Persister {
            scope,
            tree,
            state: Mutex::new(PersisterState::default()),
        })
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> Result<(), PersistError> {
        self.db.flush()?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct PersisterState {
    cache: HashMap<String, Vec<u8>>,
    dirty: HashSet<String>,
}

/// A scoped durable key-value facade owned by one operator.
///
/// Keys are opaque strings, values opaque byte sequences. The working set is
/// guarded by a lock so a background flush never races the owning reader
/// task's `set` calls.
#[derive(Debug)]
pub struct Persister {
    scope: String,
    tree: sled::Tree,
    state: Mutex<PersisterState>,
}

impl Persister {
    /// The operator id this persister is scoped to.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Reads all keys under the scope into the in-memory working set,
    /// discarding any unsynced local changes.
    pub fn load(&self) -> Result<(), PersistError> {
        let mut loaded = HashMap::new();
        for kv in self.tree.iter() {
            let (key, value) = kv?;
            loaded.insert(String::from_utf8_lossy(&key).into_owned(), value.to_vec());
        }

        let mut state = lock_state(&self.state);
        state.cache = loaded;
        state.dirty.clear();
        Ok(())
    }

    /// Returns the value for `key` from the working set.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        lock_state(&self.state).cache.get(key).cloned()
    }

    /// Stores `value` under `key` in the working set. Durable after the
    /// next `sync`.
    pub fn set(&self, key: impl Into<String>, value: Vec<u8>) {
        let key = key.into();
        let mut state = lock_state(&self.state);
        state.cache.insert(key.clone(), value);
        state.dirty.insert(key);
    }

    /// Writes dirty keys back to storage in one atomic batch.
    pub fn sync(&self) -> Result<(), PersistError> {
        let mut batch = sled::Batch::default();
        {
            let mut state = lock_state(&self.state);
            if state.dirty.is_empty() {
                return Ok(());
            }
            for key in state.dirty.iter() {
                if let Some(value) = state.cache.get(key) {
                    batch.insert(key.as_bytes(), value.as_slice());
                }
            }
            state.dirty.clear();
        }
        self.tree.apply_batch(batch)?;
        self.tree.flush()?;
        Ok(())
    }
}

/// Locks the working set, recovering from a poisoned lock: the state is a
/// plain map, valid regardless of where another thread panicked.
fn lock_state(state: &Mutex<PersisterState>) -> std::sync::MutexGuard<'_, PersisterState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_intermediate_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("offsets.db");
        let db = Database::open(&path).unwrap();
        drop(db);
        assert!(path.exists());
    }

    #[test]
    fn set_get_round_trip_in_memory() {
        let db = Database::ephemeral().unwrap();
        let persister = db.scoped("op1").unwrap();
        persister.load().unwrap();

        assert_eq!(persister.get("cursor"), None);
        persister.set("cursor", b"abc".to_vec());
        assert_eq!(persister.get("cursor"), Some(b"abc".to_vec()));
    }

    #[test]
    fn sync_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("offsets.db");
        {
            let db = Database::open(&path).unwrap();
            let persister = db.scoped("op1").unwrap();
            persister.load().unwrap();
            persister.set("cursor", b"abc".to_vec());
            persister.sync().unwrap();
        }

        let db = Database::open(&path).unwrap();
        let persister = db.scoped("op1").unwrap();
        persister.load().unwrap();
        assert_eq!(persister.get("cursor"), Some(b"abc".to_vec()));
    }

    #[test]
    fn unsynced_values_are_not_durable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("offsets.db");
        {
            let db = Database::open(&path).unwrap();
            let persister = db.scoped("op1").unwrap();
            persister.load().unwrap();
            persister.set("cursor", b"abc".to_vec());
            // no sync
        }

        let db = Database::open(&path).unwrap();
        let persister = db.scoped("op1").unwrap();
        persister.load().unwrap();
        assert_eq!(persister.get("cursor"), None);
    }

    #[test]
    fn scopes_are_isolated() {
        let db = Database::ephemeral().unwrap();
        let one = db.scoped("one").unwrap();
        let two = db.scoped("two").unwrap();
        one.load().unwrap();
        two.load().unwrap();

        one.set("key", b"1".to_vec());
        one.sync().unwrap();
        two.load().unwrap();
        assert_eq!(two.get("key"), None);
    }

    #[test]
    fn load_discards_unsynced_changes() {
        let db = Database::ephemeral().unwrap();
        let persister = db.scoped("op1").unwrap();
        persister.load().unwrap();
        persister.set("key", b"local".to_vec());
        persister.load().unwrap();
        assert_eq!(persister.get("key"), None);
    }

    #[test]
    fn sync_without_changes_is_a_no_op() {
        let db = Database::ephemeral().unwrap();
        let persister = db.scoped("op1").unwrap();
        persister.load().unwrap();
        persister.sync().unwrap();
    }
}
