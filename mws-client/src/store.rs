//! Ordered key/value container on an embedded `sled` database, used for result
//! sets too large to keep in memory.

use crate::types::{MwsError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const ANONYMOUS_KEY_WIDTH: usize = 20;

/// Removes a temporary database directory once the database is closed.
struct Backing {
    path: PathBuf,
    cleanup: bool,
}

impl Drop for Backing {
    fn drop(&mut self) {
        if self.cleanup && self.path.exists() {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                warn!("Failed to remove store {}: {}", self.path.display(), e);
            }
        }
    }
}

pub struct KeyedDiskStore<V> {
    // Declared before `backing` so the database closes before its directory goes.
    db: sled::Db,
    backing: Backing,
    count: usize,
    next_anonymous: u64,
    _marker: PhantomData<fn() -> V>,
}

impl<V: Serialize + DeserializeOwned> KeyedDiskStore<V> {
    /// New empty store in a fresh `big-cache-*` directory under `dir`.
    pub fn temporary_in(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(MwsError::Config(format!(
                "Temporary directory {} does not exist",
                dir.display()
            )));
        }
        let path = dir.join(format!("big-cache-{}", Uuid::new_v4().simple()));
        let db = sled::Config::new().path(&path).open()?;
        debug!("Opened temporary store {}", path.display());
        Ok(Self {
            db,
            backing: Backing { path, cleanup: true },
            count: 0,
            next_anonymous: 0,
            _marker: PhantomData,
        })
    }

    pub fn temporary() -> Result<Self> {
        Self::temporary_in(std::env::temp_dir())
    }

    /// Opens a store previously written with [`save`](Self::save).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MwsError::Config(format!("Store {} does not exist", path.display())));
        }
        let db = sled::Config::new().path(path).open()?;
        let mut store = Self {
            db,
            backing: Backing { path: path.to_path_buf(), cleanup: false },
            count: 0,
            next_anonymous: 0,
            _marker: PhantomData,
        };
        store.recount()?;
        Ok(store)
    }

    pub fn set(&mut self, key: impl AsRef<str>, value: &V) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        if self.db.insert(key.as_ref().as_bytes(), bytes)?.is_none() {
            self.count += 1;
        }
        Ok(())
    }

    /// Stores `value` under the next anonymous key and returns that key.
    pub fn push(&mut self, value: &V) -> Result<String> {
        let key = format!("{:0width$}", self.next_anonymous, width = ANONYMOUS_KEY_WIDTH);
        self.next_anonymous += 1;
        self.set(&key, value)?;
        Ok(key)
    }

    pub fn get(&self, key: impl AsRef<str>) -> Result<Option<V>> {
        match self.db.get(key.as_ref().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn delete(&mut self, key: impl AsRef<str>) -> Result<bool> {
        let removed = self.db.remove(key.as_ref().as_bytes())?.is_some();
        if removed {
            self.count -= 1;
        }
        Ok(removed)
    }

    pub fn contains(&self, key: impl AsRef<str>) -> Result<bool> {
        Ok(self.db.contains_key(key.as_ref().as_bytes())?)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Entries in key order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            inner: self.db.iter(),
            _marker: PhantomData,
        }
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.db
            .iter()
            .keys()
            .map(|key| Ok(String::from_utf8_lossy(&key?).into_owned()))
            .collect()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.db.clear()?;
        self.count = 0;
        self.next_anonymous = 0;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.backing.path
    }

    /// Keeps the current backing directory when the store is dropped or moved.
    pub fn retain(&mut self) {
        self.backing.cleanup = false;
    }

    /// Copies every entry to `target` and continues on that copy. The caller
    /// owns `target` afterwards; it is never removed by the store.
    pub fn save(&mut self, target: impl AsRef<Path>) -> Result<()> {
        let target = target.as_ref();
        match target.parent() {
            Some(parent) if parent.as_os_str().is_empty() || parent.is_dir() => {}
            _ => {
                return Err(MwsError::Config(format!(
                    "Directory for {} does not exist",
                    target.display()
                )));
            }
        }

        let saved = sled::Config::new().path(target).open()?;
        saved.clear()?;
        for entry in self.db.iter() {
            let (key, value) = entry?;
            saved.insert(key, value)?;
        }
        saved.flush()?;
        debug!("Saved {} entries to {}", self.count, target.display());

        self.db = saved;
        self.backing = Backing { path: target.to_path_buf(), cleanup: false };
        Ok(())
    }

    /// Repoints the store at an existing saved store.
    pub fn load(&mut self, source: impl AsRef<Path>) -> Result<()> {
        let source = source.as_ref();
        if !source.exists() {
            return Err(MwsError::Config(format!("Store {} does not exist", source.display())));
        }
        self.db = sled::Config::new().path(source).open()?;
        self.backing = Backing { path: source.to_path_buf(), cleanup: false };
        self.recount()
    }

    fn recount(&mut self) -> Result<()> {
        let mut count = 0;
        let mut next_anonymous = 0;
        for key in self.db.iter().keys() {
            let key = key?;
            count += 1;
            if key.len() == ANONYMOUS_KEY_WIDTH && key.iter().all(u8::is_ascii_digit) {
                if let Ok(n) = String::from_utf8_lossy(&key).parse::<u64>() {
                    next_anonymous = next_anonymous.max(n + 1);
                }
            }
        }
        self.count = count;
        self.next_anonymous = next_anonymous;
        Ok(())
    }
}

pub struct Iter<'a, V> {
    inner: sled::Iter,
    _marker: PhantomData<&'a fn() -> V>,
}

impl<V: DeserializeOwned> Iterator for Iter<'_, V> {
    type Item = Result<(String, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.inner.next()?;
        Some(entry.map_err(MwsError::from).and_then(|(key, value)| {
            let value = serde_json::from_slice(&value)?;
            Ok((String::from_utf8_lossy(&key).into_owned(), value))
        }))
    }
}

impl<V> std::fmt::Debug for KeyedDiskStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedDiskStore")
            .field("path", &self.backing.path)
            .field("count", &self.count)
            .finish()
    }
}
