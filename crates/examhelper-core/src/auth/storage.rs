//! Durable key-value storage backends for session records.

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tempfile::NamedTempFile;

/// String key-value storage that survives restarts.
///
/// `remove` on a missing key must succeed.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One file per key under a directory.
///
/// Writes go to a temp file in the same directory and are renamed into
/// place, so readers see either the old record or the new one.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read storage entry '{}'", key)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir).context("Failed to create storage directory")?;
        let mut file = NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("Failed to stage storage entry '{}'", key))?;
        file.write_all(value.as_bytes())
            .with_context(|| format!("Failed to write storage entry '{}'", key))?;
        file.persist(self.path_for(key))
            .with_context(|| format!("Failed to replace storage entry '{}'", key))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        // No exists() check: a concurrent clear may delete the file first
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove storage entry '{}'", key)),
        }
    }
}

/// Process-local storage; contents are lost on exit.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("storage"));

        assert_eq!(storage.get("user").unwrap(), None);
        storage.set("user", r#"{"token":"abc"}"#).unwrap();
        assert_eq!(storage.get("user").unwrap().as_deref(), Some(r#"{"token":"abc"}"#));
        assert!(dir.path().join("storage").join("user.json").exists());
    }

    #[test]
    fn test_file_storage_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());

        storage.set("user", "{}").unwrap();
        storage.remove("user").unwrap();
        storage.remove("user").unwrap();
        assert_eq!(storage.get("user").unwrap(), None);
    }

    #[test]
    fn test_file_storage_readers_never_see_partial_record() {
        let dir = tempfile::tempdir().unwrap();
        let storage = std::sync::Arc::new(FileStorage::new(dir.path().to_path_buf()));
        let short = r#"{"token":"a"}"#.to_string();
        let long = format!(r#"{{"token":"{}"}}"#, "b".repeat(64 * 1024));
        storage.set("user", &short).unwrap();

        let writer = {
            let storage = storage.clone();
            let (short, long) = (short.clone(), long.clone());
            std::thread::spawn(move || {
                for i in 0..200 {
                    let value = if i % 2 == 0 { &long } else { &short };
                    storage.set("user", value).unwrap();
                }
            })
        };

        while !writer.is_finished() {
            let seen = storage.get("user").unwrap();
            assert!(
                seen.as_deref() == Some(short.as_str()) || seen.as_deref() == Some(long.as_str()),
                "read a torn record of {} bytes",
                seen.map(|s| s.len()).unwrap_or(0)
            );
        }
        writer.join().unwrap();

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1, "temp files left behind");
    }

    #[test]
    fn test_memory_storage_remove_missing_is_ok() {
        let storage = MemoryStorage::new();
        storage.remove("user").unwrap();
        storage.set("user", "{}").unwrap();
        storage.remove("user").unwrap();
        assert_eq!(storage.get("user").unwrap(), None);
    }
}
