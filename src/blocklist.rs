use dashmap::DashSet;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::info;

use crate::error::StoreError;
use crate::store::{load_or_default, write_json};

/// Durable set of banned addresses.
///
/// The whole list lives in memory and is rewritten to disk on every change.
/// Lookups read the concurrent set directly; `add` and `remove` take the
/// writer lock so the in-memory change and the file rewrite happen as one
/// step with respect to other writers. The lock also guards a dirty flag:
/// after a failed write, the next `add` or `remove` rewrites the file even
/// if membership does not change.
pub struct PersistentSet {
    path: PathBuf,
    members: DashSet<String>,
    writer: Mutex<bool>,
}

impl PersistentSet {
    // Load from disk; a missing or unreadable file gives an empty set
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let stored: Vec<String> = load_or_default(&path, "ban list");
        let members: DashSet<String> = stored.into_iter().collect();
        info!(path = %path.display(), banned = members.len(), "ban list loaded");

        Self {
            path,
            members,
            writer: Mutex::new(false),
        }
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.members.contains(addr)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Adds `addr`. Returns `Ok(false)` when it was already present, in which
    /// case nothing is written unless an earlier write failed.
    ///
    /// On a write error the address stays banned in memory; the error tells
    /// the caller the file no longer matches.
    pub fn add(&self, addr: &str) -> Result<bool, StoreError> {
        let mut dirty = self.writer.lock();
        let added = self.members.insert(addr.to_string());
        if added || *dirty {
            self.persist(&mut *dirty)?;
        }
        Ok(added)
    }

    /// Removes `addr`. Returns `Ok(false)` when it was not banned.
    pub fn remove(&self, addr: &str) -> Result<bool, StoreError> {
        let mut dirty = self.writer.lock();
        let removed = self.members.remove(addr).is_some();
        if removed || *dirty {
            self.persist(&mut *dirty)?;
        }
        Ok(removed)
    }

    pub fn all(&self) -> BTreeSet<String> {
        self.members.iter().map(|m| m.key().clone()).collect()
    }

    // caller holds the writer lock and passes its dirty flag
    fn persist(&self, dirty: &mut bool) -> Result<(), StoreError> {
        let snapshot: Vec<String> = self.all().into_iter().collect();
        let result = write_json(&self.path, &snapshot);
        *dirty = result.is_err();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn contains_on_missing_store_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let set = PersistentSet::open(dir.path().join("blockedIps.json"));
        assert!(!set.contains("5.6.7.8"));
        assert!(set.is_empty());
    }

    #[test]
    fn add_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let set = PersistentSet::open(dir.path().join("blockedIps.json"));

        assert!(set.add("1.2.3.4").unwrap());
        let before = set.all();
        assert!(!set.add("1.2.3.4").unwrap());
        assert_eq!(set.all(), before);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let set = PersistentSet::open(dir.path().join("blockedIps.json"));
        set.add("1.2.3.4").unwrap();

        assert!(set.remove("1.2.3.4").unwrap());
        assert!(!set.remove("1.2.3.4").unwrap());
        assert!(!set.contains("1.2.3.4"));
    }

    #[test]
    fn reload_restores_members() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blockedIps.json");
        {
            let set = PersistentSet::open(&path);
            set.add("1.2.3.4").unwrap();
            set.add("10.0.0.1").unwrap();
            set.add("::1").unwrap();
            set.remove("10.0.0.1").unwrap();
        }

        let reloaded = PersistentSet::open(&path);
        let expected: BTreeSet<String> =
            ["1.2.3.4".to_string(), "::1".to_string()].into_iter().collect();
        assert_eq!(reloaded.all(), expected);
    }

    #[test]
    fn reads_plain_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blockedIps.json");
        fs::write(&path, r#"["1.1.1.1", "2.2.2.2", "1.1.1.1"]"#).unwrap();

        let set = PersistentSet::open(&path);
        assert_eq!(set.len(), 2);
        assert!(set.contains("2.2.2.2"));
    }

    #[test]
    fn corrupt_store_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blockedIps.json");
        fs::write(&path, "garbage").unwrap();

        let set = PersistentSet::open(&path);
        assert!(set.is_empty());
        // next write replaces the corrupt file
        set.add("3.3.3.3").unwrap();
        assert_eq!(PersistentSet::open(&path).len(), 1);
    }

    #[test]
    fn write_failure_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        // parent is a regular file, so the write must fail
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let set = PersistentSet::open(blocker.join("blockedIps.json"));

        assert!(set.add("4.4.4.4").is_err());
        assert!(set.contains("4.4.4.4"));
    }

    #[test]
    fn failed_write_is_retried_by_next_add() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("state");
        fs::write(&parent, "x").unwrap();
        let path = parent.join("blockedIps.json");
        let set = PersistentSet::open(&path);

        assert!(set.add("4.4.4.4").is_err());

        // storage comes back; re-adding the same address is a no-op in memory
        // but must still bring the file in line
        fs::remove_file(&parent).unwrap();
        assert!(!set.add("4.4.4.4").unwrap());
        assert!(PersistentSet::open(&path).contains("4.4.4.4"));

        // once clean, redundant adds stop writing
        fs::remove_file(&path).unwrap();
        assert!(!set.add("4.4.4.4").unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn failed_write_is_retried_by_next_remove() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("state");
        fs::write(&parent, "x").unwrap();
        let path = parent.join("blockedIps.json");
        let set = PersistentSet::open(&path);

        assert!(set.add("4.4.4.4").is_err());
        fs::remove_file(&parent).unwrap();

        assert!(!set.remove("9.9.9.9").unwrap());
        assert!(PersistentSet::open(&path).contains("4.4.4.4"));
    }

    #[test]
    fn concurrent_adds_all_land_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blockedIps.json");
        let set = PersistentSet::open(&path);

        std::thread::scope(|s| {
            for t in 0..8 {
                let set = &set;
                s.spawn(move || {
                    for i in 0..25 {
                        set.add(&format!("10.{t}.0.{i}")).unwrap();
                    }
                });
            }
        });

        assert_eq!(set.len(), 200);
        assert_eq!(PersistentSet::open(&path).len(), 200);
    }
}
