//! Process environment access under an explicit lock.
//!
//! The environment table is process-wide mutable state. Every read goes
//! through a shared guard and every write or read-modify-write sequence
//! through an exclusive guard on [`ENV_LOCK`], so a spawn that snapshots the
//! environment never observes a half-applied update made through this module.
//!
//! Code that calls `std::env::set_var` directly bypasses the lock.

use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

static ENV_LOCK: RwLock<()> = RwLock::new(());

fn read_lock() -> RwLockReadGuard<'static, ()> {
    ENV_LOCK.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock() -> RwLockWriteGuard<'static, ()> {
    ENV_LOCK.write().unwrap_or_else(PoisonError::into_inner)
}

/// Read one variable.
pub fn var(key: impl AsRef<OsStr>) -> Option<OsString> {
    let _guard = read_lock();
    std::env::var_os(key)
}

/// Read every variable as key/value pairs.
pub fn vars() -> Vec<(OsString, OsString)> {
    let _guard = read_lock();
    std::env::vars_os().collect()
}

/// Set one variable.
pub fn set_var(key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) {
    let _guard = write_lock();
    std::env::set_var(key, value);
}

/// Remove one variable.
pub fn remove_var(key: impl AsRef<OsStr>) {
    let _guard = write_lock();
    std::env::remove_var(key);
}

/// Read-modify-write a variable atomically with respect to this module.
///
/// `update` receives the current value and returns the new one; `None` removes
/// the variable.
pub fn update_var<K, F>(key: K, update: F)
where
    K: AsRef<OsStr>,
    F: FnOnce(Option<OsString>) -> Option<OsString>,
{
    let _guard = write_lock();
    let key = key.as_ref();
    match update(std::env::var_os(key)) {
        Some(value) => std::env::set_var(key, value),
        None => std::env::remove_var(key),
    }
}

/// Snapshot of the environment as `KEY=VALUE` entries, with `overrides`
/// replacing any inherited entry of the same key.
///
/// Overrides come first, in the order given, followed by the remaining
/// inherited entries.
pub fn snapshot(overrides: &[(OsString, OsString)]) -> Vec<OsString> {
    let inherited = vars();
    let mut entries = Vec::with_capacity(inherited.len() + overrides.len());

    for (key, value) in overrides {
        entries.push(join_entry(key, value));
    }
    for (key, value) in inherited {
        if overrides.iter().any(|(k, _)| *k == key) {
            continue;
        }
        entries.push(join_entry(&key, &value));
    }
    entries
}

/// Look up `key` in a list of `KEY=VALUE` entries. The first match wins.
pub(crate) fn lookup<'a>(entries: &'a [OsString], key: &OsStr) -> Option<&'a OsStr> {
    let key = key.as_bytes();
    entries.iter().find_map(|entry| {
        let bytes = entry.as_bytes();
        let (k, v) = split_entry(bytes)?;
        (k == key).then(|| OsStr::from_bytes(v))
    })
}

fn split_entry(entry: &[u8]) -> Option<(&[u8], &[u8])> {
    let eq = entry.iter().position(|&b| b == b'=')?;
    Some((&entry[..eq], &entry[eq + 1..]))
}

fn join_entry(key: &OsStr, value: &OsStr) -> OsString {
    let mut entry = OsString::with_capacity(key.len() + value.len() + 1);
    entry.push(key);
    entry.push("=");
    entry.push(value);
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_remove() {
        set_var("PROC_SPAWN_ENVIRON_SET", "one");
        assert_eq!(var("PROC_SPAWN_ENVIRON_SET"), Some(OsString::from("one")));

        remove_var("PROC_SPAWN_ENVIRON_SET");
        assert_eq!(var("PROC_SPAWN_ENVIRON_SET"), None);
    }

    #[test]
    fn test_update_var_read_modify_write() {
        set_var("PROC_SPAWN_ENVIRON_COUNTER", "1");
        for _ in 0..4 {
            update_var("PROC_SPAWN_ENVIRON_COUNTER", |current| {
                let n: u32 = current
                    .and_then(|v| v.to_str().and_then(|s| s.parse().ok()))
                    .unwrap_or(0);
                Some(OsString::from((n + 1).to_string()))
            });
        }
        assert_eq!(
            var("PROC_SPAWN_ENVIRON_COUNTER"),
            Some(OsString::from("5"))
        );

        update_var("PROC_SPAWN_ENVIRON_COUNTER", |_| None);
        assert_eq!(var("PROC_SPAWN_ENVIRON_COUNTER"), None);
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        set_var("PROC_SPAWN_ENVIRON_CONCURRENT", "0");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    for _ in 0..50 {
                        update_var("PROC_SPAWN_ENVIRON_CONCURRENT", |current| {
                            let n: u32 = current
                                .and_then(|v| v.to_str().and_then(|s| s.parse().ok()))
                                .unwrap_or(0);
                            Some(OsString::from((n + 1).to_string()))
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(
            var("PROC_SPAWN_ENVIRON_CONCURRENT"),
            Some(OsString::from("400"))
        );
        remove_var("PROC_SPAWN_ENVIRON_CONCURRENT");
    }

    #[test]
    fn test_snapshot_applies_overrides() {
        set_var("PROC_SPAWN_ENVIRON_SNAP", "inherited");
        let overrides = vec![(
            OsString::from("PROC_SPAWN_ENVIRON_SNAP"),
            OsString::from("overridden"),
        )];
        let entries = snapshot(&overrides);

        assert_eq!(entries[0], OsString::from("PROC_SPAWN_ENVIRON_SNAP=overridden"));
        let matches = entries
            .iter()
            .filter(|e| e.as_bytes().starts_with(b"PROC_SPAWN_ENVIRON_SNAP="))
            .count();
        assert_eq!(matches, 1);
        remove_var("PROC_SPAWN_ENVIRON_SNAP");
    }

    #[test]
    fn test_lookup_first_match_wins() {
        let entries = vec![
            OsString::from("PATH=/first"),
            OsString::from("PATH=/second"),
            OsString::from("EMPTY="),
        ];
        assert_eq!(lookup(&entries, OsStr::new("PATH")), Some(OsStr::new("/first")));
        assert_eq!(lookup(&entries, OsStr::new("EMPTY")), Some(OsStr::new("")));
        assert_eq!(lookup(&entries, OsStr::new("MISSING")), None);
    }
}
