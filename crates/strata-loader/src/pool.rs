//! Named object pool with a combined release guard
//!
//! Each pooled object carries two counts: how many callers currently hold it
//! (`spawn_count`) and how many other pooled objects depend on it
//! (`dependency_count`). An object is releasable only when both are zero;
//! [`ObjectPool::try_release`] checks that single condition and refuses
//! otherwise.
//!
//! Unused objects stay pooled so a later load can reuse them. They are swept
//! once they expire or when the pool holds more than its capacity, oldest
//! first.

use crate::config::PoolConfig;
use crate::error::{LoaderError, Result};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct PoolEntry<T> {
    target: T,
    spawn_count: usize,
    dependency_count: usize,
    last_use: Instant,
}

impl<T> PoolEntry<T> {
    const fn hold_count(&self) -> usize {
        self.spawn_count + self.dependency_count
    }
}

/// Objects keyed by name
#[derive(Debug)]
pub struct ObjectPool<T> {
    name: String,
    capacity: usize,
    expire_time: Duration,
    auto_release_interval: Duration,
    auto_release_time: Duration,
    entries: HashMap<String, PoolEntry<T>>,
}

impl<T> ObjectPool<T> {
    /// Empty pool tuned by `config`
    pub fn new(name: impl Into<String>, config: &PoolConfig) -> Self {
        Self {
            name: name.into(),
            capacity: config.capacity,
            expire_time: config.expire_time,
            auto_release_interval: config.auto_release_interval,
            auto_release_time: Duration::ZERO,
            entries: HashMap::new(),
        }
    }

    /// Pool name, used in diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of pooled objects
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Number of objects nothing holds
    pub fn unused_count(&self) -> usize {
        self.entries.values().filter(|e| e.hold_count() == 0).count()
    }

    /// Pooled objects beyond which unused ones are released
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity; takes effect on the next sweep
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    /// How long an unused object may stay pooled
    pub fn expire_time(&self) -> Duration {
        self.expire_time
    }

    /// Change the expire time; takes effect on the next sweep
    pub fn set_expire_time(&mut self, expire_time: Duration) {
        self.expire_time = expire_time;
    }

    /// Whether `key` is pooled
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Add a new object, optionally already held once by the caller
    pub fn register(&mut self, key: impl Into<String>, target: T, spawned: bool) -> Result<&T> {
        match self.entries.entry(key.into()) {
            Entry::Occupied(entry) => Err(LoaderError::Invariant(format!(
                "'{}' is already registered in the {} pool",
                entry.key(),
                self.name
            ))),
            Entry::Vacant(entry) => Ok(&entry
                .insert(PoolEntry {
                    target,
                    spawn_count: usize::from(spawned),
                    dependency_count: 0,
                    last_use: Instant::now(),
                })
                .target),
        }
    }

    /// Whether [`Self::spawn`] would succeed
    pub fn can_spawn(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Take one more hold on `key`
    pub fn spawn(&mut self, key: &str) -> Option<&T> {
        let entry = self.entries.get_mut(key)?;
        entry.spawn_count += 1;
        entry.last_use = Instant::now();
        Some(&entry.target)
    }

    /// Give back one hold on `key`
    pub fn unspawn(&mut self, key: &str) -> Result<()> {
        let name = &self.name;
        let entry = self.entries.get_mut(key).ok_or_else(|| {
            LoaderError::Invariant(format!("cannot unspawn unknown '{key}' from the {name} pool"))
        })?;
        if entry.spawn_count == 0 {
            return Err(LoaderError::Invariant(format!(
                "'{key}' in the {name} pool is not spawned"
            )));
        }
        entry.spawn_count -= 1;
        entry.last_use = Instant::now();
        Ok(())
    }

    /// Pooled object without taking a hold
    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key).map(|e| &e.target)
    }

    /// Pooled object, mutably, without taking a hold
    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.entries.get_mut(key).map(|e| &mut e.target)
    }

    /// Current holders of `key`
    pub fn spawn_count(&self, key: &str) -> Option<usize> {
        self.entries.get(key).map(|e| e.spawn_count)
    }

    /// Pooled objects depending on `key`
    pub fn dependency_count(&self, key: &str) -> Option<usize> {
        self.entries.get(key).map(|e| e.dependency_count)
    }

    /// Record that another object depends on `key`
    pub fn add_dependency(&mut self, key: &str) -> Result<()> {
        let name = &self.name;
        let entry = self.entries.get_mut(key).ok_or_else(|| {
            LoaderError::Invariant(format!("dependency on unknown '{key}' in the {name} pool"))
        })?;
        entry.dependency_count += 1;
        Ok(())
    }

    /// Drop a dependency recorded by [`Self::add_dependency`]
    pub fn remove_dependency(&mut self, key: &str) -> Result<()> {
        let name = &self.name;
        let entry = self.entries.get_mut(key).ok_or_else(|| {
            LoaderError::Invariant(format!("dependency on unknown '{key}' in the {name} pool"))
        })?;
        if entry.dependency_count == 0 {
            return Err(LoaderError::Invariant(format!(
                "dependency count of '{key}' in the {name} pool would go negative"
            )));
        }
        entry.dependency_count -= 1;
        entry.last_use = Instant::now();
        Ok(())
    }

    /// Whether `key` is pooled and nothing holds or depends on it
    pub fn can_release(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|e| e.hold_count() == 0)
    }

    /// Remove `key` when nothing holds or depends on it
    ///
    /// Returns `None` when it is still in use or not pooled.
    pub fn try_release(&mut self, key: &str) -> Option<T> {
        if !self.can_release(key) {
            return None;
        }
        self.entries.remove(key).map(|e| e.target)
    }

    /// Release unused objects
    ///
    /// With `all`, every unused object goes. Otherwise only the expired ones
    /// plus, oldest first, as many as needed to get back under capacity.
    pub fn release_unused(&mut self, now: Instant, all: bool) -> Vec<(String, T)> {
        let mut candidates: Vec<(Instant, String)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.hold_count() == 0)
            .map(|(k, e)| (e.last_use, k.clone()))
            .collect();
        candidates.sort();

        let release: Vec<String> = if all {
            candidates.into_iter().map(|(_, k)| k).collect()
        } else {
            let mut over_capacity = self.entries.len().saturating_sub(self.capacity);
            candidates
                .into_iter()
                .filter(|(last_use, _)| {
                    let expired = now.saturating_duration_since(*last_use) >= self.expire_time;
                    if expired || over_capacity > 0 {
                        over_capacity = over_capacity.saturating_sub(1);
                        true
                    } else {
                        false
                    }
                })
                .map(|(_, k)| k)
                .collect()
        };

        release
            .into_iter()
            .filter_map(|key| self.entries.remove(&key).map(|e| (key, e.target)))
            .collect()
    }

    /// Advance the auto-release timer, sweeping when the interval elapses
    pub fn update(&mut self, elapsed: Duration, now: Instant) -> Vec<(String, T)> {
        self.auto_release_time += elapsed;
        if self.auto_release_time < self.auto_release_interval {
            return Vec::new();
        }
        self.auto_release_time = Duration::ZERO;
        self.release_unused(now, false)
    }
}
