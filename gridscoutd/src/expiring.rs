//! Key/value map whose entries lapse a fixed time after their last insert.
//!
//! There is no background timer: callers pass `now` and expired entries are
//! swept when the map is read.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
pub struct ExpiringMap<K, V> {
    ttl: Duration,
    entries: HashMap<K, (V, DateTime<Utc>)>,
}

impl<K: Eq + Hash, V> ExpiringMap<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Insert or overwrite, restarting the entry's lifetime at `now`
    pub fn insert(&mut self, key: K, value: V, now: DateTime<Utc>) -> Option<V> {
        self.entries.insert(key, (value, now)).map(|(v, _)| v)
    }

    /// Live value for `key`, ignoring (but not removing) an expired one
    pub fn get<Q>(&self, key: &Q, now: DateTime<Utc>) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries
            .get(key)
            .filter(|(_, at)| !self.is_expired(*at, now))
            .map(|(v, _)| v)
    }

    /// When the live entry for `key` was last inserted
    pub fn inserted_at<Q>(&self, key: &Q, now: DateTime<Utc>) -> Option<DateTime<Utc>>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries
            .get(key)
            .map(|(_, at)| *at)
            .filter(|at| !self.is_expired(*at, now))
    }

    /// Drop every entry older than the ttl. Returns how many were dropped.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, (_, at)| now - *at <= ttl);
        before - self.entries.len()
    }

    /// Sweep, then iterate the remaining entries
    pub fn live(&mut self, now: DateTime<Utc>) -> impl Iterator<Item = (&K, &V)> {
        self.sweep(now);
        self.entries.iter().map(|(k, (v, _))| (k, v))
    }

    /// Number of stored entries, including any not yet swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_expired(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - at > self.ttl
    }
}
