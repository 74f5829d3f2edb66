//! Client session context and read cache.
//!
//! Every cached read is stamped with the session epoch it was fetched under.
//! Login, logout, user switch and plant selection bump the epoch, which
//! invalidates everything fetched before; a response that arrives after the
//! bump is dropped instead of cached.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

/// Who is talking to the service and in which plant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    token: Option<String>,
    active_plant: Option<u64>,
    epoch: u64,
}

impl SessionContext {
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    pub fn active_plant(&self) -> Option<u64> {
        self.active_plant
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Start a session, or switch to another user. The active plant belongs to
    /// the previous user and is dropped.
    pub fn login(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
        self.active_plant = None;
        self.epoch += 1;
    }

    pub fn logout(&mut self) {
        self.token = None;
        self.active_plant = None;
        self.epoch += 1;
    }

    /// Returns whether the plant actually changed.
    pub fn set_active_plant(&mut self, plant: Option<u64>) -> bool {
        if self.active_plant == plant {
            return false;
        }
        self.active_plant = plant;
        self.epoch += 1;
        true
    }
}

#[derive(Debug, Clone)]
struct Entry {
    epoch: u64,
    value: Value,
}

/// Cached GET responses keyed by path and query.
#[derive(Debug, Default)]
pub struct ReadCache {
    entries: HashMap<String, Entry>,
}

impl ReadCache {
    pub fn get(&self, key: &str, epoch: u64) -> Option<Value> {
        self.entries
            .get(key)
            .filter(|e| e.epoch == epoch)
            .map(|e| e.value.clone())
    }

    /// Store a response fetched under `fetched_in`. Dropped if the session has
    /// since moved on to `current`.
    pub fn put(&mut self, key: String, fetched_in: u64, current: u64, value: Value) {
        if fetched_in != current {
            debug!(key, fetched_in, current, "discarding response from a previous session");
            return;
        }
        self.entries.insert(key, Entry { epoch: fetched_in, value });
    }

    /// Evict every entry whose key starts with one of `prefixes`.
    pub fn invalidate(&mut self, prefixes: &[&str]) {
        self.entries
            .retain(|key, _| !prefixes.iter().any(|p| key.starts_with(p)));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_changes_bump_epoch() {
        let mut s = SessionContext::default();
        s.login("tok-a");
        let e1 = s.epoch();
        assert!(s.set_active_plant(Some(3)));
        assert!(!s.set_active_plant(Some(3)));
        let e2 = s.epoch();
        assert!(e2 > e1);

        s.login("tok-b");
        assert_eq!(s.active_plant(), None);
        assert!(s.epoch() > e2);

        s.logout();
        assert!(!s.is_logged_in());
    }

    #[test]
    fn stale_entries_are_invisible() {
        let mut cache = ReadCache::default();
        cache.put("/plants?null".into(), 1, 1, json!([]));
        assert_eq!(cache.get("/plants?null", 1), Some(json!([])));
        assert_eq!(cache.get("/plants?null", 2), None);
    }

    #[test]
    fn late_response_is_not_cached() {
        let mut cache = ReadCache::default();
        cache.put("/users/me?null".into(), 1, 2, json!({"id": 1}));
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_by_resource_prefix() {
        let mut cache = ReadCache::default();
        cache.put("/task-masters?{}".into(), 1, 1, json!({}));
        cache.put("/task-instances/my-tasks?{}".into(), 1, 1, json!({}));
        cache.put("/plants?{}".into(), 1, 1, json!([]));
        cache.invalidate(&["/task-instances", "/task-masters"]);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("/plants?{}", 1).is_some());
    }
}
