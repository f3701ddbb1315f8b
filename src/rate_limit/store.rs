use super::types::Window;
use crate::error::{Result, ServiceError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, error};

/// Concurrent identity -> window map.
///
/// Entries live in DashMap shards, so the check-and-increment for one
/// identity holds only that shard's write lock and unrelated identities in
/// other shards proceed in parallel. Only [`super::RateLimiter`] mutates it.
pub struct WindowStore {
    windows: DashMap<String, Window>,
    /// Soft cap on tracked identities; `None` means unbounded
    max_identities: Option<usize>,
}

impl WindowStore {
    /// Create an unbounded store
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
            max_identities: None,
        }
    }

    /// Create a store that refuses new identities beyond `max_identities`
    /// once expired windows have been swept
    pub fn with_max_identities(max_identities: usize) -> Self {
        Self {
            windows: DashMap::new(),
            max_identities: Some(max_identities),
        }
    }

    /// Run `apply` against the identity's window while holding its shard
    /// lock, creating the window with `open` if the identity is new.
    pub(crate) fn update<R>(
        &self,
        identity: &str,
        now: DateTime<Utc>,
        open: impl FnOnce() -> Window,
        apply: impl FnOnce(&mut Window) -> R,
    ) -> Result<R> {
        if let Some(mut window) = self.windows.get_mut(identity) {
            return Ok(apply(window.value_mut()));
        }

        // No shard lock may be held here: len() and retain() lock every shard.
        self.ensure_capacity(now)?;

        let mut window = self
            .windows
            .entry(identity.to_string())
            .or_insert_with(|| {
                debug!(identity = %identity, "Opening rate limit window");
                open()
            });
        Ok(apply(window.value_mut()))
    }

    /// Drop every window whose reset instant has passed.
    ///
    /// An expired window is treated as zero on the next request anyway, so
    /// removing it never changes a decision.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.windows.retain(|_, window| {
            let keep = !window.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Number of tracked identities
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    fn ensure_capacity(&self, now: DateTime<Utc>) -> Result<()> {
        let Some(max) = self.max_identities else {
            return Ok(());
        };
        if self.windows.len() < max {
            return Ok(());
        }

        let removed = self.sweep_expired(now);
        debug!(removed, "Swept expired windows at capacity");
        if self.windows.len() < max {
            return Ok(());
        }

        error!(max_identities = max, "Window store at capacity");
        Err(ServiceError::Store(format!(
            "window store at capacity ({} identities)",
            max
        )))
    }

    #[cfg(test)]
    pub(crate) fn peek(&self, identity: &str) -> Option<Window> {
        self.windows.get(identity).map(|w| *w.value())
    }
}

impl Default for WindowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::types::RateLimitPolicy;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_update_creates_window_lazily() {
        let store = WindowStore::new();
        let policy: RateLimitPolicy = "5-M".parse().unwrap();
        assert!(store.is_empty());

        let count = store
            .update("alice", t0(), || Window::open(&policy, t0()), |w| {
                w.count += 1;
                w.count
            })
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.peek("alice").unwrap().reset_at, t0() + Duration::minutes(1));
    }

    #[test]
    fn test_update_reuses_existing_window() {
        let store = WindowStore::new();
        let policy: RateLimitPolicy = "5-M".parse().unwrap();

        for _ in 0..3 {
            store
                .update("alice", t0(), || Window::open(&policy, t0()), |w| w.count += 1)
                .unwrap();
        }

        assert_eq!(store.len(), 1);
        assert_eq!(store.peek("alice").unwrap().count, 3);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let store = WindowStore::new();
        let short: RateLimitPolicy = "5-S".parse().unwrap();
        let long: RateLimitPolicy = "5-H".parse().unwrap();

        store
            .update("short", t0(), || Window::open(&short, t0()), |_| ())
            .unwrap();
        store
            .update("long", t0(), || Window::open(&long, t0()), |_| ())
            .unwrap();

        assert_eq!(store.sweep_expired(t0() + Duration::seconds(1)), 1);
        assert!(store.peek("short").is_none());
        assert!(store.peek("long").is_some());
    }

    #[test]
    fn test_capacity_rejects_new_identity_when_full() {
        let store = WindowStore::with_max_identities(2);
        let policy: RateLimitPolicy = "5-H".parse().unwrap();

        for id in ["a", "b"] {
            store
                .update(id, t0(), || Window::open(&policy, t0()), |_| ())
                .unwrap();
        }

        let result = store.update("c", t0(), || Window::open(&policy, t0()), |_| ());
        assert!(matches!(result, Err(ServiceError::Store(_))));

        // Known identities keep working at capacity
        assert!(store
            .update("a", t0(), || Window::open(&policy, t0()), |_| ())
            .is_ok());
    }

    #[test]
    fn test_capacity_frees_space_by_sweeping() {
        let store = WindowStore::with_max_identities(1);
        let policy: RateLimitPolicy = "5-S".parse().unwrap();

        store
            .update("a", t0(), || Window::open(&policy, t0()), |_| ())
            .unwrap();

        let later = t0() + Duration::seconds(2);
        assert!(store
            .update("b", later, || Window::open(&policy, later), |_| ())
            .is_ok());
        assert!(store.peek("a").is_none());
        assert_eq!(store.len(), 1);
    }
}
