use super::PrincipalName;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, trace, warn};

/// The identity of an accepted authenticator. No two accepted authenticators
/// may share this tuple while it is retained.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplayEntry {
    pub client: PrincipalName,
    pub client_realm: String,
    /// The authenticator ctime, including cusec.
    pub client_time: SystemTime,
    pub service: PrincipalName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStatus {
    Fresh,
    AlreadySeen,
}

#[derive(Debug)]
struct ReplayState {
    retention: Duration,
    maximum_clock_skew: Duration,
    entries: HashSet<ReplayEntry>,
}

impl ReplayState {
    /// An entry is retained until client_time + retention, and then for one
    /// more skew so a validation holding an earlier clock snapshot than the
    /// pruning caller still finds it.
    fn prune(&mut self, current_time: SystemTime) -> usize {
        let horizon = self.retention + self.maximum_clock_skew;
        let before = self.entries.len();
        self.entries.retain(|entry| {
            entry
                .client_time
                .checked_add(horizon)
                .map_or(true, |expiry| expiry >= current_time)
        });
        before - self.entries.len()
    }
}

/// Authenticators accepted within the retention window.
///
/// Retention is never shorter than the maximum clock skew: an authenticator
/// passes the skew check until client_time + skew, and must be remembered
/// for at least as long.
#[derive(Debug)]
pub struct ReplayCache {
    state: Mutex<ReplayState>,
}

impl ReplayCache {
    pub fn new(retention: Duration, maximum_clock_skew: Duration) -> Self {
        let retention = if retention < maximum_clock_skew {
            warn!(
                ?retention,
                ?maximum_clock_skew,
                "replay retention is shorter than the maximum clock skew, raising it"
            );
            maximum_clock_skew
        } else {
            retention
        };

        ReplayCache {
            state: Mutex::new(ReplayState {
                retention,
                maximum_clock_skew,
                entries: HashSet::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReplayState> {
        // The set is only ever inserted to or pruned, so it is still coherent
        // if a holder panicked.
        self.state.lock().unwrap_or_else(|poisoned| {
            error!("replay cache lock was poisoned");
            poisoned.into_inner()
        })
    }

    pub fn retention(&self) -> Duration {
        self.lock().retention
    }

    pub fn maximum_clock_skew(&self) -> Duration {
        self.lock().maximum_clock_skew
    }

    /// Widen the cache to cover a validator accepting up to
    /// `maximum_clock_skew`. Retention and the pruning margin only grow.
    pub fn cover_clock_skew(&self, maximum_clock_skew: Duration) {
        let mut state = self.lock();

        if state.maximum_clock_skew < maximum_clock_skew {
            state.maximum_clock_skew = maximum_clock_skew;
        }

        if state.retention < maximum_clock_skew {
            warn!(
                retention = ?state.retention,
                ?maximum_clock_skew,
                "replay retention is shorter than the validator clock skew, raising it"
            );
            state.retention = maximum_clock_skew;
        }
    }

    /// Atomically check whether the entry was seen, and record it if not.
    pub fn check_and_store(&self, entry: ReplayEntry, current_time: SystemTime) -> ReplayStatus {
        let mut state = self.lock();

        // Look up before pruning. Another caller's snapshot may be later than
        // ours, and must not decide that our entry is gone.
        if state.entries.contains(&entry) {
            debug!(client = %entry.client, service = %entry.service, "authenticator replayed");
            return ReplayStatus::AlreadySeen;
        }

        let purged = state.prune(current_time);
        if purged > 0 {
            trace!(purged, "replay cache pruned");
        }

        trace!(client = %entry.client, client_time = ?entry.client_time, "authenticator recorded");
        state.entries.insert(entry);
        ReplayStatus::Fresh
    }

    /// Forget every entry that has left the retention window.
    pub fn purge_expired(&self, current_time: SystemTime) -> usize {
        let mut state = self.lock();
        let purged = state.prune(current_time);
        if purged > 0 {
            debug!(purged, remaining = state.entries.len(), "replay cache purged");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{ReplayCache, ReplayEntry, ReplayStatus};
    use crate::proto::PrincipalName;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    fn entry(client: &str, client_time: SystemTime) -> ReplayEntry {
        ReplayEntry {
            client: client.parse().expect("Invalid client name"),
            client_realm: "EXAMPLE.COM".to_string(),
            client_time,
            service: PrincipalName::service("host", "server.example.com")
                .expect("Invalid service name"),
        }
    }

    #[test]
    fn replay_cache_detects_repeat() {
        let now = SystemTime::now();
        let cache = ReplayCache::new(Duration::from_secs(300), Duration::from_secs(300));

        assert_eq!(cache.check_and_store(entry("alice", now), now), ReplayStatus::Fresh);
        assert_eq!(
            cache.check_and_store(entry("alice", now), now),
            ReplayStatus::AlreadySeen
        );

        // Different client, or a different microsecond, is a different authenticator.
        assert_eq!(cache.check_and_store(entry("bob", now), now), ReplayStatus::Fresh);
        assert_eq!(
            cache.check_and_store(entry("alice", now + Duration::from_micros(1)), now),
            ReplayStatus::Fresh
        );
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn replay_cache_retention_is_clamped_to_skew() {
        let cache = ReplayCache::new(Duration::from_secs(10), Duration::from_secs(300));
        assert_eq!(cache.retention(), Duration::from_secs(300));

        let cache = ReplayCache::new(Duration::from_secs(600), Duration::from_secs(300));
        assert_eq!(cache.retention(), Duration::from_secs(600));
    }

    #[test]
    fn replay_cache_covers_a_wider_skew() {
        let cache = ReplayCache::new(Duration::from_secs(300), Duration::from_secs(300));

        cache.cover_clock_skew(Duration::from_secs(600));
        assert_eq!(cache.retention(), Duration::from_secs(600));
        assert_eq!(cache.maximum_clock_skew(), Duration::from_secs(600));

        // Never narrowed.
        cache.cover_clock_skew(Duration::from_secs(60));
        assert_eq!(cache.retention(), Duration::from_secs(600));
        assert_eq!(cache.maximum_clock_skew(), Duration::from_secs(600));
    }

    #[test]
    fn replay_cache_purges_expired() {
        let now = SystemTime::now();
        let retention = Duration::from_secs(300);
        let skew = Duration::from_secs(120);
        let cache = ReplayCache::new(retention, skew);

        assert_eq!(cache.check_and_store(entry("alice", now), now), ReplayStatus::Fresh);
        assert_eq!(cache.purge_expired(now + retention), 0);
        assert_eq!(cache.purge_expired(now + retention + skew), 0);
        assert_eq!(cache.len(), 1);

        assert_eq!(
            cache.purge_expired(now + retention + skew + Duration::from_secs(1)),
            1
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn replay_cache_later_snapshot_does_not_evict_replayable_entry() {
        let now = SystemTime::now();
        let window = Duration::from_secs(300);
        let cache = ReplayCache::new(window, window);

        // Oldest authenticator that still passes the skew check at `now`.
        let old = entry("alice", now - window);
        assert_eq!(cache.check_and_store(old.clone(), now), ReplayStatus::Fresh);

        // A caller with a slightly later clock stores something else.
        let later = now + Duration::from_micros(1);
        assert_eq!(
            cache.check_and_store(entry("bob", later), later),
            ReplayStatus::Fresh
        );

        // The first caller's clock still accepts the old authenticator.
        assert_eq!(cache.check_and_store(old, now), ReplayStatus::AlreadySeen);
    }

    #[test]
    fn replay_cache_concurrent_check_and_store() {
        let now = SystemTime::now();
        let cache = Arc::new(ReplayCache::new(
            Duration::from_secs(300),
            Duration::from_secs(300),
        ));

        let fresh = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let cache = cache.clone();
                    s.spawn(move || cache.check_and_store(entry("alice", now), now))
                })
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().expect("Thread panicked"))
                .filter(|status| *status == ReplayStatus::Fresh)
                .count()
        });

        assert_eq!(fresh, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn replay_cache_concurrent_pruning_keeps_entries() {
        let now = SystemTime::now();
        let window = Duration::from_secs(300);
        let cache = ReplayCache::new(window, window);

        let old = entry("alice", now - window);
        assert_eq!(cache.check_and_store(old.clone(), now), ReplayStatus::Fresh);

        // Other clients are recorded, and the cache purged, from threads whose
        // clocks run up to a full skew ahead.
        std::thread::scope(|s| {
            for i in 0..8u64 {
                let cache = &cache;
                s.spawn(move || {
                    let their_now = now + Duration::from_secs(i * 30);
                    let name = format!("client{i}");
                    cache.check_and_store(entry(&name, their_now), their_now);
                    cache.purge_expired(their_now);
                });
            }
        });

        assert_eq!(cache.check_and_store(old, now), ReplayStatus::AlreadySeen);
        assert_eq!(cache.len(), 9);
    }
}
