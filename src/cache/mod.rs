pub mod keys;

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rand::Rng;

const TTL_JITTER_RATIO: f64 = 0.1;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Bounded-lifetime memoisation. Expired entries read as misses and are
/// dropped by `sweep`.
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    jitter: bool,
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            jitter: false,
        }
    }

    /// Spreads expiry by ±10% so entries written together don't all expire
    /// on the same sweep.
    pub fn with_jitter() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            jitter: true,
        }
    }

    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let ttl = if self.jitter { apply_ttl_jitter(ttl) } else { ttl };
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().insert(key, entry);
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        (entry.expires_at > Instant::now()).then(|| entry.value.clone())
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.write().remove(key).map(|entry| entry.value)
    }

    /// Drops expired entries and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn apply_ttl_jitter(ttl: Duration) -> Duration {
    let base_ms = ttl.as_millis() as f64;
    let mut rng = rand::rng();
    let factor = rng.random_range(1.0 - TTL_JITTER_RATIO..=1.0 + TTL_JITTER_RATIO);
    let jittered_ms = (base_ms * factor).round().max(1.0);
    Duration::from_millis(jittered_ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_miss() {
        let cache: TtlCache<String, u32> = TtlCache::new();
        cache.insert_with_ttl("a".into(), 1, Duration::from_secs(60));
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn test_expired_entries_miss_and_sweep() {
        let cache: TtlCache<&'static str, u32> = TtlCache::new();
        cache.insert_with_ttl("old", 1, Duration::ZERO);
        cache.insert_with_ttl("new", 2, Duration::from_secs(60));

        assert_eq!(cache.get(&"old"), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"new"), Some(2));
    }

    #[test]
    fn test_jitter_stays_within_ratio() {
        for _ in 0..100 {
            let ttl = apply_ttl_jitter(Duration::from_secs(100));
            assert!(ttl >= Duration::from_secs(90) && ttl <= Duration::from_secs(110));
        }
    }

    #[test]
    fn test_remove() {
        let cache: TtlCache<u8, &'static str> = TtlCache::with_jitter();
        cache.insert_with_ttl(1, "x", Duration::from_secs(5));
        assert_eq!(cache.remove(&1), Some("x"));
        assert!(cache.is_empty());
    }
}
