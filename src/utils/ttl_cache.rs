use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Ограниченный по размеру кэш с временем жизни записей.
///
/// Срок жизни проверяется при чтении: просроченная запись удаляется и считается
/// отсутствующей. Фонового потока очистки нет. При переполнении вытесняется
/// самая старая запись.
pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    capacity: usize,
    ttl: Duration,
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        {
            let entry = self.entries.get(key)?;
            if !self.is_expired(&entry, now) {
                return Some(entry.value.clone());
            }
        }
        // Ссылка на запись уже отпущена, иначе remove заблокируется на шарде
        self.entries
            .remove_if(key, |_, entry| self.is_expired(entry, now));
        None
    }

    fn is_expired(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) > self.ttl
    }

    fn insert_at(&self, key: K, value: V, now: Instant) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().inserted_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn remove(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
