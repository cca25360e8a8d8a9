//! Быстрый путь чтения: кэш в памяти перед SQLite.

use dashmap::DashMap;
use std::hash::Hash;

/// Конкурентный кэш записей. Источник истины всегда репозиторий.
pub struct Storage<K, V> {
    entries: DashMap<K, V>,
}

impl<K, V> Default for Storage<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<K, V> Storage<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn put(&self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_invalidate() {
        let storage: Storage<i64, String> = Storage::new();
        assert!(storage.get(&1).is_none());

        storage.put(1, "one".to_string());
        storage.put(1, "uno".to_string());
        assert_eq!(storage.get(&1).as_deref(), Some("uno"));

        storage.invalidate(&1);
        assert!(storage.get(&1).is_none());
    }
}
