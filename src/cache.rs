//! Byte-bounded LRU cache of synthesized audio
//!
//! Entries never expire; the cache only bounds memory. Losing an entry costs
//! a network or synthesis round trip, never correctness.

use crate::speech::{AudioAsset, BackendId};
use log::debug;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};

/// Cache key: SHA-256 of (text, voice profile, backend)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn new(text: &str, voice_profile: &str, backend: BackendId) -> Self {
        let mut hasher = Sha256::new();
        // Length prefixes keep ("ab", "c") and ("a", "bc") apart
        for part in [text, voice_profile, backend.as_str()] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        Self(hasher.finalize().into())
    }
}

pub struct AssetCache {
    entries: HashMap<CacheKey, AudioAsset>,
    /// Least recently used at the front
    order: VecDeque<CacheKey>,
    used_bytes: usize,
    max_bytes: usize,
}

impl AssetCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            used_bytes: 0,
            max_bytes,
        }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<AudioAsset> {
        let asset = self.entries.get(key)?.clone();
        self.touch(key);
        Some(asset)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Store an asset, evicting least recently used entries to fit
    ///
    /// Assets larger than the whole budget are not stored.
    pub fn insert(&mut self, key: CacheKey, asset: AudioAsset) {
        let size = asset.len();
        if size == 0 || size > self.max_bytes {
            debug!(
                "Not caching {} byte asset (budget {} bytes)",
                size, self.max_bytes
            );
            return;
        }

        if let Some(previous) = self.entries.remove(&key) {
            self.used_bytes -= previous.len();
            self.order.retain(|k| k != &key);
        }

        while self.used_bytes + size > self.max_bytes {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.used_bytes -= evicted.len();
                debug!("Evicted {} byte {} asset", evicted.len(), evicted.backend);
            }
        }

        self.used_bytes += size;
        self.entries.insert(key, asset);
        self.order.push_back(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.used_bytes = 0;
    }

    fn touch(&mut self, key: &CacheKey) {
        if let Some(position) = self.order.iter().position(|k| k == key) {
            self.order.remove(position);
            self.order.push_back(*key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(len: usize) -> AudioAsset {
        AudioAsset::new(BackendId::Remote, vec![1u8; len])
    }

    fn key(text: &str) -> CacheKey {
        CacheKey::new(text, "default", BackendId::Remote)
    }

    #[test]
    fn test_key_distinguishes_fields() {
        assert_ne!(key("hello"), CacheKey::new("hello", "en-gb", BackendId::Remote));
        assert_ne!(key("hello"), CacheKey::new("hello", "default", BackendId::Tone));
        assert_ne!(
            CacheKey::new("ab", "c", BackendId::Remote),
            CacheKey::new("a", "bc", BackendId::Remote)
        );
        assert_eq!(key("hello"), key("hello"));
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = AssetCache::new(30);
        cache.insert(key("a"), asset(10));
        cache.insert(key("b"), asset(10));
        cache.insert(key("c"), asset(10));

        // Touch "a" so "b" becomes the oldest
        assert!(cache.get(&key("a")).is_some());
        cache.insert(key("d"), asset(10));

        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
        assert!(cache.contains(&key("d")));
        assert_eq!(cache.used_bytes(), 30);
    }

    #[test]
    fn test_oversized_asset_not_stored() {
        let mut cache = AssetCache::new(8);
        cache.insert(key("big"), asset(9));
        assert!(cache.is_empty());
        assert_eq!(cache.used_bytes(), 0);
    }

    #[test]
    fn test_replacing_entry_updates_size() {
        let mut cache = AssetCache::new(100);
        cache.insert(key("a"), asset(40));
        cache.insert(key("a"), asset(10));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.used_bytes(), 10);
    }

    #[test]
    fn test_large_insert_evicts_several() {
        let mut cache = AssetCache::new(30);
        cache.insert(key("a"), asset(10));
        cache.insert(key("b"), asset(10));
        cache.insert(key("c"), asset(25));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&key("c")));
    }
}
