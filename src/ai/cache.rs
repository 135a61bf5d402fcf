//! Bounded caches owned by the AI client
//!
//! Synthesized speech is cached by voice and a SHA-256 of the normalized
//! text, so identical drills replayed in one process hit the service once.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

/// Fixed-capacity LRU cache shared across tasks
///
/// A capacity of zero disables caching entirely.
pub struct BoundedCache<K: Hash + Eq, V: Clone> {
    inner: Option<Arc<Mutex<LruCache<K, V>>>>,
}

impl<K: Hash + Eq, V: Clone> Clone for BoundedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    /// Create a cache holding at most `capacity` entries
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|cap| Arc::new(Mutex::new(LruCache::new(cap)))),
        }
    }

    /// Look up a value, marking it most recently used
    pub async fn get(&self, key: &K) -> Option<V> {
        let cache = self.inner.as_ref()?;
        cache.lock().await.get(key).cloned()
    }

    /// Insert a value, evicting the least recently used entry when full
    pub async fn put(&self, key: K, value: V) {
        if let Some(cache) = &self.inner {
            cache.lock().await.put(key, value);
        }
    }

    /// Number of cached entries
    pub async fn len(&self) -> usize {
        match &self.inner {
            Some(cache) => cache.lock().await.len(),
            None => 0,
        }
    }

    /// Whether the cache currently holds nothing
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Maximum number of entries (zero when disabled)
    pub async fn capacity(&self) -> usize {
        match &self.inner {
            Some(cache) => cache.lock().await.cap().get(),
            None => 0,
        }
    }
}

/// Cache key for synthesized speech
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpeechKey {
    voice: String,
    text_hash: [u8; 32],
}

impl SpeechKey {
    /// Build a key from a voice and raw text
    #[must_use]
    pub fn new(voice: &str, text: &str) -> Self {
        let digest = Sha256::digest(normalize_text(text).as_bytes());
        Self {
            voice: voice.to_string(),
            text_hash: digest.into(),
        }
    }

    /// Hex form of the text hash, for logging
    #[must_use]
    pub fn text_hash_hex(&self) -> String {
        hex::encode(&self.text_hash[..8])
    }
}

/// Cache of raw synthesized PCM bytes
pub type SpeechCache = BoundedCache<SpeechKey, Arc<[u8]>>;

/// Normalize text before hashing: trim and collapse internal whitespace
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  hola   mundo \n"), "hola mundo");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_speech_key_ignores_whitespace_but_not_voice() {
        assert_eq!(SpeechKey::new("Kore", "hola  mundo"), SpeechKey::new("Kore", " hola mundo"));
        assert_ne!(SpeechKey::new("Kore", "hola"), SpeechKey::new("Puck", "hola"));
        assert_ne!(SpeechKey::new("Kore", "hola"), SpeechKey::new("Kore", "Hola"));
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache: BoundedCache<String, u32> = BoundedCache::new(2);
        cache.put("a".into(), 1).await;
        cache.put("b".into(), 2).await;
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));

        // "b" is now least recently used
        cache.put("c".into(), 3).await;
        assert_eq!(cache.get(&"b".to_string()).await, None);
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.capacity().await, 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_disables() {
        let cache: BoundedCache<String, u32> = BoundedCache::new(0);
        cache.put("a".into(), 1).await;
        assert!(cache.get(&"a".to_string()).await.is_none());
        assert!(cache.is_empty().await);
    }
}
