use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::Classification;

struct CacheEntry {
    classification: Classification,
    inserted_at: Instant,
}

/// Short-lived memoization of classification results keyed by content
/// signature.
///
/// Purely advisory: a miss (including any internal failure) falls through
/// to the classifier path, so the cache is never a correctness dependency
/// and does not survive process restarts. Expired entries are evicted
/// lazily on `get`; long-running processes can call `sweep` to bound
/// memory.
pub struct CacheStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl CacheStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a signature. Expired entries are treated as absent and
    /// evicted as a side effect.
    pub fn get(&self, signature: &str) -> Option<Classification> {
        let mut entries = match self.entries.lock() {
            Ok(g) => g,
            Err(_) => {
                // Poisoned lock: a panic mid-insert. Degrade to a miss.
                tracing::warn!("cache lock poisoned, treating lookup as miss");
                return None;
            }
        };

        match entries.get(signature) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                Some(entry.classification.clone())
            }
            Some(_) => {
                entries.remove(signature);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, signature: impl Into<String>, classification: Classification) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                signature.into(),
                CacheEntry {
                    classification,
                    inserted_at: Instant::now(),
                },
            );
        } else {
            tracing::warn!("cache lock poisoned, dropping write");
        }
    }

    /// Remove all expired entries. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            tracing::warn!("cache lock poisoned, skipping sweep");
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, e| e.inserted_at.elapsed() < self.ttl);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = entries.len(), "cache sweep");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
