//! Learned (entity key, action) associations with confidence statistics.
//!
//! `PatternStore` keeps one counter record per `(entity_key, action)` pair
//! behind a per-key lock: the outer map lock is held only long enough to
//! fetch or insert the record, and the read-modify-write runs under the
//! key's own lock, so concurrent feedback on different keys does not
//! serialize. Durability comes from a write-through JSONL log replayed on
//! open.

mod log;

pub use log::{FeedbackEvent, FeedbackLog};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::config::SiftConfig;
use crate::error::SiftError;

type PatternKey = (String, String);
type PatternCell = Arc<Mutex<Pattern>>;

/// Confidence record for one `(entity_key, action)` pair.
///
/// Invariants: `times_confirmed <= times_seen`; `confidence` is
/// `times_confirmed / times_seen` (0 when nothing seen); `auto_apply` is
/// true iff confidence meets the auto threshold AND confirmations meet
/// the minimum. Rejections can toggle `auto_apply` back off.
#[derive(Debug, Clone, Serialize)]
pub struct Pattern {
    pub entity_key: String,
    pub action: String,
    pub times_seen: u64,
    pub times_confirmed: u64,
    pub confidence: f64,
    pub auto_apply: bool,
}

impl Pattern {
    fn new(entity_key: String, action: String) -> Self {
        Self {
            entity_key,
            action,
            times_seen: 0,
            times_confirmed: 0,
            confidence: 0.0,
            auto_apply: false,
        }
    }

    pub fn times_rejected(&self) -> u64 {
        self.times_seen - self.times_confirmed
    }

    fn apply(&mut self, confirmed: bool, auto_threshold: f64, min_confirmations: u64) {
        self.times_seen += 1;
        if confirmed {
            self.times_confirmed += 1;
        }
        self.confidence = self.times_confirmed as f64 / self.times_seen as f64;
        self.auto_apply =
            self.confidence >= auto_threshold && self.times_confirmed >= min_confirmations;
    }
}

/// Durable, concurrently-updatable pattern counters.
pub struct PatternStore {
    auto_threshold: f64,
    min_confirmations: u64,
    suggest_threshold: f64,
    patterns: Mutex<HashMap<PatternKey, PatternCell>>,
    log: Option<FeedbackLog>,
}

impl PatternStore {
    /// In-memory store without durability (tests, embedders that persist
    /// elsewhere).
    pub fn new(config: &SiftConfig) -> Self {
        Self {
            auto_threshold: config.auto_threshold,
            min_confirmations: config.min_confirmations,
            suggest_threshold: config.suggest_threshold,
            patterns: Mutex::new(HashMap::new()),
            log: None,
        }
    }

    /// Open a store backed by a write-through log, replaying any existing
    /// events to rebuild counters.
    pub async fn open(config: &SiftConfig, log_path: PathBuf) -> Result<Self, SiftError> {
        let store = Self::new(config);
        let events = FeedbackLog::replay(&log_path).await?;
        let replayed = events.len();
        for event in events {
            store.apply_feedback(&event.entity_key, &event.action, event.confirmed);
        }
        if replayed > 0 {
            tracing::info!(events = replayed, path = %log_path.display(), "pattern store replayed feedback log");
        }

        Ok(Self {
            log: Some(FeedbackLog::new(log_path)),
            ..store
        })
    }

    /// Record one confirm/reject observation: append to the log (if any),
    /// then update the counter under the per-key lock. Returns the updated
    /// record.
    pub async fn record_feedback(
        &self,
        entity_key: &str,
        action: &str,
        confirmed: bool,
    ) -> Result<Pattern, SiftError> {
        if let Some(log) = &self.log {
            log.append(&FeedbackEvent::now(entity_key, action, confirmed))
                .await?;
        }
        Ok(self.apply_feedback(entity_key, action, confirmed))
    }

    fn apply_feedback(&self, entity_key: &str, action: &str, confirmed: bool) -> Pattern {
        let cell = {
            let mut patterns = lock_recover(&self.patterns);
            patterns
                .entry((entity_key.to_string(), action.to_string()))
                .or_insert_with(|| {
                    Arc::new(Mutex::new(Pattern::new(
                        entity_key.to_string(),
                        action.to_string(),
                    )))
                })
                .clone()
        };

        let mut pattern = lock_recover(&cell);
        pattern.apply(confirmed, self.auto_threshold, self.min_confirmations);
        pattern.clone()
    }

    /// The pattern for `(entity_key, action)`, if any feedback exists.
    pub fn get(&self, entity_key: &str, action: &str) -> Option<Pattern> {
        let cell = lock_recover(&self.patterns)
            .get(&(entity_key.to_string(), action.to_string()))
            .cloned()?;
        let snapshot = lock_recover(&cell).clone();
        Some(snapshot)
    }

    /// Highest-confidence pattern for the key above the suggest threshold.
    /// Non-authoritative: UI surfaces use this, the rule engine does not.
    pub fn suggest(&self, entity_key: &str) -> Option<Pattern> {
        self.best_for(entity_key, |p| p.confidence >= self.suggest_threshold)
    }

    /// Highest-confidence auto-applying pattern for the key. This is the
    /// authoritative path the rule engine consults.
    pub fn auto_pattern(&self, entity_key: &str) -> Option<Pattern> {
        self.best_for(entity_key, |p| p.auto_apply)
    }

    /// Snapshot of all patterns, for observability surfaces.
    pub fn snapshot(&self) -> Vec<Pattern> {
        let cells: Vec<PatternCell> = lock_recover(&self.patterns).values().cloned().collect();
        cells
            .into_iter()
            .map(|cell| lock_recover(&cell).clone())
            .collect()
    }

    fn best_for(&self, entity_key: &str, keep: impl Fn(&Pattern) -> bool) -> Option<Pattern> {
        let cells: Vec<PatternCell> = {
            let patterns = lock_recover(&self.patterns);
            patterns
                .iter()
                .filter(|((key, _), _)| key.as_str() == entity_key)
                .map(|(_, cell)| cell.clone())
                .collect()
        };

        cells
            .into_iter()
            .map(|cell| lock_recover(&cell).clone())
            .filter(|p| p.times_seen > 0 && keep(p))
            // Ties on confidence break toward the better-evidenced pattern.
            .max_by(|a, b| {
                a.confidence
                    .total_cmp(&b.confidence)
                    .then(a.times_confirmed.cmp(&b.times_confirmed))
            })
    }
}

/// Consumes user confirm/reject feedback and surfaces suggestions.
/// Thin facade over [`PatternStore`] matching the capability exposed to
/// the approval/UI layer.
pub struct PatternLearner {
    store: Arc<PatternStore>,
}

impl PatternLearner {
    pub fn new(store: Arc<PatternStore>) -> Self {
        Self { store }
    }

    pub async fn record_feedback(
        &self,
        entity_key: &str,
        action: &str,
        confirmed: bool,
    ) -> Result<Pattern, SiftError> {
        let pattern = self.store.record_feedback(entity_key, action, confirmed).await?;
        tracing::debug!(
            entity_key,
            action,
            confirmed,
            confidence = pattern.confidence,
            auto_apply = pattern.auto_apply,
            "feedback recorded"
        );
        Ok(pattern)
    }

    pub fn suggest(&self, entity_key: &str) -> Option<Pattern> {
        self.store.suggest(entity_key)
    }
}

/// Lock a mutex, recovering the data on poisoning. Counter updates are
/// plain increments, so state behind a poisoned lock is still coherent.
fn lock_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
