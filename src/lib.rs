//! Adaptive item triage.
//!
//! Classifies a stream of incoming items through an external, rate-limited,
//! pay-per-call classifier while learning from user confirmations so repeat
//! traffic gets resolved locally. The pieces, leaf-first:
//!
//! - [`RateLimiter`]: sliding-window bound on external calls
//! - [`CacheStore`]: TTL memoization keyed by content signature
//! - [`PatternStore`] / [`PatternLearner`]: confidence-scored
//!   (entity key, action) associations fed by confirm/reject feedback
//! - [`RuleEngine`]: ordered skip rules (pattern, stale, already
//!   classified, keyword heuristic)
//! - [`BatchProcessor`]: the `process(item_ids)` entry point tying the
//!   above together around an injected [`Classifier`] and [`ItemStore`]
//!
//! The feedback loop: `process` classifies what it must, a human confirms
//! or rejects the resulting actions via [`PatternLearner::record_feedback`],
//! and once a pattern reaches the auto-apply gate the rule engine resolves
//! matching items with no external call at all.

pub mod cache;
pub mod config;
pub mod error;
pub mod limiter;
pub mod patterns;
pub mod processor;
pub mod rules;
pub mod store;
pub mod types;

pub use cache::CacheStore;
pub use config::SiftConfig;
pub use error::SiftError;
pub use limiter::RateLimiter;
pub use patterns::{FeedbackEvent, FeedbackLog, Pattern, PatternLearner, PatternStore};
pub use processor::{BatchProcessor, Classifier};
pub use rules::{Decision, DecisionReason, RuleEngine};
pub use store::{ItemStore, MemoryItemStore};
pub use types::{
    BatchRunResult, Classification, ClassificationSource, Item, Priority, content_signature,
};
