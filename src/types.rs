use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Maximum number of (normalized) subject characters folded into a
/// content signature. Near-duplicate bulk sends differ only past the
/// subject prefix, so a short prefix is what makes them cache together.
const SIGNATURE_SUBJECT_CHARS: usize = 64;

/// Priority levels assigned by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// A classification result: priority plus an open-ended category label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub priority: Priority,
    pub category: String,
}

impl Classification {
    pub fn new(priority: Priority, category: impl Into<String>) -> Self {
        Self {
            priority,
            category: category.into(),
        }
    }

    /// Default classification for stale, never-opened items.
    pub fn archived() -> Self {
        Self::new(Priority::Low, "archive")
    }

    /// Default classification for recurring/bulk senders caught by keyword.
    pub fn bulk() -> Self {
        Self::new(Priority::Low, "bulk")
    }

    /// Map a learned action name onto a concrete classification.
    pub fn from_action(action: &str) -> Self {
        match action {
            "archive" => Self::new(Priority::Low, "archive"),
            "flag" => Self::new(Priority::High, "flagged"),
            other => Self::new(Priority::Medium, other),
        }
    }
}

/// Where an item's classification came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    #[default]
    Unset,
    Rule,
    Cache,
    External,
    Pattern,
}

/// A unit awaiting classification.
///
/// Created by an external ingestion collaborator; the pipeline only ever
/// sets `classification` and `source`. Deletion is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    /// The dimension patterns are learned over (e.g. a sender domain).
    pub entity_key: String,
    /// Normalized signature used as the cache key; see [`content_signature`].
    pub content_signature: String,
    /// Short human-readable descriptor (e.g. a subject line), used by the
    /// heuristic keyword rule alongside the entity key.
    pub descriptor: Option<String>,
    pub created_at: SystemTime,
    pub last_accessed: Option<SystemTime>,
    pub classification: Option<Classification>,
    #[serde(default)]
    pub source: ClassificationSource,
}

impl Item {
    pub fn new(
        id: impl Into<String>,
        entity_key: impl Into<String>,
        content_signature: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            entity_key: entity_key.into(),
            content_signature: content_signature.into(),
            descriptor: None,
            created_at: SystemTime::now(),
            last_accessed: None,
            classification: None,
            source: ClassificationSource::Unset,
        }
    }

    /// Time since the item was created, saturating to zero on clock skew.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.created_at).unwrap_or_default()
    }
}

/// Summary of one `process()` invocation. Not persisted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchRunResult {
    pub total: usize,
    pub resolved_by_rule: usize,
    pub resolved_by_cache: usize,
    pub sent_to_external: usize,
    pub external_calls_made: usize,
    pub failed: usize,
    /// Items never attempted because cancellation fired. Carry no error;
    /// the next run picks them up unchanged.
    pub cancelled: usize,
    pub duration: Duration,
}

/// Derive a content signature from a sender and subject.
///
/// Both fields are lowercased and whitespace-normalized; only the first
/// `SIGNATURE_SUBJECT_CHARS` characters of the subject participate, so
/// mail-merge variants of the same bulk send collapse to one signature.
pub fn content_signature(sender: &str, subject: &str) -> String {
    let sender = normalize(sender);
    let subject: String = normalize(subject)
        .chars()
        .take(SIGNATURE_SUBJECT_CHARS)
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(sender.as_bytes());
    hasher.update(b"|");
    hasher.update(subject.as_bytes());
    hex::encode(hasher.finalize())
}

fn normalize(s: &str) -> String {
    s.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_normalizes_case_and_whitespace() {
        let a = content_signature("News@Example.COM", "Weekly   Digest #42");
        let b = content_signature("news@example.com", "weekly digest #42");
        assert_eq!(a, b);
    }

    #[test]
    fn signature_ignores_subject_past_prefix() {
        let long_a = format!("{} trailing-variant-a", "x".repeat(80));
        let long_b = format!("{} trailing-variant-b", "x".repeat(80));
        assert_eq!(
            content_signature("s@d.com", &long_a),
            content_signature("s@d.com", &long_b),
        );
    }

    #[test]
    fn signature_distinguishes_senders() {
        assert_ne!(
            content_signature("a@one.com", "hello"),
            content_signature("a@two.com", "hello"),
        );
    }

    #[test]
    fn item_age_saturates_on_clock_skew() {
        let item = Item::new("i1", "example.com", "sig");
        let past = SystemTime::now() - Duration::from_secs(60);
        assert_eq!(item.age(past), Duration::ZERO);
    }

    #[test]
    fn from_action_maps_known_actions() {
        assert_eq!(Classification::from_action("archive").priority, Priority::Low);
        assert_eq!(Classification::from_action("flag").priority, Priority::High);
        let other = Classification::from_action("file_receipts");
        assert_eq!(other.priority, Priority::Medium);
        assert_eq!(other.category, "file_receipts");
    }
}
