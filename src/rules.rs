use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::config::SiftConfig;
use crate::patterns::PatternStore;
use crate::types::{Classification, ClassificationSource, Item};

/// Diagnostic label explaining why an item skipped classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Pattern,
    Stale,
    AlreadyClassified,
    Heuristic,
    NeedsClassification,
}

impl DecisionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Stale => "stale",
            Self::AlreadyClassified => "already_classified",
            Self::Heuristic => "heuristic",
            Self::NeedsClassification => "needs_classification",
        }
    }
}

/// Outcome of running the rule table against one item.
#[derive(Debug, Clone)]
pub struct Decision {
    pub skip: bool,
    /// New classification to apply, when a rule produced one. Absent for
    /// `already_classified` (nothing to write) and for non-skips.
    pub classification: Option<Classification>,
    pub source: ClassificationSource,
    pub reason: DecisionReason,
}

impl Decision {
    fn needs_classification() -> Self {
        Self {
            skip: false,
            classification: None,
            source: ClassificationSource::Unset,
            reason: DecisionReason::NeedsClassification,
        }
    }
}

type Rule = fn(&RuleEngine, &Item, &PatternStore, SystemTime) -> Option<Decision>;

/// Ordered policy table, first match wins. Cheapest, most confident
/// signals come first; keyword heuristics are last because they are the
/// weakest signal and must never override a learned pattern.
const RULES: &[Rule] = &[
    RuleEngine::pattern_rule,
    RuleEngine::stale_rule,
    RuleEngine::already_classified_rule,
    RuleEngine::heuristic_rule,
];

/// Decides, per item, whether the external classifier can be skipped.
pub struct RuleEngine {
    stale_after: Duration,
    bulk_keywords: Vec<String>,
}

impl RuleEngine {
    pub fn new(config: &SiftConfig) -> Self {
        Self {
            stale_after: config.stale_after,
            bulk_keywords: config
                .bulk_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    pub fn decide(&self, item: &Item, patterns: &PatternStore, now: SystemTime) -> Decision {
        for rule in RULES {
            if let Some(decision) = rule(self, item, patterns, now) {
                tracing::debug!(
                    item = item.id,
                    reason = decision.reason.as_str(),
                    "rule engine skip"
                );
                return decision;
            }
        }
        Decision::needs_classification()
    }

    /// Rule 1: an auto-applying learned pattern resolves the item.
    fn pattern_rule(
        &self,
        item: &Item,
        patterns: &PatternStore,
        _now: SystemTime,
    ) -> Option<Decision> {
        let pattern = patterns.auto_pattern(&item.entity_key)?;
        Some(Decision {
            skip: true,
            classification: Some(Classification::from_action(&pattern.action)),
            source: ClassificationSource::Pattern,
            reason: DecisionReason::Pattern,
        })
    }

    /// Rule 2: old and never opened, archive without asking anyone.
    fn stale_rule(&self, item: &Item, _patterns: &PatternStore, now: SystemTime) -> Option<Decision> {
        if item.age(now) > self.stale_after && item.last_accessed.is_none() {
            Some(Decision {
                skip: true,
                classification: Some(Classification::archived()),
                source: ClassificationSource::Rule,
                reason: DecisionReason::Stale,
            })
        } else {
            None
        }
    }

    /// Rule 3: already classified, nothing to do. This is what makes
    /// reprocessing idempotent.
    fn already_classified_rule(
        &self,
        item: &Item,
        _patterns: &PatternStore,
        _now: SystemTime,
    ) -> Option<Decision> {
        item.classification.as_ref()?;
        Some(Decision {
            skip: true,
            classification: None,
            source: ClassificationSource::Rule,
            reason: DecisionReason::AlreadyClassified,
        })
    }

    /// Rule 4: recurring/bulk sender markers in the entity key or descriptor.
    fn heuristic_rule(
        &self,
        item: &Item,
        _patterns: &PatternStore,
        _now: SystemTime,
    ) -> Option<Decision> {
        let entity = item.entity_key.to_lowercase();
        let descriptor = item.descriptor.as_deref().unwrap_or("").to_lowercase();
        let matched = self
            .bulk_keywords
            .iter()
            .any(|k| entity.contains(k) || descriptor.contains(k));
        if matched {
            Some(Decision {
                skip: true,
                classification: Some(Classification::bulk()),
                source: ClassificationSource::Rule,
                reason: DecisionReason::Heuristic,
            })
        } else {
            None
        }
    }
}
