//! The feedback loop end to end: confirmations build confidence, the
//! auto-apply gate opens, the rule engine bypasses the classifier, and
//! rejections close the gate again. Also covers write-through log replay.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use sift::{
    BatchProcessor, Classification, ClassificationSource, Classifier, Item, MemoryItemStore,
    PatternLearner, PatternStore, Priority, SiftConfig, SiftError,
};

/// Counting classifier that classifies everything as medium/external.
#[derive(Default)]
struct CountingClassifier {
    calls: AtomicUsize,
}

impl CountingClassifier {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for CountingClassifier {
    async fn classify(&self, batch: &[Item]) -> Result<Vec<(String, Classification)>, SiftError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(batch
            .iter()
            .map(|i| (i.id.clone(), Classification::new(Priority::Medium, "external")))
            .collect())
    }
}

fn pipeline(
    patterns: Arc<PatternStore>,
) -> (BatchProcessor, Arc<MemoryItemStore>, Arc<CountingClassifier>) {
    let classifier = Arc::new(CountingClassifier::default());
    let store = Arc::new(MemoryItemStore::new());
    let processor = BatchProcessor::new(
        classifier.clone(),
        store.clone(),
        patterns,
        &SiftConfig::default(),
    );
    (processor, store, classifier)
}

#[tokio::test]
async fn ten_confirmations_open_the_auto_apply_gate() {
    let patterns = Arc::new(PatternStore::new(&SiftConfig::default()));
    let learner = PatternLearner::new(patterns.clone());
    let (processor, store, classifier) = pipeline(patterns.clone());

    // First ten items from X: each classified externally, each confirmed.
    for i in 0..10 {
        let id = format!("x-{i}");
        store.insert(Item::new(&id, "x.com", format!("sig-{id}")));
        processor.process(&[id]).await.unwrap();
        let p = learner.record_feedback("x.com", "archive", true).await.unwrap();
        assert_eq!(p.confidence, 1.0);
    }
    assert_eq!(classifier.calls(), 10);
    assert!(patterns.auto_pattern("x.com").is_some());

    // The eleventh item resolves by rule 1 with zero classifier calls.
    store.insert(Item::new("x-10", "x.com", "sig-x-10"));
    let run = processor.process(&["x-10".into()]).await.unwrap();

    assert_eq!(classifier.calls(), 10);
    assert_eq!(run.resolved_by_rule, 1);
    assert_eq!(run.external_calls_made, 0);

    let item = store.get("x-10").unwrap();
    assert_eq!(item.source, ClassificationSource::Pattern);
    assert_eq!(item.classification.unwrap().category, "archive");
}

#[tokio::test]
async fn rejections_close_the_gate_and_classification_resumes() {
    let patterns = Arc::new(PatternStore::new(&SiftConfig::default()));
    let learner = PatternLearner::new(patterns.clone());
    let (processor, store, classifier) = pipeline(patterns.clone());

    for _ in 0..10 {
        learner.record_feedback("x.com", "archive", true).await.unwrap();
    }
    assert!(patterns.auto_pattern("x.com").is_some());

    // One rejection drops confidence to 10/11, below 0.95. The gate closes.
    learner.record_feedback("x.com", "archive", false).await.unwrap();
    assert!(patterns.auto_pattern("x.com").is_none());

    store.insert(Item::new("x-next", "x.com", "sig-x-next"));
    let run = processor.process(&["x-next".into()]).await.unwrap();
    assert_eq!(classifier.calls(), 1);
    assert_eq!(run.sent_to_external, 1);
}

#[tokio::test]
async fn suggestions_surface_below_the_auto_gate() {
    let patterns = Arc::new(PatternStore::new(&SiftConfig::default()));
    let learner = PatternLearner::new(patterns.clone());

    // 3 confirms, 1 reject: confidence 0.75 is suggestable, not auto.
    for _ in 0..3 {
        learner.record_feedback("y.com", "flag", true).await.unwrap();
    }
    learner.record_feedback("y.com", "flag", false).await.unwrap();

    let suggested = learner.suggest("y.com").unwrap();
    assert_eq!(suggested.action, "flag");
    assert_eq!(suggested.confidence, 0.75);
    assert!(!suggested.auto_apply);
    assert!(patterns.auto_pattern("y.com").is_none());
}

#[tokio::test]
async fn learned_state_survives_restart_via_log_replay() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("feedback.jsonl");
    let config = SiftConfig::default();

    {
        let patterns = Arc::new(PatternStore::open(&config, log_path.clone()).await.unwrap());
        let learner = PatternLearner::new(patterns);
        for _ in 0..10 {
            learner.record_feedback("x.com", "archive", true).await.unwrap();
        }
    }

    // "Restart": a fresh store replays the log and the gate is still open.
    let patterns = Arc::new(PatternStore::open(&config, log_path).await.unwrap());
    let (processor, store, classifier) = pipeline(patterns.clone());
    store.insert(Item::new("x-0", "x.com", "sig-x-0"));

    let run = processor.process(&["x-0".into()]).await.unwrap();
    assert_eq!(classifier.calls(), 0);
    assert_eq!(run.resolved_by_rule, 1);
    assert_eq!(store.get("x-0").unwrap().source, ClassificationSource::Pattern);
}

#[tokio::test]
async fn competing_actions_auto_apply_the_stronger_one() {
    let patterns = Arc::new(PatternStore::new(&SiftConfig::default()));
    let learner = PatternLearner::new(patterns.clone());
    let (processor, store, _classifier) = pipeline(patterns.clone());

    // "archive" is perfect over 12 observations; "flag" is weaker.
    for _ in 0..12 {
        learner.record_feedback("z.com", "archive", true).await.unwrap();
    }
    for _ in 0..10 {
        learner.record_feedback("z.com", "flag", true).await.unwrap();
    }
    learner.record_feedback("z.com", "flag", false).await.unwrap();

    store.insert(Item::new("z-0", "z.com", "sig-z-0"));
    processor.process(&["z-0".into()]).await.unwrap();
    assert_eq!(store.get("z-0").unwrap().classification.unwrap().category, "archive");
}
