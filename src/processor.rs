use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheStore;
use crate::config::SiftConfig;
use crate::error::SiftError;
use crate::limiter::RateLimiter;
use crate::patterns::PatternStore;
use crate::rules::RuleEngine;
use crate::store::ItemStore;
use crate::types::{BatchRunResult, Classification, ClassificationSource, Item};

/// The external classification capability, injected by the caller.
///
/// `classify` may fail per call; the processor retries at batch
/// granularity on a later run, never per item and never in-run.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, batch: &[Item]) -> Result<Vec<(String, Classification)>, SiftError>;
}

/// Orchestrates one triage run over a queue of item ids.
///
/// Pipeline per run: rule partition, then cache lookup, then grouping by
/// entity key into size-capped batches, then limiter-gated classifier
/// calls with write-back.
/// Batches within a run are sequential; concurrent runs over disjoint
/// item sets are safe and contend only on the shared limiter, cache and
/// pattern store.
pub struct BatchProcessor {
    classifier: Arc<dyn Classifier>,
    items: Arc<dyn ItemStore>,
    patterns: Arc<PatternStore>,
    limiter: Arc<RateLimiter>,
    cache: Arc<CacheStore>,
    rules: RuleEngine,
    batch_size: usize,
}

impl BatchProcessor {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        items: Arc<dyn ItemStore>,
        patterns: Arc<PatternStore>,
        config: &SiftConfig,
    ) -> Self {
        Self {
            classifier,
            items,
            patterns,
            limiter: Arc::new(RateLimiter::new(config.max_calls, config.window)),
            cache: Arc::new(CacheStore::new(config.cache_ttl)),
            rules: RuleEngine::new(config),
            batch_size: config.batch_size,
        }
    }

    /// Share a limiter across processors. Required when multiple
    /// processors in one process draw on the same external quota.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Share a cache across processors.
    pub fn with_cache(mut self, cache: Arc<CacheStore>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Process a queue of item ids to completion.
    pub async fn process(&self, item_ids: &[String]) -> Result<BatchRunResult, SiftError> {
        self.process_with_cancel(item_ids, &CancellationToken::new())
            .await
    }

    /// Like [`process`](Self::process), but stops submitting new batches
    /// once `cancel` fires. The in-flight batch always completes so item
    /// and cache writes stay consistent.
    pub async fn process_with_cancel(
        &self,
        item_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<BatchRunResult, SiftError> {
        let start = Instant::now();
        let now = SystemTime::now();
        let mut run = BatchRunResult {
            total: item_ids.len(),
            ..Default::default()
        };

        let loaded = self.items.load(item_ids).await?;
        if loaded.len() < item_ids.len() {
            let missing = item_ids.len() - loaded.len();
            tracing::warn!(missing, "item store returned fewer items than requested");
            run.failed += missing;
        }

        // Rule partition, then cache lookup for whatever the rules left.
        let mut pending: Vec<Item> = Vec::new();
        for mut item in loaded {
            let decision = self.rules.decide(&item, &self.patterns, now);
            if decision.skip {
                run.resolved_by_rule += 1;
                if let Some(classification) = decision.classification {
                    item.classification = Some(classification);
                    item.source = decision.source;
                    self.items.save(&item).await?;
                }
                continue;
            }

            if let Some(classification) = self.cache.get(&item.content_signature) {
                item.classification = Some(classification);
                item.source = ClassificationSource::Cache;
                self.items.save(&item).await?;
                run.resolved_by_cache += 1;
                continue;
            }

            pending.push(item);
        }

        // Group by entity key; locality improves batch classification
        // quality. Sorted keys make batch order deterministic.
        let mut groups: BTreeMap<String, Vec<Item>> = BTreeMap::new();
        for item in pending {
            groups.entry(item.entity_key.clone()).or_default().push(item);
        }

        let mut batches: Vec<Vec<Item>> = Vec::new();
        for group in groups.into_values() {
            for chunk in group.chunks(self.batch_size) {
                batches.push(chunk.to_vec());
            }
        }

        for (idx, batch) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                run.cancelled += batches[idx..].iter().map(Vec::len).sum::<usize>();
                tracing::info!(
                    batches_remaining = batches.len() - idx,
                    "cancellation requested, stopping batch submission"
                );
                break;
            }

            self.limiter.acquire().await;
            run.external_calls_made += 1;
            run.sent_to_external += batch.len();

            match self.classifier.classify(batch).await {
                Ok(results) => match map_response(batch, results) {
                    Ok(by_id) => self.apply_batch(batch, by_id, &mut run).await?,
                    Err(e) => {
                        // Never guess an assignment; fail the whole batch.
                        tracing::error!(
                            entity_key = batch[0].entity_key,
                            batch_size = batch.len(),
                            "{e}"
                        );
                        run.failed += batch.len();
                    }
                },
                Err(e) => {
                    // Partial-failure isolation: one bad batch must not
                    // abort the run. The next run retries these items.
                    tracing::warn!(
                        entity_key = batch[0].entity_key,
                        batch_size = batch.len(),
                        retryable = e.is_retryable(),
                        "classifier batch failed: {e}"
                    );
                    run.failed += batch.len();
                }
            }
        }

        run.duration = start.elapsed();
        tracing::info!(
            total = run.total,
            resolved_by_rule = run.resolved_by_rule,
            resolved_by_cache = run.resolved_by_cache,
            sent_to_external = run.sent_to_external,
            external_calls_made = run.external_calls_made,
            failed = run.failed,
            cancelled = run.cancelled,
            duration_ms = run.duration.as_millis() as u64,
            "batch run complete"
        );
        Ok(run)
    }

    /// Write back one successfully mapped batch: each classified item is
    /// saved and cached; items the response omitted count as failed.
    async fn apply_batch(
        &self,
        batch: &[Item],
        mut by_id: HashMap<String, Classification>,
        run: &mut BatchRunResult,
    ) -> Result<(), SiftError> {
        for item in batch {
            match by_id.remove(&item.id) {
                Some(classification) => {
                    self.cache
                        .set(item.content_signature.clone(), classification.clone());
                    let mut item = item.clone();
                    item.classification = Some(classification);
                    item.source = ClassificationSource::External;
                    self.items.save(&item).await?;
                }
                None => {
                    tracing::warn!(item = item.id, "classifier response omitted item");
                    run.failed += 1;
                }
            }
        }
        Ok(())
    }
}

/// Validate a classifier response against the submitted batch. An id that
/// was never submitted means the mapping is untrustworthy and the whole
/// batch must be failed.
fn map_response(
    batch: &[Item],
    results: Vec<(String, Classification)>,
) -> Result<HashMap<String, Classification>, SiftError> {
    let submitted: HashSet<&str> = batch.iter().map(|i| i.id.as_str()).collect();
    let mut by_id = HashMap::with_capacity(results.len());
    for (id, classification) in results {
        if !submitted.contains(id.as_str()) {
            return Err(SiftError::MalformedResponse(format!(
                "response contains unknown item id {id:?}"
            )));
        }
        by_id.insert(id, classification);
    }
    Ok(by_id)
}
