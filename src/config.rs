use std::env;
use std::time::Duration;

use crate::error::SiftError;

/// Tunables for the triage pipeline.
///
/// `Default` carries the documented defaults; `from_env` layers `SIFT_*`
/// overrides on top. Invalid override values are logged and ignored rather
/// than failing startup; a typo in an env var must not take the pipeline
/// down.
#[derive(Debug, Clone)]
pub struct SiftConfig {
    /// Maximum classifier calls per sliding window.
    pub max_calls: usize,
    /// Sliding window for the rate limiter.
    pub window: Duration,
    /// Cache entry time-to-live.
    pub cache_ttl: Duration,
    /// Maximum items per classifier call.
    pub batch_size: usize,
    /// Confidence required before a pattern may auto-apply.
    pub auto_threshold: f64,
    /// Confirmations required before a pattern may auto-apply.
    pub min_confirmations: u64,
    /// Confidence required before a pattern is surfaced as a suggestion.
    pub suggest_threshold: f64,
    /// Age past which a never-accessed item is archived without classification.
    pub stale_after: Duration,
    /// Substrings marking recurring/bulk senders for the heuristic rule.
    pub bulk_keywords: Vec<String>,
}

impl Default for SiftConfig {
    fn default() -> Self {
        Self {
            max_calls: 30,
            window: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(3600),
            batch_size: 20,
            auto_threshold: 0.95,
            min_confirmations: 10,
            suggest_threshold: 0.5,
            stale_after: Duration::from_secs(7 * 24 * 3600),
            bulk_keywords: default_bulk_keywords(),
        }
    }
}

/// Known bulk/newsletter sender markers, matched case-insensitively
/// against the entity key or descriptor.
fn default_bulk_keywords() -> Vec<String> {
    [
        "noreply",
        "no-reply",
        "newsletter",
        "notifications",
        "promo",
        "beehiiv.com",
        "substack.com",
        "mailchimp.com",
        "sendgrid.net",
        "constantcontact.com",
        "hubspot.com",
        "sparkpost.com",
        "mailin.fr",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

impl SiftConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse::<usize>("SIFT_MAX_CALLS") {
            config.max_calls = v;
        }
        if let Some(v) = env_parse::<u64>("SIFT_WINDOW_SECS") {
            config.window = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("SIFT_CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<usize>("SIFT_BATCH_SIZE") {
            config.batch_size = v;
        }
        if let Some(v) = env_parse::<f64>("SIFT_AUTO_THRESHOLD") {
            config.auto_threshold = v;
        }
        if let Some(v) = env_parse::<u64>("SIFT_MIN_CONFIRMATIONS") {
            config.min_confirmations = v;
        }
        if let Some(v) = env_parse::<f64>("SIFT_SUGGEST_THRESHOLD") {
            config.suggest_threshold = v;
        }
        if let Some(v) = env_parse::<u64>("SIFT_STALE_DAYS") {
            config.stale_after = Duration::from_secs(v * 24 * 3600);
        }
        if let Ok(raw) = env::var("SIFT_BULK_KEYWORDS") {
            let keywords: Vec<String> = raw
                .split(',')
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
            if keywords.is_empty() {
                tracing::warn!("SIFT_BULK_KEYWORDS is empty, keeping defaults");
            } else {
                config.bulk_keywords = keywords;
            }
        }

        config
    }

    /// Reject configurations that would wedge or bypass the pipeline.
    pub fn validate(&self) -> Result<(), SiftError> {
        if self.max_calls == 0 {
            return Err(SiftError::Config("max_calls must be > 0".into()));
        }
        if self.window.is_zero() {
            return Err(SiftError::Config("window must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(SiftError::Config("batch_size must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.auto_threshold) {
            return Err(SiftError::Config(format!(
                "auto_threshold must be in [0, 1], got {}",
                self.auto_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.suggest_threshold) {
            return Err(SiftError::Config(format!(
                "suggest_threshold must be in [0, 1], got {}",
                self.suggest_threshold
            )));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("{key}={raw} is not valid, keeping default");
            None
        }
    }
}
