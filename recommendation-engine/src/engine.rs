/// Engine Orchestrator
///
/// Composes the pipeline: extract → score → diversify → cache → return.
/// The host constructs the engine explicitly, injects configuration, and
/// tears it down; there are no process-global singletons. `reconfigure`
/// swaps the whole inner state, which re-attempts model initialization and
/// releases the previous inference handle deterministically.

use chrono::Utc;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::models::{ConsumerProfile, ContentItem, FeedbackEvent, Recommendation};
use crate::services::{
    FeatureExtractor, FeedbackRecorder, QueryKey, RecommendationCache, ScoringEngine, Selector,
};
use crate::utils::stable_hash;

const ANONYMOUS_CONSUMER: &str = "anonymous";

struct EngineInner {
    config: EngineConfig,
    extractor: FeatureExtractor,
    scoring: ScoringEngine,
    selector: Selector,
}

impl EngineInner {
    fn build(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            extractor: FeatureExtractor::new(&config),
            scoring: ScoringEngine::new(&config),
            selector: Selector::new(&config),
            config,
        })
    }

    async fn recommend(
        &self,
        candidates: Vec<ContentItem>,
        profile: ConsumerProfile,
        min_count: usize,
        max_count: usize,
    ) -> Result<Recommendation> {
        let now = Utc::now();

        let consumer_features = self.extractor.extract_consumer_features(&profile, now);
        let pairs: Vec<_> = candidates
            .into_iter()
            .map(|item| {
                let features = self.extractor.extract_item_features(&item, now);
                (item, features)
            })
            .collect();

        let scored = self.scoring.score_candidates(&consumer_features, pairs).await;
        self.selector.select(scored, min_count, max_count, now)
    }
}

pub struct Engine {
    inner: RwLock<Arc<EngineInner>>,
    cache: RecommendationCache,
    feedback: FeedbackRecorder,
}

impl Engine {
    /// Construct the engine with an injected configuration. Configuration
    /// misuse is the one fatal error surface; a missing or broken model is
    /// not fatal and only disables the model scoring path.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let feedback_capacity = config.feedback_capacity;
        let inner = EngineInner::build(config)?;

        info!(
            model_loaded = inner.scoring.is_model_loaded(),
            feature_len = inner.config.feature_len,
            "Recommendation engine initialized"
        );

        Ok(Self {
            inner: RwLock::new(Arc::new(inner)),
            cache: RecommendationCache::new(),
            feedback: FeedbackRecorder::new(feedback_capacity),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(EngineConfig::from_env()?)
    }

    /// Replace the configuration wholesale. Re-attempts model
    /// initialization; the previous inner state (including any loaded
    /// inference handle) is dropped once in-flight passes finish, and the
    /// cache is cleared since cached output reflects the old settings.
    pub fn reconfigure(&self, config: EngineConfig) -> Result<()> {
        let fresh = Arc::new(EngineInner::build(config)?);

        {
            let mut guard = self
                .inner
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = fresh;
        }
        self.cache.clear();

        info!("Engine reconfigured, cache cleared");
        Ok(())
    }

    /// Explicit teardown for hosts that want a clean stop before drop.
    pub fn shutdown(&self) {
        self.cache.clear();
        info!(
            pending_feedback = self.feedback.len(),
            "Recommendation engine shut down"
        );
    }

    pub fn is_model_loaded(&self) -> bool {
        self.current_inner().scoring.is_model_loaded()
    }

    /// Score, diversify and bound the candidate pool for one consumer.
    /// Always yields a Recommendation (possibly heuristic-only or shorter
    /// than requested) unless the bounds themselves are invalid.
    pub async fn get_recommendations(
        &self,
        candidates: Vec<ContentItem>,
        profile: Option<&ConsumerProfile>,
        min_count: usize,
        max_count: usize,
    ) -> Result<Recommendation> {
        if max_count == 0 {
            return Err(EngineError::InvalidConfiguration(
                "max_count must be positive".to_string(),
            ));
        }
        if min_count > max_count {
            return Err(EngineError::InvalidConfiguration(format!(
                "min_count {} exceeds max_count {}",
                min_count, max_count
            )));
        }

        let inner = self.current_inner();
        let profile = profile.cloned().unwrap_or_default();

        let key = QueryKey {
            consumer: profile
                .consumer_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| ANONYMOUS_CONSUMER.to_string()),
            fingerprint: candidate_fingerprint(&candidates, min_count, max_count),
        };
        let ttl = Duration::from_secs(inner.config.cache_ttl_secs);

        debug!(
            consumer = %key.consumer,
            candidate_count = candidates.len(),
            min_count,
            max_count,
            "Recommendation request"
        );

        self.cache
            .get_or_compute(key, ttl, move || async move {
                inner
                    .recommend(candidates, profile, min_count, max_count)
                    .await
                    .map_err(anyhow::Error::from)
            })
            .await
    }

    /// Record a consumer reaction. Never fails and never touches the
    /// scoring path.
    pub fn submit_feedback(&self, consumer_id: Option<Uuid>, item_id: &str, accepted: bool) {
        self.feedback.record(FeedbackEvent {
            consumer_id,
            item_id: item_id.to_string(),
            accepted,
            occurred_at: Utc::now(),
        });
    }

    /// Hand up to `limit` recorded reactions to a retraining exporter.
    pub fn drain_feedback(&self, limit: usize) -> Vec<FeedbackEvent> {
        self.feedback.drain(limit)
    }

    fn current_inner(&self) -> Arc<EngineInner> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Order-insensitive fingerprint of the candidate pool. The requested
/// bounds are folded in so a bounds change is never served a cached result
/// of the wrong shape.
fn candidate_fingerprint(candidates: &[ContentItem], min_count: usize, max_count: usize) -> u64 {
    let mut ids: Vec<&str> = candidates.iter().map(|item| item.id.as_str()).collect();
    ids.sort_unstable();
    stable_hash(&(ids, min_count, max_count))
}
