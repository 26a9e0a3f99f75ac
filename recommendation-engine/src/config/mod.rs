use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{EngineError, Result};

/// Default feature-vector width. Item vectors define exactly this many
/// signal slots; wider vectors carry reserved zero slots.
pub const DEFAULT_FEATURE_LEN: usize = 10;

/// Number of non-share slots at the tail of a consumer vector
/// (engagement level, activity recency, jitter).
pub const CONSUMER_FIXED_SLOTS: usize = 3;

/// One entry of the configured category table. Table order defines the
/// category's slot position for index normalization and share features.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryWeight {
    pub slug: String,
    /// Static editorial weight in [0, 2]; 1.0 is neutral
    pub weight: f32,
}

/// Weight envelope for the heuristic fallback scorer. Each term's input is
/// already in [0, 1], so the weight is also that term's maximum contribution.
#[derive(Debug, Clone, Deserialize)]
pub struct HeuristicWeights {
    pub popularity: f32,
    pub recency: f32,
    pub featured: f32,
    pub affinity: f32,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        Self {
            popularity: 0.3,
            recency: 0.3,
            featured: 0.2,
            affinity: 0.2,
        }
    }
}

impl HeuristicWeights {
    fn validate(&self) -> Result<()> {
        let weights = [
            ("popularity", self.popularity),
            ("recency", self.recency),
            ("featured", self.featured),
            ("affinity", self.affinity),
        ];
        for (name, w) in weights {
            if !w.is_finite() || w < 0.0 {
                return Err(EngineError::InvalidConfiguration(format!(
                    "heuristic weight `{}` must be a non-negative number, got {}",
                    name, w
                )));
            }
        }
        let sum = self.popularity + self.recency + self.featured + self.affinity;
        if sum > 1.0 + f32::EPSILON {
            return Err(EngineError::InvalidConfiguration(format!(
                "heuristic weights must sum to at most 1.0, got {}",
                sum
            )));
        }
        Ok(())
    }
}

/// Engine configuration. Hosts either construct this directly and hand it to
/// `Engine::new`, or load it from the environment via `EngineConfig::from_env`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed feature-vector length for both item and consumer vectors
    pub feature_len: usize,
    /// Popularity counter value that maps to a 1.0 popularity feature
    pub popularity_ceiling: f32,
    /// Interaction count that maps to a 1.0 engagement feature
    pub engagement_ceiling: f32,
    /// Word count that maps to a 1.0 content-length feature
    pub content_length_ceiling: f32,
    /// Ordered category table (slot positions + static weights)
    pub categories: Vec<CategoryWeight>,
    pub heuristic: HeuristicWeights,
    /// Score above which a candidate is tagged "high relevance"
    pub high_relevance_threshold: f32,
    /// Popularity counter above which a candidate is tagged "popular"
    pub popular_threshold: u32,
    pub cache_ttl_secs: u64,
    /// Maximum concurrently scored chunks
    pub concurrency_limit: usize,
    /// Maximum candidates per scoring chunk
    pub max_batch_size: usize,
    /// Retained feedback events before FIFO eviction
    pub feedback_capacity: usize,
    /// Seed for the deterministic tie-break jitter
    pub jitter_seed: u64,
    /// Magnitude of the jitter term
    pub jitter_scale: f32,
    /// ONNX model location; None disables the model path entirely
    pub model_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            feature_len: DEFAULT_FEATURE_LEN,
            popularity_ceiling: 1000.0,
            engagement_ceiling: 50.0,
            content_length_ceiling: 2000.0,
            categories: Vec::new(),
            heuristic: HeuristicWeights::default(),
            high_relevance_threshold: 0.8,
            popular_threshold: 500,
            cache_ttl_secs: 300,
            concurrency_limit: 4,
            max_batch_size: 100,
            feedback_capacity: 1000,
            jitter_seed: 42,
            jitter_scale: 0.01,
            model_path: None,
        }
    }
}

/// Flat env-var view of the config, deserialized by envy with an `ENGINE_`
/// prefix (e.g. `ENGINE_FEATURE_LEN`, `ENGINE_MODEL_PATH`).
#[derive(Debug, Deserialize)]
struct RawEngineConfig {
    feature_len: Option<usize>,
    popularity_ceiling: Option<f32>,
    engagement_ceiling: Option<f32>,
    content_length_ceiling: Option<f32>,
    /// JSON array of `{"slug": ..., "weight": ...}` entries
    categories: Option<String>,
    heuristic_popularity_weight: Option<f32>,
    heuristic_recency_weight: Option<f32>,
    heuristic_featured_weight: Option<f32>,
    heuristic_affinity_weight: Option<f32>,
    high_relevance_threshold: Option<f32>,
    popular_threshold: Option<u32>,
    cache_ttl_secs: Option<u64>,
    concurrency_limit: Option<usize>,
    max_batch_size: Option<usize>,
    feedback_capacity: Option<usize>,
    jitter_seed: Option<u64>,
    jitter_scale: Option<f32>,
    model_path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let raw: RawEngineConfig = envy::prefixed("ENGINE_")
            .from_env()
            .map_err(|e| EngineError::InvalidConfiguration(e.to_string()))?;

        let mut config = EngineConfig::default();

        if let Some(v) = raw.feature_len {
            config.feature_len = v;
        }
        if let Some(v) = raw.popularity_ceiling {
            config.popularity_ceiling = v;
        }
        if let Some(v) = raw.engagement_ceiling {
            config.engagement_ceiling = v;
        }
        if let Some(v) = raw.content_length_ceiling {
            config.content_length_ceiling = v;
        }
        if let Some(json) = raw.categories {
            config.categories = serde_json::from_str(&json).map_err(|e| {
                EngineError::InvalidConfiguration(format!(
                    "ENGINE_CATEGORIES must be a JSON array of {{slug, weight}}: {}",
                    e
                ))
            })?;
        }
        if let Some(v) = raw.heuristic_popularity_weight {
            config.heuristic.popularity = v;
        }
        if let Some(v) = raw.heuristic_recency_weight {
            config.heuristic.recency = v;
        }
        if let Some(v) = raw.heuristic_featured_weight {
            config.heuristic.featured = v;
        }
        if let Some(v) = raw.heuristic_affinity_weight {
            config.heuristic.affinity = v;
        }
        if let Some(v) = raw.high_relevance_threshold {
            config.high_relevance_threshold = v;
        }
        if let Some(v) = raw.popular_threshold {
            config.popular_threshold = v;
        }
        if let Some(v) = raw.cache_ttl_secs {
            config.cache_ttl_secs = v;
        }
        if let Some(v) = raw.concurrency_limit {
            config.concurrency_limit = v;
        }
        if let Some(v) = raw.max_batch_size {
            config.max_batch_size = v;
        }
        if let Some(v) = raw.feedback_capacity {
            config.feedback_capacity = v;
        }
        if let Some(v) = raw.jitter_seed {
            config.jitter_seed = v;
        }
        if let Some(v) = raw.jitter_scale {
            config.jitter_scale = v;
        }
        config.model_path = raw.model_path.or(config.model_path);

        config.validate()?;
        Ok(config)
    }

    /// Construction-time validation. Violations are fatal (`InvalidConfiguration`).
    pub fn validate(&self) -> Result<()> {
        if self.feature_len < DEFAULT_FEATURE_LEN {
            return Err(EngineError::InvalidConfiguration(format!(
                "feature_len must be at least {} to hold all item signal slots, got {}",
                DEFAULT_FEATURE_LEN, self.feature_len
            )));
        }
        if self.popularity_ceiling <= 0.0 || !self.popularity_ceiling.is_finite() {
            return Err(EngineError::InvalidConfiguration(format!(
                "popularity_ceiling must be positive, got {}",
                self.popularity_ceiling
            )));
        }
        if self.engagement_ceiling <= 0.0 || !self.engagement_ceiling.is_finite() {
            return Err(EngineError::InvalidConfiguration(format!(
                "engagement_ceiling must be positive, got {}",
                self.engagement_ceiling
            )));
        }
        if self.content_length_ceiling <= 0.0 || !self.content_length_ceiling.is_finite() {
            return Err(EngineError::InvalidConfiguration(format!(
                "content_length_ceiling must be positive, got {}",
                self.content_length_ceiling
            )));
        }
        for entry in &self.categories {
            if !entry.weight.is_finite() || entry.weight < 0.0 {
                return Err(EngineError::InvalidConfiguration(format!(
                    "category `{}` weight must be a non-negative number, got {}",
                    entry.slug, entry.weight
                )));
            }
        }
        self.heuristic.validate()?;
        if !(0.0..=1.0).contains(&self.high_relevance_threshold) {
            return Err(EngineError::InvalidConfiguration(format!(
                "high_relevance_threshold must be within [0, 1], got {}",
                self.high_relevance_threshold
            )));
        }
        if self.cache_ttl_secs == 0 {
            return Err(EngineError::InvalidConfiguration(
                "cache_ttl_secs must be positive".to_string(),
            ));
        }
        if self.concurrency_limit == 0 {
            return Err(EngineError::InvalidConfiguration(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(EngineError::InvalidConfiguration(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.feedback_capacity == 0 {
            return Err(EngineError::InvalidConfiguration(
                "feedback_capacity must be at least 1".to_string(),
            ));
        }
        if !self.jitter_scale.is_finite() || self.jitter_scale < 0.0 || self.jitter_scale > 0.1 {
            return Err(EngineError::InvalidConfiguration(format!(
                "jitter_scale must be within [0, 0.1], got {}",
                self.jitter_scale
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_feature_len_too_small_rejected() {
        let config = EngineConfig {
            feature_len: 4,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_heuristic_weights_must_stay_an_envelope() {
        let config = EngineConfig {
            heuristic: HeuristicWeights {
                popularity: 0.6,
                recency: 0.6,
                featured: 0.2,
                affinity: 0.2,
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfiguration(_))
        ));

        let config = EngineConfig {
            heuristic: HeuristicWeights {
                popularity: -0.1,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = EngineConfig {
            concurrency_limit: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_category_table_weights_validated() {
        let config = EngineConfig {
            categories: vec![CategoryWeight {
                slug: "news".to_string(),
                weight: f32::NAN,
            }],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfiguration(_))
        ));
    }
}
