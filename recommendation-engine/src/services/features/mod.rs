// ============================================
// Feature Extraction Module
// ============================================
// Pure derivation of fixed-width feature vectors from content items and
// consumer interaction histories. The pass timestamp is injected so the
// same inputs always produce the same vectors.

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tracing::debug;

use crate::config::{CategoryWeight, EngineConfig, CONSUMER_FIXED_SLOTS};
use crate::models::{ConsumerProfile, ContentItem, FeatureVector};
use crate::utils::{exponential_decay, normalize_ratio, stable_hash};

// Item vector slot layout. Slots past SLOT_JITTER are reserved zeros when
// the configured width exceeds the defined signals.
pub const SLOT_POPULARITY: usize = 0;
pub const SLOT_FEATURED: usize = 1;
pub const SLOT_CATEGORY_INDEX: usize = 2;
pub const SLOT_CONTENT_LENGTH: usize = 3;
pub const SLOT_RECENCY: usize = 4;
pub const SLOT_CATEGORY_WEIGHT: usize = 5;
pub const SLOT_RICH_EXCERPT: usize = 6;
pub const SLOT_HAS_IMAGE: usize = 7;
pub const SLOT_TAG_COUNT: usize = 8;
pub const SLOT_JITTER: usize = 9;

/// Recency e-folding constant in days
const RECENCY_TIME_CONSTANT_DAYS: f32 = 7.0;
/// Window for the consumer activity-recency ratio
const ACTIVITY_WINDOW_DAYS: i64 = 7;
/// Tag count that maps to a 1.0 tag feature
const TAG_COUNT_CEILING: f32 = 8.0;
/// Minimum excerpt length for the rich-excerpt signal
const RICH_EXCERPT_MIN_CHARS: usize = 80;
/// Category weights are configured in [0, 2] with 1.0 neutral
const CATEGORY_WEIGHT_SPAN: f32 = 2.0;
/// Jitter key for profiles without an identifier
const ANONYMOUS_JITTER_KEY: &str = "anonymous";

/// Number of leading consumer slots that carry per-category shares.
pub fn consumer_share_slots(feature_len: usize) -> usize {
    feature_len - CONSUMER_FIXED_SLOTS
}

pub struct FeatureExtractor {
    feature_len: usize,
    popularity_ceiling: f32,
    engagement_ceiling: f32,
    content_length_ceiling: f32,
    /// slug → (slot position, static weight)
    category_table: HashMap<String, (usize, f32)>,
    category_count: usize,
    jitter_seed: u64,
    jitter_scale: f32,
}

impl FeatureExtractor {
    pub fn new(config: &EngineConfig) -> Self {
        let category_table = Self::build_category_table(&config.categories);
        Self {
            feature_len: config.feature_len,
            popularity_ceiling: config.popularity_ceiling,
            engagement_ceiling: config.engagement_ceiling,
            content_length_ceiling: config.content_length_ceiling,
            category_count: config.categories.len(),
            category_table,
            jitter_seed: config.jitter_seed,
            jitter_scale: config.jitter_scale,
        }
    }

    fn build_category_table(categories: &[CategoryWeight]) -> HashMap<String, (usize, f32)> {
        categories
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.slug.clone(), (position, entry.weight)))
            .collect()
    }

    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    /// Derive the item feature vector. Missing attributes contribute
    /// zero/neutral values rather than failing.
    pub fn extract_item_features(&self, item: &ContentItem, now: DateTime<Utc>) -> FeatureVector {
        let mut features = vec![0.0; self.feature_len];

        features[SLOT_POPULARITY] = normalize_ratio(item.popularity as f32, self.popularity_ceiling);
        features[SLOT_FEATURED] = if item.featured { 1.0 } else { 0.0 };
        features[SLOT_CATEGORY_INDEX] = self.category_index(&item.category);
        features[SLOT_CONTENT_LENGTH] =
            normalize_ratio(item.word_count as f32, self.content_length_ceiling);
        features[SLOT_RECENCY] =
            exponential_decay(age_days(item.published_at, now), RECENCY_TIME_CONSTANT_DAYS);
        features[SLOT_CATEGORY_WEIGHT] = self.category_weight(&item.category);
        features[SLOT_RICH_EXCERPT] = if has_rich_excerpt(item) { 1.0 } else { 0.0 };
        features[SLOT_HAS_IMAGE] = if item.has_image { 1.0 } else { 0.0 };
        features[SLOT_TAG_COUNT] = normalize_ratio(item.tags.len() as f32, TAG_COUNT_CEILING);
        features[SLOT_JITTER] = self.jitter(&item.id, SLOT_JITTER);

        features
    }

    /// Derive the consumer feature vector. A missing or empty profile yields
    /// a low-information default (zeros plus small jitter), not an error.
    pub fn extract_consumer_features(
        &self,
        profile: &ConsumerProfile,
        now: DateTime<Utc>,
    ) -> FeatureVector {
        let jitter_key = profile
            .consumer_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| ANONYMOUS_JITTER_KEY.to_string());

        let valid: Vec<_> = profile
            .interactions
            .iter()
            .filter(|record| record.strength.is_finite())
            .collect();

        if valid.len() < profile.interactions.len() {
            debug!(
                consumer = %jitter_key,
                dropped = profile.interactions.len() - valid.len(),
                "Ignoring interaction records with non-finite strength"
            );
        }

        if valid.is_empty() {
            // No signal: every slot carries only jitter so downstream
            // ordering stays deterministic for a fixed seed.
            return (0..self.feature_len)
                .map(|slot| self.jitter(&jitter_key, slot))
                .collect();
        }

        let mut features = vec![0.0; self.feature_len];
        let share_slots = consumer_share_slots(self.feature_len);
        let total = valid.len() as f32;

        let mut per_category: HashMap<&str, usize> = HashMap::new();
        for record in &valid {
            *per_category.entry(record.category.as_str()).or_insert(0) += 1;
        }
        for (category, count) in per_category {
            if let Some(&(position, _)) = self.category_table.get(category) {
                if position < share_slots {
                    features[position] = count as f32 / total;
                }
            }
        }

        let recent_cutoff = now - Duration::days(ACTIVITY_WINDOW_DAYS);
        let recent = valid
            .iter()
            .filter(|record| record.occurred_at >= recent_cutoff)
            .count();

        features[share_slots] = normalize_ratio(total, self.engagement_ceiling);
        features[share_slots + 1] = recent as f32 / total;
        features[share_slots + 2] = self.jitter(&jitter_key, self.feature_len - 1);

        features
    }

    /// Normalized position of the category in the configured table.
    /// Unknown categories (or an empty table) sit at the neutral midpoint.
    fn category_index(&self, category: &str) -> f32 {
        if self.category_count == 0 {
            return 0.5;
        }
        match self.category_table.get(category) {
            Some(&(position, _)) => position as f32 / self.category_count as f32,
            None => 0.5,
        }
    }

    /// Static editorial weight scaled into [0, 1]; unknown categories are neutral.
    fn category_weight(&self, category: &str) -> f32 {
        let weight = self
            .category_table
            .get(category)
            .map(|&(_, weight)| weight)
            .unwrap_or(1.0);
        (weight / CATEGORY_WEIGHT_SPAN).clamp(0.0, 1.0)
    }

    /// Deterministic low-magnitude jitter: seeded per entity and slot, stable
    /// across runs for a fixed seed.
    fn jitter(&self, key: &str, slot: usize) -> f32 {
        let seed = self
            .jitter_seed
            .wrapping_add(stable_hash(&key))
            .wrapping_add(slot as u64);
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        rng.gen::<f32>() * self.jitter_scale
    }
}

fn age_days(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    ((now - published_at).num_seconds().max(0) as f32) / 86_400.0
}

fn has_rich_excerpt(item: &ContentItem) -> bool {
    item.excerpt
        .as_deref()
        .map(|excerpt| excerpt.chars().count() >= RICH_EXCERPT_MIN_CHARS)
        .unwrap_or(false)
}
