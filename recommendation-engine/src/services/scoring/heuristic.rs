/// Heuristic Fallback Scorer
///
/// Deterministic replacement for the relevance model, operating on the same
/// feature vectors. Each term's input sits in [0, 1], so the configured
/// weight is also that term's maximum contribution; the default envelope is
/// popularity 0.3, recency 0.3, featured 0.2, affinity 0.2.

use crate::config::HeuristicWeights;
use crate::services::features::{
    consumer_share_slots, SLOT_FEATURED, SLOT_POPULARITY, SLOT_RECENCY,
};

/// The recency bonus decays linearly to zero over this window
const RECENCY_LINEAR_WINDOW_DAYS: f32 = 30.0;
/// Time constant the item recency slot was encoded with
const RECENCY_TIME_CONSTANT_DAYS: f32 = 7.0;

pub struct HeuristicScorer {
    weights: HeuristicWeights,
    feature_len: usize,
}

impl HeuristicScorer {
    pub fn new(weights: HeuristicWeights, feature_len: usize) -> Self {
        Self {
            weights,
            feature_len,
        }
    }

    /// Score a single candidate from its consumer/item vectors. Always in
    /// [0, 1]; out-of-range or non-finite slots contribute nothing.
    pub fn score(&self, consumer: &[f32], item: &[f32]) -> f32 {
        let popularity = slot(item, SLOT_POPULARITY);
        let recency = linear_recency(slot(item, SLOT_RECENCY));
        let featured = slot(item, SLOT_FEATURED);
        let affinity = self.category_affinity(consumer);

        let score = self.weights.popularity * popularity
            + self.weights.recency * recency
            + self.weights.featured * featured
            + self.weights.affinity * affinity;

        score.clamp(0.0, 1.0)
    }

    /// Mean of the consumer category-share slots.
    fn category_affinity(&self, consumer: &[f32]) -> f32 {
        let share_slots = consumer_share_slots(self.feature_len);
        if share_slots == 0 {
            return 0.0;
        }
        let sum: f32 = (0..share_slots).map(|position| slot(consumer, position)).sum();
        (sum / share_slots as f32).clamp(0.0, 1.0)
    }
}

fn slot(vector: &[f32], position: usize) -> f32 {
    vector
        .get(position)
        .copied()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0)
}

/// Recover the age from the exponential recency slot and re-map it onto a
/// linear 30-day decay.
fn linear_recency(decay: f32) -> f32 {
    if decay <= f32::MIN_POSITIVE {
        return 0.0;
    }
    let age_days = -RECENCY_TIME_CONSTANT_DAYS * decay.min(1.0).ln();
    (1.0 - age_days / RECENCY_LINEAR_WINDOW_DAYS).clamp(0.0, 1.0)
}
