/// Diversifier / Selector
///
/// Turns scored candidates into the final bounded, category-diverse subset.
/// Two passes: the first favors unseen categories while honoring the
/// minimum count, the second fills remaining slots purely by score.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::models::{
    Recommendation, ScoreSource, ScoredCandidate, SelectionReason, SelectionStats,
};

/// Slots always granted to the top of the list regardless of category
const ALWAYS_ALLOW_FLOOR: usize = 3;
/// Window for the "recent" reason tag
const RECENT_WINDOW_HOURS: i64 = 24;

pub struct Selector {
    high_relevance_threshold: f32,
    popular_threshold: u32,
}

impl Selector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            high_relevance_threshold: config.high_relevance_threshold,
            popular_threshold: config.popular_threshold,
        }
    }

    /// Select up to `max_count` candidates, at least `min_count` when enough
    /// exist, spanning categories where possible. Fewer candidates than
    /// `min_count` is not an error; `max_count == 0` or inverted bounds are.
    pub fn select(
        &self,
        candidates: Vec<ScoredCandidate>,
        min_count: usize,
        max_count: usize,
        now: DateTime<Utc>,
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

        let mut stats = SelectionStats {
            candidate_count: candidates.len(),
            model_scored: candidates
                .iter()
                .filter(|c| c.scored_by == ScoreSource::Model)
                .count(),
            heuristic_scored: candidates
                .iter()
                .filter(|c| c.scored_by == ScoreSource::Heuristic)
                .count(),
            final_count: 0,
        };

        if candidates.is_empty() {
            return Ok(Recommendation {
                items: Vec::new(),
                total: 0,
                categories: BTreeSet::new(),
                stats,
            });
        }

        let mut sorted = candidates;
        // Deterministic ordering: score desc, then newer first, then id asc.
        // NaN never reaches here (scoring clamps), Equal is a safe fallback.
        sorted.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.item.published_at.cmp(&a.item.published_at))
                .then_with(|| a.item.id.cmp(&b.item.id))
        });

        let mut picked = vec![false; sorted.len()];
        let mut seen_categories: BTreeSet<String> = BTreeSet::new();
        let mut selected = 0usize;

        // Pass 1: category-aware walk
        for (index, candidate) in sorted.iter().enumerate() {
            if selected >= max_count {
                break;
            }
            let category_is_new = !seen_categories.contains(&candidate.item.category);
            if selected < min_count || category_is_new || selected < ALWAYS_ALLOW_FLOOR {
                picked[index] = true;
                seen_categories.insert(candidate.item.category.clone());
                selected += 1;
            }
        }

        // Pass 2: fill remaining slots by score alone
        for (index, candidate) in sorted.iter().enumerate() {
            if selected >= max_count {
                break;
            }
            if !picked[index] {
                picked[index] = true;
                seen_categories.insert(candidate.item.category.clone());
                selected += 1;
            }
        }

        let items: Vec<ScoredCandidate> = sorted
            .into_iter()
            .zip(picked)
            .filter_map(|(candidate, keep)| keep.then(|| self.annotate(candidate, now)))
            .collect();

        stats.final_count = items.len();

        info!(
            candidate_count = stats.candidate_count,
            final_count = stats.final_count,
            categories = seen_categories.len(),
            "Selection complete"
        );

        Ok(Recommendation {
            total: items.len(),
            categories: items
                .iter()
                .map(|candidate| candidate.item.category.clone())
                .collect(),
            items,
            stats,
        })
    }

    fn annotate(&self, mut candidate: ScoredCandidate, now: DateTime<Utc>) -> ScoredCandidate {
        let mut reasons = Vec::new();

        if candidate.score > self.high_relevance_threshold {
            reasons.push(SelectionReason::HighRelevance);
        }
        if candidate.item.popularity > self.popular_threshold {
            reasons.push(SelectionReason::Popular);
        }
        if candidate.item.featured {
            reasons.push(SelectionReason::EditorialFeature);
        }
        if now - candidate.item.published_at < Duration::hours(RECENT_WINDOW_HOURS) {
            reasons.push(SelectionReason::Recent);
        }
        if reasons.is_empty() {
            reasons.push(SelectionReason::RecommendedForYou);
        }

        candidate.reasons = reasons;
        candidate
    }
}
