use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A content item offered as a recommendation candidate.
/// Owned by the external content store; read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub category: String,
    pub published_at: DateTime<Utc>,
    pub popularity: u32,
    /// Content-length proxy
    pub word_count: u32,
    pub has_image: bool,
    pub tags: Vec<String>,
    pub featured: bool,
    pub excerpt: Option<String>,
}

/// One past interaction between a consumer and an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub item_id: String,
    pub category: String,
    pub occurred_at: DateTime<Utc>,
    pub strength: f32,
}

/// Interaction history for one consumer. `consumer_id = None` is anonymous.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsumerProfile {
    pub consumer_id: Option<Uuid>,
    pub interactions: Vec<InteractionRecord>,
}

impl ConsumerProfile {
    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Fixed-length normalized feature encoding of an item or a consumer.
/// Length is constant per engine instance (`EngineConfig::feature_len`).
pub type FeatureVector = Vec<f32>;

/// Which scoring path produced a candidate's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreSource {
    Model,
    Heuristic,
}

impl ScoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreSource::Model => "model",
            ScoreSource::Heuristic => "heuristic",
        }
    }
}

/// Human-readable explanation tag attached at selection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionReason {
    HighRelevance,
    Popular,
    EditorialFeature,
    Recent,
    RecommendedForYou,
}

impl SelectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionReason::HighRelevance => "high relevance",
            SelectionReason::Popular => "popular",
            SelectionReason::EditorialFeature => "editorial feature",
            SelectionReason::Recent => "recent",
            SelectionReason::RecommendedForYou => "recommended for you",
        }
    }
}

/// A candidate with its relevance score. Reasons are filled in by the
/// selector; `scored_by` records which path produced the score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub item: ContentItem,
    pub score: f32,
    pub scored_by: ScoreSource,
    pub reasons: Vec<SelectionReason>,
}

/// Per-pass accounting attached to every Recommendation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionStats {
    pub candidate_count: usize,
    pub model_scored: usize,
    pub heuristic_scored: usize,
    pub final_count: usize,
}

/// The engine's output artifact: an ordered, annotated subset of candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub items: Vec<ScoredCandidate>,
    pub total: usize,
    /// Diversity summary: categories represented in the result
    pub categories: BTreeSet<String>,
    pub stats: SelectionStats,
}

impl Recommendation {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            categories: BTreeSet::new(),
            stats: SelectionStats::default(),
        }
    }
}

/// Consumer reaction to a recommendation, kept for future retraining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub consumer_id: Option<Uuid>,
    pub item_id: String,
    pub accepted: bool,
    pub occurred_at: DateTime<Utc>,
}
