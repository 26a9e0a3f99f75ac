pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::{CategoryWeight, EngineConfig, HeuristicWeights};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use models::{
    ConsumerProfile, ContentItem, FeatureVector, FeedbackEvent, InteractionRecord,
    Recommendation, ScoreSource, ScoredCandidate, SelectionReason, SelectionStats,
};
pub use services::{
    FeatureExtractor, FeedbackRecorder, HeuristicScorer, QueryKey, RecommendationCache,
    ScoringEngine, Selector,
};
