pub mod cache;
pub mod features;
pub mod feedback;
pub mod scoring;
pub mod selection;

pub use cache::{QueryKey, RecommendationCache};
pub use features::FeatureExtractor;
pub use feedback::FeedbackRecorder;
pub use scoring::{HeuristicScorer, RelevanceModel, ScoringEngine};
pub use selection::Selector;
