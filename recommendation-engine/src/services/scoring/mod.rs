/// Scoring Module
///
/// Batch relevance scoring over (consumer, item) feature-vector pairs.
///
/// # Workflow
/// 1. Sanitize item vectors (wrong width / non-finite slots are contained
///    per candidate, never failing the batch)
/// 2. Run ONNX model inference per chunk, fanned out concurrently
/// 3. Fall back to the deterministic heuristic when the model is absent or
///    a chunk errors
pub mod heuristic;
pub mod model;

pub use heuristic::HeuristicScorer;
pub use model::RelevanceModel;

use futures::stream::{self, StreamExt};
use ndarray::Array2;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::models::{ContentItem, FeatureVector, ScoreSource, ScoredCandidate};

pub struct ScoringEngine {
    model: Option<RelevanceModel>,
    heuristic: HeuristicScorer,
    feature_len: usize,
    max_batch_size: usize,
    concurrency_limit: usize,
}

impl ScoringEngine {
    /// Build the scoring engine, attempting model initialization once. A
    /// load failure activates the heuristic fallback for this engine's
    /// lifetime; `Engine::reconfigure` constructs a fresh `ScoringEngine`
    /// and with it a fresh initialization attempt.
    pub fn new(config: &EngineConfig) -> Self {
        let input_width = config.feature_len * 2;
        let model = match &config.model_path {
            Some(path) => match RelevanceModel::load(path, input_width) {
                Ok(model) => Some(model),
                Err(e) => {
                    warn!(error = %e, "Relevance model unavailable, scoring falls back to the heuristic");
                    None
                }
            },
            None => {
                debug!("No model path configured, scoring uses the heuristic");
                None
            }
        };

        Self {
            model,
            heuristic: HeuristicScorer::new(config.heuristic.clone(), config.feature_len),
            feature_len: config.feature_len,
            max_batch_size: config.max_batch_size,
            concurrency_limit: config.concurrency_limit,
        }
    }

    pub fn is_model_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Score a batch of candidates against one consumer vector. Candidates
    /// are chunked and the chunks scored concurrently; completion order is
    /// irrelevant since the selector re-sorts. Never fails: every candidate
    /// comes back with a score in [0, 1].
    pub async fn score_candidates(
        &self,
        consumer: &FeatureVector,
        items: Vec<(ContentItem, FeatureVector)>,
    ) -> Vec<ScoredCandidate> {
        if items.is_empty() {
            return Vec::new();
        }

        let candidate_count = items.len();
        let mut chunks: Vec<Vec<(ContentItem, FeatureVector)>> = Vec::new();
        let mut items = items;
        while !items.is_empty() {
            let take = items.len().min(self.max_batch_size);
            chunks.push(items.drain(..take).collect());
        }

        let scored: Vec<Vec<ScoredCandidate>> = stream::iter(chunks)
            .map(|chunk| self.score_chunk(consumer, chunk))
            .buffer_unordered(self.concurrency_limit)
            .collect()
            .await;

        let scored: Vec<ScoredCandidate> = scored.into_iter().flatten().collect();

        debug!(
            candidate_count,
            model_loaded = self.model.is_some(),
            "Scoring complete"
        );

        scored
    }

    async fn score_chunk(
        &self,
        consumer: &[f32],
        chunk: Vec<(ContentItem, FeatureVector)>,
    ) -> Vec<ScoredCandidate> {
        let rows = chunk.len();
        let mut degraded = vec![false; rows];
        let mut chunk = chunk;

        for (row, (item, vector)) in chunk.iter_mut().enumerate() {
            if sanitize_vector(vector, self.feature_len) {
                warn!(
                    item_id = %item.id,
                    "Malformed item feature vector, substituting heuristic score"
                );
                degraded[row] = true;
            }
        }

        let model_scores = match &self.model {
            Some(model) => match self.predict_chunk(model, consumer, &chunk) {
                Ok(scores) => Some(scores),
                Err(e) => {
                    warn!(error = %e, rows, "Model inference failed, batch falls back to the heuristic");
                    None
                }
            },
            None => None,
        };

        chunk
            .into_iter()
            .enumerate()
            .map(|(row, (item, vector))| match &model_scores {
                Some(scores) if !degraded[row] => ScoredCandidate {
                    score: scores[row].clamp(0.0, 1.0),
                    scored_by: ScoreSource::Model,
                    item,
                    reasons: Vec::new(),
                },
                _ => ScoredCandidate {
                    score: self.heuristic.score(consumer, &vector),
                    scored_by: ScoreSource::Heuristic,
                    item,
                    reasons: Vec::new(),
                },
            })
            .collect()
    }

    fn predict_chunk(
        &self,
        model: &RelevanceModel,
        consumer: &[f32],
        chunk: &[(ContentItem, FeatureVector)],
    ) -> crate::error::Result<ndarray::Array1<f32>> {
        let width = self.feature_len * 2;
        let mut flat = Vec::with_capacity(chunk.len() * width);
        for (_, vector) in chunk {
            flat.extend_from_slice(consumer);
            flat.extend_from_slice(vector);
        }

        let matrix = Array2::from_shape_vec((chunk.len(), width), flat).map_err(|e| {
            crate::error::EngineError::FeatureExtraction(format!(
                "failed to build feature matrix: {}",
                e
            ))
        })?;

        model.predict(matrix)
    }
}

/// Force a vector back to the expected width with finite slots. Returns
/// true when anything had to change, i.e. the original was malformed.
fn sanitize_vector(vector: &mut FeatureVector, feature_len: usize) -> bool {
    let mut changed = false;

    if vector.len() != feature_len {
        vector.resize(feature_len, 0.0);
        changed = true;
    }
    for value in vector.iter_mut() {
        if !value.is_finite() {
            *value = 0.0;
            changed = true;
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_FEATURE_LEN;
    use crate::services::features::{SLOT_FEATURED, SLOT_POPULARITY, SLOT_RECENCY};
    use chrono::Utc;

    fn test_item(id: &str) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            category: "news".to_string(),
            published_at: Utc::now(),
            popularity: 100,
            word_count: 500,
            has_image: false,
            tags: Vec::new(),
            featured: false,
            excerpt: None,
        }
    }

    fn item_vector(popularity: f32) -> FeatureVector {
        let mut vector = vec![0.0; DEFAULT_FEATURE_LEN];
        vector[SLOT_POPULARITY] = popularity;
        vector[SLOT_RECENCY] = 1.0;
        vector[SLOT_FEATURED] = 0.0;
        vector
    }

    #[tokio::test]
    async fn test_scores_without_model_use_heuristic() {
        let engine = ScoringEngine::new(&EngineConfig::default());
        assert!(!engine.is_model_loaded());

        let consumer = vec![0.0; DEFAULT_FEATURE_LEN];
        let scored = engine
            .score_candidates(
                &consumer,
                vec![
                    (test_item("a"), item_vector(1.0)),
                    (test_item("b"), item_vector(0.2)),
                ],
            )
            .await;

        assert_eq!(scored.len(), 2);
        for candidate in &scored {
            assert_eq!(candidate.scored_by, ScoreSource::Heuristic);
            assert!((0.0..=1.0).contains(&candidate.score));
        }
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let engine = ScoringEngine::new(&EngineConfig::default());
        let scored = engine
            .score_candidates(&vec![0.0; DEFAULT_FEATURE_LEN], Vec::new())
            .await;
        assert!(scored.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_vector_contained_to_one_candidate() {
        let engine = ScoringEngine::new(&EngineConfig::default());
        let consumer = vec![0.0; DEFAULT_FEATURE_LEN];

        let mut bad = item_vector(0.5);
        bad[SLOT_POPULARITY] = f32::NAN;
        bad.truncate(3);

        let scored = engine
            .score_candidates(
                &consumer,
                vec![(test_item("good"), item_vector(0.9)), (test_item("bad"), bad)],
            )
            .await;

        assert_eq!(scored.len(), 2);
        for candidate in &scored {
            assert!(candidate.score.is_finite());
            assert!((0.0..=1.0).contains(&candidate.score));
        }
    }

    #[tokio::test]
    async fn test_missing_model_file_falls_back() {
        let config = EngineConfig {
            model_path: Some("/nonexistent/relevance.onnx".into()),
            ..Default::default()
        };
        let engine = ScoringEngine::new(&config);
        assert!(!engine.is_model_loaded());

        let scored = engine
            .score_candidates(
                &vec![0.0; DEFAULT_FEATURE_LEN],
                vec![(test_item("a"), item_vector(0.4))],
            )
            .await;
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].scored_by, ScoreSource::Heuristic);
    }

    #[tokio::test]
    async fn test_large_batch_is_chunked() {
        let config = EngineConfig {
            max_batch_size: 10,
            concurrency_limit: 2,
            ..Default::default()
        };
        let engine = ScoringEngine::new(&config);
        let consumer = vec![0.0; DEFAULT_FEATURE_LEN];

        let items: Vec<_> = (0..35)
            .map(|i| (test_item(&format!("item-{}", i)), item_vector(0.5)))
            .collect();

        let scored = engine.score_candidates(&consumer, items).await;
        assert_eq!(scored.len(), 35);
    }
}
