/// Relevance Model Inference
///
/// Loads and runs an ONNX-exported relevance model (logistic regression,
/// small feed-forward net, or GBDT - anything emitting a probability-like
/// scalar per row) using tract-onnx. Model input is the concatenated
/// consumer + item feature vector.

use ndarray::{Array1, Array2};
use std::path::Path;
use tracing::debug;

use tract_onnx::prelude::{tvec, Framework, InferenceModelExt};

use crate::error::{EngineError, Result};

type OnnxPlan = tract_onnx::prelude::SimplePlan<
    tract_onnx::prelude::TypedFact,
    Box<dyn tract_onnx::prelude::TypedOp>,
    tract_onnx::prelude::Graph<
        tract_onnx::prelude::TypedFact,
        Box<dyn tract_onnx::prelude::TypedOp>,
    >,
>;

/// A loaded inference handle. The plan is owned here and dropped with the
/// engine state that holds it, so backend resources are released
/// deterministically on reconfigure or shutdown.
pub struct RelevanceModel {
    plan: OnnxPlan,
    input_width: usize,
}

impl RelevanceModel {
    /// Load an ONNX model from disk. Failure is `ModelUnavailable` - the
    /// caller decides whether that disables the model path or aborts.
    pub fn load<P: AsRef<Path>>(model_path: P, input_width: usize) -> Result<Self> {
        let path = model_path.as_ref();
        let plan = Self::try_load_onnx(path).map_err(|e| {
            EngineError::ModelUnavailable(format!(
                "failed to load ONNX model from {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!(path = %path.display(), input_width, "Loaded ONNX relevance model");
        Ok(Self { plan, input_width })
    }

    pub fn input_width(&self) -> usize {
        self.input_width
    }

    /// Predict relevance scores for a batch of concatenated feature rows.
    /// Output is clamped into [0, 1] to uphold the score invariant.
    pub fn predict(&self, features: Array2<f32>) -> Result<Array1<f32>> {
        let batch_size = features.shape()[0];

        if features.shape()[1] != self.input_width {
            return Err(EngineError::ModelUnavailable(format!(
                "expected input width {}, got {}",
                self.input_width,
                features.shape()[1]
            )));
        }

        let input_tensor = tract_onnx::prelude::tract_ndarray::Array2::from_shape_fn(
            (batch_size, self.input_width),
            |(row, col)| features[[row, col]],
        );

        let tensor: tract_onnx::prelude::Tensor = input_tensor.into_dyn().into();
        let input = tvec![tensor.into()];
        let output = self
            .plan
            .run(input)
            .map_err(|e| EngineError::ModelUnavailable(format!("inference failed: {}", e)))?;

        let scores_view = output[0].to_array_view::<f32>().map_err(|e| {
            EngineError::ModelUnavailable(format!("output extraction failed: {}", e))
        })?;

        let scores: Array1<f32> =
            Array1::from_iter(scores_view.iter().map(|score| score.clamp(0.0, 1.0)));

        if scores.len() != batch_size {
            return Err(EngineError::ModelUnavailable(format!(
                "model returned {} scores for {} rows",
                scores.len(),
                batch_size
            )));
        }

        Ok(scores)
    }

    fn try_load_onnx(path: &Path) -> std::result::Result<OnnxPlan, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Err(format!("model file not found: {}", path.display()).into());
        }

        let plan = tract_onnx::onnx()
            .model_for_path(path)?
            .into_optimized()?
            .into_runnable()?;

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_file_is_unavailable() {
        let result = RelevanceModel::load("/nonexistent/model.onnx", 20);

        assert!(matches!(result, Err(EngineError::ModelUnavailable(_))));
    }
}
