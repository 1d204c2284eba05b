use serde::{Deserialize, Serialize};
use shared::PredictParameters;

use super::normalizer::NormalizedInstance;

#[derive(Debug, Serialize)]
pub struct InferenceRequestBody<'a> {
    pub instances: &'a [NormalizedInstance],
    pub parameters: &'a PredictParameters,
}

/// Success body of an inference backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendPayload {
    pub predictions: Vec<RawPrediction>,
    #[serde(default, alias = "deployedModelId")]
    pub model_id: Option<String>,
}

/// Primary-tier servers report one label per entry; the managed tier batches
/// parallel `displayNames`/`confidences` arrays per instance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawPrediction {
    Pair {
        #[serde(alias = "displayName")]
        label: String,
        confidence: f64,
    },
    #[serde(rename_all = "camelCase")]
    Batched {
        display_names: Vec<String>,
        confidences: Vec<f64>,
    },
}
