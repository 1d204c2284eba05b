use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// One image unit as submitted by a client. Only strings and objects whose
/// `content` is a string (or absent) are recognised; everything else is `Other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum RawInstance {
    Text(String),
    Wrapped(WrappedInstance),
    Other(serde_json::Value),
}

impl From<serde_json::Value> for RawInstance {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(text) => RawInstance::Text(text),
            serde_json::Value::Object(map) => {
                let content = match map.get("content").cloned() {
                    None | Some(serde_json::Value::Null) => None,
                    Some(serde_json::Value::String(content)) => Some(content),
                    Some(_) => return RawInstance::Other(serde_json::Value::Object(map)),
                };
                let mime_type = map
                    .get("mimeType")
                    .and_then(|m| m.as_str())
                    .map(str::to_string);
                RawInstance::Wrapped(WrappedInstance { content, mime_type })
            }
            other => RawInstance::Other(other),
        }
    }
}

impl From<RawInstance> for serde_json::Value {
    fn from(instance: RawInstance) -> Self {
        match instance {
            RawInstance::Text(text) => serde_json::Value::String(text),
            RawInstance::Wrapped(wrapped) => serde_json::json!(wrapped),
            RawInstance::Other(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedInstance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_predictions: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub instances: Vec<RawInstance>,
    #[serde(default)]
    pub parameters: PredictParameters,
    #[serde(default)]
    pub metadata: RequestMetadata,
}

/// Service tier that answered a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Tier {
    Primary,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionEntry {
    pub label: String,
    pub confidence: f64,
    pub percentage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub predictions: Vec<PredictionEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredArtifact {
    pub input_refs: Vec<String>,
    pub stored_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictResponse {
    pub success: bool,
    pub request_id: String,
    pub category: String,
    pub tier: Tier,
    pub attempts: u32,
    #[serde(flatten)]
    pub result: PredictionResult,
    pub storage: Option<StoredArtifact>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}
