use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{PredictionResult, Tier};
use uuid::Uuid;

/// Audit row written once a prediction has been served.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub request_id: Uuid,
    pub category: String,
    pub tier: Tier,
    pub attempts: u32,
    pub input_refs: Vec<String>,
    pub result_ref: Option<String>,
    pub result: PredictionResult,
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn new(
        request_id: Uuid,
        category: String,
        tier: Tier,
        attempts: u32,
        input_refs: Vec<String>,
        result: PredictionResult,
    ) -> Self {
        Self {
            request_id,
            category,
            tier,
            attempts,
            input_refs,
            result_ref: None,
            result,
            created_at: Utc::now(),
        }
    }
}
