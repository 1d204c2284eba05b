use shared::{PredictionEntry, PredictionResult};

use super::models::{BackendPayload, RawPrediction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no predictions")]
pub struct EmptyResultError;

/// Flattens the backend payload into client-facing entries, keeping backend order.
pub fn format(payload: BackendPayload) -> Result<PredictionResult, EmptyResultError> {
    let mut predictions = Vec::new();
    for raw in payload.predictions {
        match raw {
            RawPrediction::Pair { label, confidence } => predictions.push(entry(label, confidence)),
            RawPrediction::Batched {
                display_names,
                confidences,
            } => predictions.extend(
                display_names
                    .into_iter()
                    .zip(confidences)
                    .map(|(label, confidence)| entry(label, confidence)),
            ),
        }
    }

    if predictions.is_empty() {
        return Err(EmptyResultError);
    }

    Ok(PredictionResult {
        predictions,
        model_id: payload.model_id,
    })
}

fn entry(label: String, confidence: f64) -> PredictionEntry {
    PredictionEntry {
        percentage: format!("{:.2}%", confidence * 100.0),
        label,
        confidence,
    }
}
