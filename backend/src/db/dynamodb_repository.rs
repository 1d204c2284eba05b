use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;

use crate::storage::models::PredictionRecord;
use crate::storage::side_effects::{PredictionLog, StorageError};

#[derive(Clone)]
pub struct DynamoDbRepository {
    client: Client,
    predictions_table: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<RepositoryError> for StorageError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Serialization(e) => StorageError::Encoding(e.to_string()),
            RepositoryError::DynamoDb(msg) => StorageError::Upstream(msg),
        }
    }
}

impl DynamoDbRepository {
    pub fn new(client: Client, predictions_table: String) -> Self {
        Self {
            client,
            predictions_table,
        }
    }

    pub async fn create_prediction(&self, record: &PredictionRecord) -> Result<(), RepositoryError> {
        let item = prediction_item(record)?;

        match self
            .client
            .put_item()
            .table_name(&self.predictions_table)
            .set_item(Some(item))
            .send()
            .await
        {
            Ok(_) => {
                log::info!(
                    "Stored prediction record {} in DynamoDB table '{}'",
                    record.request_id,
                    self.predictions_table
                );
                Ok(())
            }
            Err(e) => {
                log::error!(
                    "DynamoDB put_item failed for prediction {}: {:?}",
                    record.request_id,
                    e
                );

                let error_msg = if let Some(service_err) = e.as_service_error() {
                    format!("Service error: {:?}", service_err)
                } else {
                    format!("SDK error: {}", e)
                };

                Err(RepositoryError::DynamoDb(error_msg))
            }
        }
    }
}

#[async_trait]
impl PredictionLog for DynamoDbRepository {
    async fn record(&self, record: &PredictionRecord) -> Result<(), StorageError> {
        Ok(self.create_prediction(record).await?)
    }
}

fn prediction_item(
    record: &PredictionRecord,
) -> Result<HashMap<String, AttributeValue>, RepositoryError> {
    let mut item = HashMap::new();
    item.insert(
        "id".to_string(),
        AttributeValue::S(record.request_id.to_string()),
    );
    item.insert(
        "category".to_string(),
        AttributeValue::S(record.category.clone()),
    );
    item.insert("tier".to_string(), AttributeValue::S(record.tier.to_string()));
    item.insert(
        "attempts".to_string(),
        AttributeValue::N(record.attempts.to_string()),
    );
    if !record.input_refs.is_empty() {
        item.insert(
            "input_refs".to_string(),
            AttributeValue::L(
                record
                    .input_refs
                    .iter()
                    .map(|input_ref| AttributeValue::S(input_ref.clone()))
                    .collect(),
            ),
        );
    }
    if let Some(result_ref) = &record.result_ref {
        item.insert(
            "result_ref".to_string(),
            AttributeValue::S(result_ref.clone()),
        );
    }
    if let Some(model_id) = &record.result.model_id {
        item.insert("model_id".to_string(), AttributeValue::S(model_id.clone()));
    }
    item.insert(
        "predictions".to_string(),
        AttributeValue::S(serde_json::to_string(&record.result.predictions)?),
    );
    item.insert(
        "created_at".to_string(),
        AttributeValue::S(record.created_at.to_rfc3339()),
    );
    Ok(item)
}
