use actix_web::{HttpResponse, error, web};
use log::{info, warn};
use shared::{ErrorResponse, PredictRequest};

use crate::error::GatewayError;
use crate::predict::gateway::PredictionGateway;

/// Base64 inflates the 50 MiB artifact limit by a third; leave room for JSON framing.
const MAX_BODY_BYTES: usize = 70 * 1024 * 1024;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default()
        .limit(MAX_BODY_BYTES)
        .error_handler(|err, _req| {
            warn!("Rejected malformed prediction request: {}", err);
            let body = ErrorResponse {
                error: format!("invalid request body: {}", err),
                instance_index: None,
                message: None,
                category: None,
            };
            error::InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
        });

    cfg.app_data(json_config)
        .service(web::resource("/api/predict").route(web::post().to(handle_predict)))
        .service(web::resource("/predict").route(web::post().to(handle_predict)));
}

async fn handle_predict(
    gateway: web::Data<PredictionGateway>,
    payload: web::Json<PredictRequest>,
) -> Result<HttpResponse, GatewayError> {
    match gateway.predict(payload.into_inner()).await {
        Ok(response) => {
            info!(
                "Request {} served by {} tier after {} attempt(s)",
                response.request_id, response.tier, response.attempts
            );
            Ok(HttpResponse::Ok().json(response))
        }
        Err(e) => {
            match &e {
                GatewayError::Validation(_) | GatewayError::EmptyResult { .. } => {
                    info!("Prediction request rejected: {}", e)
                }
                _ => log::error!("Prediction request failed: {}", e),
            }
            Err(e)
        }
    }
}
