use chrono::Utc;
use shared::{PredictParameters, PredictRequest, PredictResponse, Tier};
use std::time::Duration;
use uuid::Uuid;

use super::dispatcher::{DispatchError, Dispatched, Dispatcher};
use super::formatter;
use super::normalizer::{self, NormalizedInstance};
use super::router::{Category, Route, VeinTypeRouter};
use crate::error::GatewayError;
use crate::storage::models::PredictionRecord;
use crate::storage::side_effects::{PendingInput, SideEffectCoordinator};

/// One request end to end: normalize, route, dispatch (with tier failover),
/// format, and hand persistence off to the background.
pub struct PredictionGateway {
    router: VeinTypeRouter,
    dispatcher: Dispatcher,
    side_effects: Option<SideEffectCoordinator>,
    attach_timeout: Duration,
}

impl PredictionGateway {
    pub fn new(
        router: VeinTypeRouter,
        dispatcher: Dispatcher,
        side_effects: Option<SideEffectCoordinator>,
        attach_timeout: Duration,
    ) -> Self {
        Self {
            router,
            dispatcher,
            side_effects,
            attach_timeout,
        }
    }

    pub async fn predict(&self, request: PredictRequest) -> Result<PredictResponse, GatewayError> {
        let instances = normalizer::normalize(&request.instances)?;
        let (category, route) = self.router.resolve(request.metadata.category.as_deref())?;
        let request_id = Uuid::new_v4();

        log::info!(
            "Prediction request {} for category '{}' with {} instance(s)",
            request_id,
            category,
            instances.len()
        );

        let mut pending = match &self.side_effects {
            Some(coordinator) => coordinator.begin_input(request_id, category.as_str(), &instances),
            None => PendingInput::disabled(request_id),
        };

        let (tier, dispatched) =
            match self.dispatch_route(&category, route, &instances, &request.parameters).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    pending.abandon();
                    return Err(e);
                }
            };
        let attempts = dispatched.attempts;

        let result = match formatter::format(dispatched.payload) {
            Ok(result) => result,
            Err(_) => {
                log::info!("Request {} produced no predictions", request_id);
                pending.abandon();
                return Err(GatewayError::EmptyResult {
                    category: category.to_string(),
                });
            }
        };

        let storage = pending.settle(self.attach_timeout).await;

        if let Some(coordinator) = &self.side_effects {
            let input_refs = storage
                .as_ref()
                .map(|artifact| artifact.input_refs.clone())
                .unwrap_or_default();
            coordinator.record_result(
                PredictionRecord::new(
                    request_id,
                    category.to_string(),
                    tier,
                    attempts,
                    input_refs,
                    result.clone(),
                ),
                pending,
            );
        }

        Ok(PredictResponse {
            success: true,
            request_id: request_id.to_string(),
            category: category.to_string(),
            tier,
            attempts,
            result,
            storage,
            timestamp: Utc::now().to_rfc3339(),
        })
    }

    /// Only an exhausted transient failure on the primary target moves on to
    /// the fallback target, which gets a fresh retry budget.
    async fn dispatch_route(
        &self,
        category: &Category,
        route: &Route,
        instances: &[NormalizedInstance],
        parameters: &PredictParameters,
    ) -> Result<(Tier, Dispatched), GatewayError> {
        let primary = self.dispatcher.dispatch(&route.primary, instances, parameters).await;

        match (primary, &route.fallback) {
            (Ok(dispatched), _) => Ok((route.primary.tier, dispatched)),
            (Err(err @ DispatchError::Transient { .. }), Some(fallback)) => {
                log::warn!(
                    "Failing over category '{}' from {} to {}: {}",
                    category,
                    route.primary,
                    fallback,
                    err
                );
                self.dispatcher
                    .dispatch(fallback, instances, parameters)
                    .await
                    .map(|dispatched| (fallback.tier, dispatched))
                    .map_err(|e| GatewayError::from_dispatch(category.as_str(), e))
            }
            (Err(err), _) => Err(GatewayError::from_dispatch(category.as_str(), err)),
        }
    }
}
