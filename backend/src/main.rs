mod auth;
mod config;
mod db;
mod error;
mod predict;
mod routes;
mod storage;
#[cfg(test)]
mod test_support;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use auth::credentials::provider_from_config;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use config::settings::{ConfigError, CredentialEnv, GatewayConfig};
use db::dynamodb_repository::DynamoDbRepository;
use predict::dispatcher::Dispatcher;
use predict::gateway::PredictionGateway;
use predict::retry::RetryPolicy;
use predict::router::VeinTypeRouter;
use predict::transport::HttpTransport;
use routes::configure_routes;
use std::sync::Arc;
use storage::s3_service::S3Service;
use storage::side_effects::SideEffectCoordinator;

fn startup_error(e: ConfigError) -> std::io::Error {
    log::error!("Gateway configuration error: {}", e);
    std::io::Error::other(format!("Configuration failed: {}", e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = GatewayConfig::load().map_err(startup_error)?;

    let router = VeinTypeRouter::from_config(&config);
    log::info!(
        "Routing {} categories, default '{}'",
        config.routes.len(),
        router.default_category()
    );

    let policy = RetryPolicy::from(&config.retry);
    let transport = Arc::new(HttpTransport::new(policy.attempt_timeout));
    let credentials =
        provider_from_config(&config.credentials, &CredentialEnv::PRIMARY).map_err(startup_error)?;
    let mut dispatcher =
        Dispatcher::new(transport, credentials, &config.backends, policy).map_err(startup_error)?;
    if let Some(fallback) = &config.fallback_credentials {
        let provider =
            provider_from_config(fallback, &CredentialEnv::FALLBACK).map_err(startup_error)?;
        dispatcher = dispatcher.with_fallback_credentials(provider);
        log::info!("Fallback tier uses its own credentials");
    }
    log::info!(
        "Dispatch policy: {} attempts max, per-attempt timeout {:?}",
        dispatcher.policy().max_attempts(),
        dispatcher.policy().attempt_timeout
    );

    let side_effects = if config.storage.enabled {
        let bucket = config
            .storage
            .bucket
            .clone()
            .ok_or(ConfigError::MissingEnv("S3_BUCKET_NAME"))
            .map_err(startup_error)?;
        let table = config
            .storage
            .predictions_table
            .clone()
            .ok_or(ConfigError::MissingEnv("DYNAMODB_PREDICTIONS_TABLE"))
            .map_err(startup_error)?;

        // Initialize AWS configuration
        let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let s3_service = S3Service::new(S3Client::new(&aws_config), bucket);
        let db_repo = DynamoDbRepository::new(DynamoDbClient::new(&aws_config), table);
        Some(SideEffectCoordinator::new(
            Arc::new(s3_service),
            Arc::new(db_repo),
        ))
    } else {
        log::warn!("Artifact persistence is disabled; responses will carry storage: null");
        None
    };

    let gateway = web::Data::new(PredictionGateway::new(
        router,
        dispatcher,
        side_effects,
        config.storage.attach_timeout(),
    ));

    let bind_address = format!("0.0.0.0:{}", config.server.port);
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(gateway.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
