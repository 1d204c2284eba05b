pub mod cognito_service;
pub mod credentials;
pub mod jwt;
pub mod models;
