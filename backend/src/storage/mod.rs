pub mod models;
pub mod s3_service;
pub mod side_effects;
