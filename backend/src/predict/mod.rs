pub mod dispatcher;
pub mod formatter;
pub mod gateway;
pub mod models;
pub mod normalizer;
pub mod retry;
pub mod router;
pub mod transport;
