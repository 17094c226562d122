pub mod app_config;
pub mod database;
pub mod events;
pub mod fraud_repo;
pub mod order_repo;
pub mod redis_repo;
pub mod settlement_repo;
pub mod worker_repo;

pub use database::DbClient;
pub use events::EventProducer;
pub use redis_repo::RedisCounters;

pub(crate) fn db_err(e: sqlx::Error) -> velora_core::EngineError {
    velora_core::EngineError::Persistence(e.to_string())
}

pub(crate) fn row_err(e: impl std::fmt::Display) -> velora_core::EngineError {
    velora_core::EngineError::Persistence(format!("corrupt row: {e}"))
}
