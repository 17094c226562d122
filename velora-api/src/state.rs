use std::sync::Arc;
use velora_core::adapters::ProofStorage;
use velora_fraud::CounterStore;
use velora_order::FulfillmentManager;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<FulfillmentManager>,
    pub counters: Arc<dyn CounterStore>,
    pub proof_storage: Arc<dyn ProofStorage>,
    pub auth: AuthConfig,
    pub http_rate_limit_per_minute: u64,
}
