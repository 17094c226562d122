use crate::error::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Commission computed for the referral chain when an order is delivered.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CommissionResult {
    pub order_id: i64,
    pub beneficiary_count: u32,
    pub total_commission_minor: i64,
    pub computed_at: DateTime<Utc>,
}

/// External referral/commission calculator, invoked fire-and-forget when an
/// order reaches delivered. A failure here is logged and never rolls the
/// delivery back.
#[async_trait]
pub trait CommissionCalculator: Send + Sync {
    async fn on_order_delivered(
        &self,
        order_id: i64,
        total_minor: i64,
    ) -> Result<CommissionResult, EngineError>;
}

/// External file store accepting proof-of-delivery bytes and returning an
/// opaque reference to the stored artifact.
#[async_trait]
pub trait ProofStorage: Send + Sync {
    async fn store_proof(&self, order_id: i64, bytes: &[u8]) -> Result<String, EngineError>;
}

/// Best-effort notification sender. Callers never propagate its failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, topic: &str, key: &str, payload: &str) -> Result<(), EngineError>;
}

/// In-process commission calculator used in development wiring and tests;
/// production deployments swap in the referral service client.
pub struct MockCommissionCalculator;

#[async_trait]
impl CommissionCalculator for MockCommissionCalculator {
    async fn on_order_delivered(
        &self,
        order_id: i64,
        total_minor: i64,
    ) -> Result<CommissionResult, EngineError> {
        // Flat 2% spread across a single referral level.
        Ok(CommissionResult {
            order_id,
            beneficiary_count: 1,
            total_commission_minor: total_minor / 50,
            computed_at: Utc::now(),
        })
    }
}

/// Proof store that derives a deterministic reference without touching a
/// filesystem. Production deployments swap in the object-storage client.
pub struct MockProofStorage;

#[async_trait]
impl ProofStorage for MockProofStorage {
    async fn store_proof(&self, order_id: i64, bytes: &[u8]) -> Result<String, EngineError> {
        if bytes.is_empty() {
            return Err(EngineError::MissingProof);
        }
        Ok(format!("proof/{}/{}", order_id, uuid::Uuid::new_v4().simple()))
    }
}

/// Notifier that drops messages after logging them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, topic: &str, key: &str, _payload: &str) -> Result<(), EngineError> {
        tracing::debug!("notification {} -> {}", topic, key);
        Ok(())
    }
}
