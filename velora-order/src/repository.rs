use crate::models::{
    AssigneeSlot, CodSettlement, DeliveryAttempt, NewDeliveryAttempt, NewOrder, NewOrderActivity,
    Order, OrderActivity, OrderStatus, SettlementBatch, Worker, WorkerRole,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use velora_core::EngineError;

/// Order persistence. Status and assignment writes are single-row
/// compare-and-set operations: each returns whether the guarded UPDATE
/// matched, and a `false` surfaces to callers as `ConcurrencyConflict`.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, EngineError>;

    async fn get_order(&self, id: i64) -> Result<Option<Order>, EngineError>;

    /// status := to, guarded on status = from.
    async fn cas_transition(
        &self,
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
        delivered_at: Option<DateTime<Utc>>,
    ) -> Result<bool, EngineError>;

    /// status := to and the slot := worker in one write, guarded on
    /// status = from and the slot being empty. Backs claim-on-first-action.
    async fn cas_claim_and_transition(
        &self,
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
        slot: AssigneeSlot,
        worker_id: i64,
        delivered_at: Option<DateTime<Utc>>,
    ) -> Result<bool, EngineError>;

    /// slot := worker, guarded on the slot currently holding `expected`.
    async fn cas_assign(
        &self,
        id: i64,
        slot: AssigneeSlot,
        worker_id: i64,
        expected: Option<i64>,
    ) -> Result<bool, EngineError>;

    /// Atomic increment; returns the count after the write.
    async fn increment_packaged(&self, id: i64) -> Result<i32, EngineError>;

    /// payment_status := paid, guarded on method = cod and status = pending.
    async fn cas_mark_paid_cod(&self, id: i64) -> Result<bool, EngineError>;
}

#[async_trait]
pub trait WorkerRepository: Send + Sync {
    async fn get_worker(&self, id: i64) -> Result<Option<Worker>, EngineError>;

    /// Active workers of one role; the resolver does city matching itself.
    async fn list_active(&self, role: WorkerRole) -> Result<Vec<Worker>, EngineError>;
}

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn append(&self, activity: NewOrderActivity) -> Result<OrderActivity, EngineError>;

    async fn list_for_order(&self, order_id: i64) -> Result<Vec<OrderActivity>, EngineError>;
}

#[async_trait]
pub trait DeliveryRepository: Send + Sync {
    async fn record_attempt(
        &self,
        attempt: NewDeliveryAttempt,
    ) -> Result<DeliveryAttempt, EngineError>;

    async fn list_for_order(&self, order_id: i64) -> Result<Vec<DeliveryAttempt>, EngineError>;
}

#[async_trait]
pub trait SettlementRepository: Send + Sync {
    /// Pending entry opened when a COD order is confirmed delivered.
    async fn open_pending(
        &self,
        order_id: i64,
        courier_id: i64,
        amount_minor: i64,
    ) -> Result<CodSettlement, EngineError>;

    async fn find_by_order(&self, order_id: i64) -> Result<Option<CodSettlement>, EngineError>;

    /// Marks the order's entry collected with the courier's stated amount,
    /// creating it when delivery confirmation never opened one. Returns
    /// None when the entry is already settled.
    async fn upsert_collected(
        &self,
        order_id: i64,
        courier_id: i64,
        amount_minor: i64,
    ) -> Result<Option<CodSettlement>, EngineError>;

    async fn list_collected(&self, courier_id: i64) -> Result<Vec<CodSettlement>, EngineError>;

    async fn create_batch(
        &self,
        courier_id: i64,
        total_minor: i64,
        entry_count: i64,
    ) -> Result<SettlementBatch, EngineError>;

    /// Moves the courier's collected entries into the batch and marks them
    /// settled. Returns how many rows moved.
    async fn settle_into_batch(&self, courier_id: i64, batch_id: i64)
        -> Result<u64, EngineError>;
}
