use crate::models::{
    AssigneeSlot, CodSettlement, DeliveryAttempt, NewDeliveryAttempt, NewOrder, NewOrderActivity,
    Order, OrderActivity, OrderStatus, PaymentStatus, SettlementBatch, SettlementStatus, Worker,
    WorkerRole,
};
use crate::repository::{
    ActivityRepository, DeliveryRepository, OrderRepository, SettlementRepository,
    WorkerRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;
use velora_core::EngineError;
use velora_fraud::gate::{AssessmentStore, FraudAssessment, NewFraudAssessment};

/// In-process store backing unit tests and single-node development runs,
/// mirroring the CAS semantics of the Postgres repositories. Production
/// wiring uses velora-store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    orders: HashMap<i64, Order>,
    workers: HashMap<i64, Worker>,
    activity: Vec<OrderActivity>,
    attempts: Vec<DeliveryAttempt>,
    settlements: HashMap<i64, CodSettlement>,
    batches: Vec<SettlementBatch>,
    next_order: i64,
    next_activity: i64,
    next_attempt: i64,
    next_settlement: i64,
    next_batch: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_worker(&self, worker: Worker) {
        let mut inner = self.lock_unchecked();
        inner.workers.insert(worker.id, worker);
    }

    /// Seeds an order in an arbitrary lifecycle position.
    pub fn put_order(&self, order: Order) {
        let mut inner = self.lock_unchecked();
        inner.next_order = inner.next_order.max(order.id);
        inner.orders.insert(order.id, order);
    }

    pub fn activity_log(&self) -> Vec<OrderActivity> {
        self.lock_unchecked().activity.clone()
    }

    fn lock_unchecked(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, EngineError> {
        self.inner
            .lock()
            .map_err(|_| EngineError::Persistence("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, EngineError> {
        let mut inner = self.lock()?;
        inner.next_order += 1;
        let row = Order {
            id: inner.next_order,
            customer_id: order.customer_id,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: order.payment_method,
            total_minor: order.total_minor,
            delivery_city: order.delivery_city,
            assigned_staff_id: None,
            assigned_courier_id: None,
            packaged_count: 0,
            created_at: Utc::now(),
            delivered_at: None,
        };
        inner.orders.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>, EngineError> {
        Ok(self.lock()?.orders.get(&id).cloned())
    }

    async fn cas_transition(
        &self,
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
        delivered_at: Option<DateTime<Utc>>,
    ) -> Result<bool, EngineError> {
        let mut inner = self.lock()?;
        match inner.orders.get_mut(&id) {
            Some(order) if order.status == from => {
                order.status = to;
                if delivered_at.is_some() {
                    order.delivered_at = delivered_at;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cas_claim_and_transition(
        &self,
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
        slot: AssigneeSlot,
        worker_id: i64,
        delivered_at: Option<DateTime<Utc>>,
    ) -> Result<bool, EngineError> {
        let mut inner = self.lock()?;
        match inner.orders.get_mut(&id) {
            Some(order) if order.status == from && order.assignee(slot).is_none() => {
                order.status = to;
                match slot {
                    AssigneeSlot::Staff => order.assigned_staff_id = Some(worker_id),
                    AssigneeSlot::Courier => order.assigned_courier_id = Some(worker_id),
                }
                if delivered_at.is_some() {
                    order.delivered_at = delivered_at;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cas_assign(
        &self,
        id: i64,
        slot: AssigneeSlot,
        worker_id: i64,
        expected: Option<i64>,
    ) -> Result<bool, EngineError> {
        let mut inner = self.lock()?;
        match inner.orders.get_mut(&id) {
            Some(order) if order.assignee(slot) == expected => {
                match slot {
                    AssigneeSlot::Staff => order.assigned_staff_id = Some(worker_id),
                    AssigneeSlot::Courier => order.assigned_courier_id = Some(worker_id),
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment_packaged(&self, id: i64) -> Result<i32, EngineError> {
        let mut inner = self.lock()?;
        let order = inner
            .orders
            .get_mut(&id)
            .ok_or(EngineError::not_found("order", id))?;
        order.packaged_count += 1;
        Ok(order.packaged_count)
    }

    async fn cas_mark_paid_cod(&self, id: i64) -> Result<bool, EngineError> {
        let mut inner = self.lock()?;
        match inner.orders.get_mut(&id) {
            Some(order)
                if order.payment_method == crate::models::PaymentMethod::Cod
                    && order.payment_status == PaymentStatus::Pending =>
            {
                order.payment_status = PaymentStatus::Paid;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl WorkerRepository for MemoryStore {
    async fn get_worker(&self, id: i64) -> Result<Option<Worker>, EngineError> {
        Ok(self.lock()?.workers.get(&id).cloned())
    }

    async fn list_active(&self, role: WorkerRole) -> Result<Vec<Worker>, EngineError> {
        let inner = self.lock()?;
        let mut workers: Vec<Worker> = inner
            .workers
            .values()
            .filter(|w| w.active && w.role == role)
            .cloned()
            .collect();
        workers.sort_by_key(|w| w.id);
        Ok(workers)
    }
}

#[async_trait]
impl ActivityRepository for MemoryStore {
    async fn append(&self, activity: NewOrderActivity) -> Result<OrderActivity, EngineError> {
        let mut inner = self.lock()?;
        inner.next_activity += 1;
        let row = OrderActivity {
            id: inner.next_activity,
            order_id: activity.order_id,
            action: activity.action,
            actor_role: activity.actor_role,
            actor_id: activity.actor_id,
            detail: activity.detail,
            created_at: Utc::now(),
        };
        inner.activity.push(row.clone());
        Ok(row)
    }

    async fn list_for_order(&self, order_id: i64) -> Result<Vec<OrderActivity>, EngineError> {
        Ok(self
            .lock()?
            .activity
            .iter()
            .filter(|a| a.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DeliveryRepository for MemoryStore {
    async fn record_attempt(
        &self,
        attempt: NewDeliveryAttempt,
    ) -> Result<DeliveryAttempt, EngineError> {
        let mut inner = self.lock()?;
        inner.next_attempt += 1;
        let row = DeliveryAttempt {
            id: inner.next_attempt,
            order_id: attempt.order_id,
            courier_id: attempt.courier_id,
            reason: attempt.reason,
            proof_ref: attempt.proof_ref,
            otp_used: attempt.otp_used,
            signature_captured: attempt.signature_captured,
            outcome: attempt.outcome,
            attempted_at: Utc::now(),
        };
        inner.attempts.push(row.clone());
        Ok(row)
    }

    async fn list_for_order(&self, order_id: i64) -> Result<Vec<DeliveryAttempt>, EngineError> {
        Ok(self
            .lock()?
            .attempts
            .iter()
            .filter(|a| a.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SettlementRepository for MemoryStore {
    async fn open_pending(
        &self,
        order_id: i64,
        courier_id: i64,
        amount_minor: i64,
    ) -> Result<CodSettlement, EngineError> {
        let mut inner = self.lock()?;
        if let Some(existing) = inner.settlements.get(&order_id) {
            return Ok(existing.clone());
        }
        inner.next_settlement += 1;
        let row = CodSettlement {
            id: inner.next_settlement,
            order_id,
            courier_id,
            collected_minor: amount_minor,
            collected_at: None,
            settlement_batch_id: None,
            status: SettlementStatus::Pending,
        };
        inner.settlements.insert(order_id, row.clone());
        Ok(row)
    }

    async fn find_by_order(&self, order_id: i64) -> Result<Option<CodSettlement>, EngineError> {
        Ok(self.lock()?.settlements.get(&order_id).cloned())
    }

    async fn upsert_collected(
        &self,
        order_id: i64,
        courier_id: i64,
        amount_minor: i64,
    ) -> Result<Option<CodSettlement>, EngineError> {
        let mut inner = self.lock()?;
        inner.next_settlement += 1;
        let fallback_id = inner.next_settlement;
        let entry = inner.settlements.entry(order_id).or_insert(CodSettlement {
            id: fallback_id,
            order_id,
            courier_id,
            collected_minor: 0,
            collected_at: None,
            settlement_batch_id: None,
            status: SettlementStatus::Pending,
        });
        if entry.status == SettlementStatus::Settled {
            return Ok(None);
        }
        entry.courier_id = courier_id;
        entry.collected_minor = amount_minor;
        entry.collected_at = Some(Utc::now());
        entry.status = SettlementStatus::Collected;
        Ok(Some(entry.clone()))
    }

    async fn list_collected(&self, courier_id: i64) -> Result<Vec<CodSettlement>, EngineError> {
        let inner = self.lock()?;
        let mut entries: Vec<CodSettlement> = inner
            .settlements
            .values()
            .filter(|s| s.courier_id == courier_id && s.status == SettlementStatus::Collected)
            .cloned()
            .collect();
        entries.sort_by_key(|s| s.id);
        Ok(entries)
    }

    async fn create_batch(
        &self,
        courier_id: i64,
        total_minor: i64,
        entry_count: i64,
    ) -> Result<SettlementBatch, EngineError> {
        let mut inner = self.lock()?;
        inner.next_batch += 1;
        let batch = SettlementBatch {
            id: inner.next_batch,
            courier_id,
            total_minor,
            entry_count,
            created_at: Utc::now(),
        };
        inner.batches.push(batch.clone());
        Ok(batch)
    }

    async fn settle_into_batch(
        &self,
        courier_id: i64,
        batch_id: i64,
    ) -> Result<u64, EngineError> {
        let mut inner = self.lock()?;
        let mut moved = 0;
        for entry in inner.settlements.values_mut() {
            if entry.courier_id == courier_id && entry.status == SettlementStatus::Collected {
                entry.status = SettlementStatus::Settled;
                entry.settlement_batch_id = Some(batch_id);
                moved += 1;
            }
        }
        Ok(moved)
    }
}

/// Assessment store counterpart for tests and development runs.
#[derive(Default)]
pub struct MemoryAssessments {
    rows: Mutex<Vec<FraudAssessment>>,
}

impl MemoryAssessments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<FraudAssessment> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl AssessmentStore for MemoryAssessments {
    async fn persist(
        &self,
        assessment: NewFraudAssessment,
    ) -> Result<FraudAssessment, EngineError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| EngineError::Persistence("assessment lock poisoned".into()))?;
        let row = FraudAssessment {
            id: rows.len() as i64 + 1,
            trace_id: assessment.trace_id,
            user_id: assessment.user_id,
            order_id: assessment.order_id,
            amount_minor: assessment.amount_minor,
            score: assessment.score,
            indicators: assessment.indicators,
            decision: assessment.decision,
            enforced: assessment.enforced,
            created_at: Utc::now(),
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn attach_order(&self, trace_id: Uuid, order_id: i64) -> Result<(), EngineError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| EngineError::Persistence("assessment lock poisoned".into()))?;
        if let Some(row) = rows.iter_mut().find(|r| r.trace_id == trace_id) {
            row.order_id = Some(order_id);
        }
        Ok(())
    }
}
