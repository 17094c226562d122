use crate::activity::{self, actions};
use crate::manager::FulfillmentManager;
use crate::models::{
    CodSettlement, PaymentMethod, PaymentStatus, SettlementBatch, WorkerRole,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use velora_core::{Actor, ActorRole, EngineError};

/// One cleared entry in a settlement report, with the collected amount
/// reconciled against the order total.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementLine {
    pub order_id: i64,
    pub collected_minor: i64,
    pub order_total_minor: i64,
    pub variance_minor: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementReport {
    pub batch: SettlementBatch,
    pub lines: Vec<SettlementLine>,
}

impl FulfillmentManager {
    /// Records the cash a courier took at the door. The caller-supplied
    /// amount is trusted as stated: the field courier is the boundary, and
    /// any variance against the order total is surfaced in the settlement
    /// report instead of blocking the collection.
    pub async fn collect_cod(
        &self,
        order_id: i64,
        amount_minor: i64,
        actor: Actor,
    ) -> Result<CodSettlement, EngineError> {
        Self::ensure_role(
            actor,
            &[ActorRole::Courier, ActorRole::Admin],
            "collect cash on delivery",
        )?;
        if amount_minor <= 0 {
            return Err(EngineError::Validation(
                "collected amount must be positive".into(),
            ));
        }

        let order = self.load_order(order_id).await?;
        if order.payment_method != PaymentMethod::Cod {
            return Err(EngineError::Validation(format!(
                "order {order_id} is not cash on delivery"
            )));
        }
        if order.payment_status != PaymentStatus::Pending {
            return Err(EngineError::Validation(format!(
                "order {order_id} is already {}",
                order.payment_status.as_str()
            )));
        }
        if actor.role == ActorRole::Courier {
            if let Some(assigned) = order.assigned_courier_id {
                if assigned != actor.id {
                    return Err(EngineError::Authorization {
                        role: actor.role,
                        action: format!("collect for order {order_id} held by another courier"),
                    });
                }
            }
        }

        if !self.orders.cas_mark_paid_cod(order_id).await? {
            return Err(EngineError::ConcurrencyConflict(order_id));
        }

        let courier_id = if actor.role == ActorRole::Courier {
            actor.id
        } else {
            order.assigned_courier_id.unwrap_or(actor.id)
        };
        let entry = self
            .settlements
            .upsert_collected(order_id, courier_id, amount_minor)
            .await?
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "settlement for order {order_id} is already cleared"
                ))
            })?;

        let variance = amount_minor - order.total_minor;
        if variance != 0 {
            tracing::warn!(
                order_id,
                collected = amount_minor,
                expected = order.total_minor,
                "COD collection differs from order total"
            );
        }
        self.activity
            .append(activity::record(
                order_id,
                actions::COD_COLLECTED,
                actor,
                json!({
                    "collected_minor": amount_minor,
                    "variance_minor": variance,
                }),
            ))
            .await?;
        self.notify_event(
            "cod.collected",
            &order_id.to_string(),
            &velora_shared::events::CodCollectedEvent {
                order_id,
                courier_id,
                collected_minor: amount_minor,
                timestamp: Utc::now().timestamp(),
            },
        )
        .await;

        Ok(entry)
    }

    /// Groups a courier's collected cash into one batch for back-office
    /// clearing. Entries move collected -> settled; settled is terminal
    /// and the batch report carries the per-order variance.
    pub async fn settle_batch(
        &self,
        courier_id: i64,
        actor: Actor,
    ) -> Result<SettlementReport, EngineError> {
        Self::ensure_role(actor, &[ActorRole::Admin], "clear settlement batches")?;

        let courier = self
            .workers
            .get_worker(courier_id)
            .await?
            .ok_or(EngineError::not_found("worker", courier_id))?;
        if courier.role != WorkerRole::Courier {
            return Err(EngineError::Validation(format!(
                "worker {courier_id} is not a courier"
            )));
        }

        let entries = self.settlements.list_collected(courier_id).await?;
        if entries.is_empty() {
            return Err(EngineError::Validation(format!(
                "courier {courier_id} has no collected cash to settle"
            )));
        }
        let total_minor: i64 = entries.iter().map(|e| e.collected_minor).sum();

        let batch = self
            .settlements
            .create_batch(courier_id, total_minor, entries.len() as i64)
            .await?;
        let moved = self
            .settlements
            .settle_into_batch(courier_id, batch.id)
            .await?;
        if moved != entries.len() as u64 {
            tracing::warn!(
                courier_id,
                listed = entries.len(),
                moved,
                "settlement batch raced a concurrent collection"
            );
        }

        let mut lines = Vec::with_capacity(entries.len());
        for entry in &entries {
            let order = self.load_order(entry.order_id).await?;
            lines.push(SettlementLine {
                order_id: entry.order_id,
                collected_minor: entry.collected_minor,
                order_total_minor: order.total_minor,
                variance_minor: entry.collected_minor - order.total_minor,
            });
            self.activity
                .append(activity::record(
                    entry.order_id,
                    actions::COD_SETTLED,
                    actor,
                    json!({
                        "batch_id": batch.id,
                        "collected_minor": entry.collected_minor,
                    }),
                ))
                .await?;
        }

        self.notify_event(
            "cod.settled",
            &batch.id.to_string(),
            &velora_shared::events::BatchSettledEvent {
                batch_id: batch.id,
                courier_id,
                total_minor,
                entry_count: batch.entry_count,
                timestamp: Utc::now().timestamp(),
            },
        )
        .await;

        Ok(SettlementReport { batch, lines })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::testutil::*;
    use crate::models::{OrderStatus, SettlementStatus};

    #[tokio::test]
    async fn collect_marks_the_order_paid_and_the_entry_collected() {
        let h = harness();
        let mut order = order_at(50, OrderStatus::Delivered);
        order.assigned_courier_id = Some(14);
        h.store.put_order(order);

        let entry = h
            .manager
            .collect_cod(50, 48_000, Actor::courier(14))
            .await
            .unwrap();
        assert_eq!(entry.status, SettlementStatus::Collected);
        assert_eq!(entry.collected_minor, 48_000);

        let order = h.manager.load_order(50).await.unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn collect_is_rejected_for_prepaid_orders() {
        let h = harness();
        let mut order = order_at(51, OrderStatus::Delivered);
        order.payment_method = PaymentMethod::Online;
        h.store.put_order(order);

        let err = h
            .manager
            .collect_cod(51, 48_000, Actor::courier(14))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn collect_is_rejected_once_paid() {
        let h = harness();
        let mut order = order_at(52, OrderStatus::Delivered);
        order.assigned_courier_id = Some(14);
        h.store.put_order(order);
        let courier = Actor::courier(14);

        h.manager.collect_cod(52, 48_000, courier).await.unwrap();
        let err = h.manager.collect_cod(52, 48_000, courier).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn variance_is_recorded_not_rejected() {
        let h = harness();
        let mut order = order_at(53, OrderStatus::Delivered);
        order.assigned_courier_id = Some(14);
        h.store.put_order(order);

        // Courier reports 500 short of the 48_000 total.
        h.manager
            .collect_cod(53, 47_500, Actor::courier(14))
            .await
            .unwrap();
        let log = h.store.activity_log();
        let record = log.iter().find(|a| a.action == "cod.collected").unwrap();
        assert_eq!(record.detail["variance_minor"], -500);
    }

    #[tokio::test]
    async fn settle_batch_groups_collected_entries_and_is_terminal() {
        let h = harness();
        h.store
            .insert_worker(worker(14, WorkerRole::Courier, Some("Dhaka")));
        for id in [54, 55] {
            let mut order = order_at(id, OrderStatus::Delivered);
            order.assigned_courier_id = Some(14);
            h.store.put_order(order);
            h.manager
                .collect_cod(id, 48_000, Actor::courier(14))
                .await
                .unwrap();
        }

        let report = h
            .manager
            .settle_batch(14, Actor::admin(2))
            .await
            .unwrap();
        assert_eq!(report.batch.entry_count, 2);
        assert_eq!(report.batch.total_minor, 96_000);
        assert_eq!(report.lines.len(), 2);
        assert!(report.lines.iter().all(|l| l.variance_minor == 0));

        for id in [54, 55] {
            let entry = h
                .manager
                .settlements
                .find_by_order(id)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(entry.status, SettlementStatus::Settled);
            assert_eq!(entry.settlement_batch_id, Some(report.batch.id));
        }

        // Nothing left to settle: the batch is closed and immutable.
        let err = h
            .manager
            .settle_batch(14, Actor::admin(2))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn couriers_cannot_clear_their_own_batch() {
        let h = harness();
        h.store
            .insert_worker(worker(14, WorkerRole::Courier, Some("Dhaka")));

        let err = h
            .manager
            .settle_batch(14, Actor::courier(14))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Authorization { .. }));
    }

    #[tokio::test]
    async fn another_courier_cannot_collect_for_an_assigned_order() {
        let h = harness();
        let mut order = order_at(56, OrderStatus::Delivered);
        order.assigned_courier_id = Some(14);
        h.store.put_order(order);

        let err = h
            .manager
            .collect_cod(56, 48_000, Actor::courier(15))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Authorization { .. }));
    }
}
