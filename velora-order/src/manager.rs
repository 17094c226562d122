use crate::activity::{self, actions};
use crate::lifecycle;
use crate::models::{
    AssigneeSlot, CodSettlement, DeliveryAttempt, NewOrder, Order, OrderActivity, OrderStatus,
    PaymentMethod,
};
use crate::repository::{
    ActivityRepository, DeliveryRepository, OrderRepository, SettlementRepository,
    WorkerRepository,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use velora_core::adapters::{CommissionCalculator, Notifier};
use velora_core::{Actor, ActorRole, EngineError};
use velora_fraud::{FraudGate, PaymentRequest};

/// One cart line as priced upstream; the engine never recomputes prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: i64,
    pub name: String,
    pub quantity: u32,
    pub price_minor: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub recipient: String,
    pub phone: String,
    pub address_line: String,
    pub city: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: i64,
    pub lines: Vec<CartLine>,
    pub shipping: ShippingInfo,
    pub payment_method: PaymentMethod,
    pub client_ip: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedOrder {
    pub order: Order,
    pub fraud_trace_id: Uuid,
    pub fraud_score: u32,
    pub assigned_staff_id: Option<i64>,
}

/// Full read model for one order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    pub order: Order,
    pub attempts: Vec<DeliveryAttempt>,
    pub settlement: Option<CodSettlement>,
}

/// Orchestrates the fulfillment lifecycle across the component ledgers.
/// Stateless per request: every mutation is a single-row compare-and-set
/// against the previously read order, and a lost race surfaces as
/// `ConcurrencyConflict` for the caller to retry once.
pub struct FulfillmentManager {
    pub(crate) orders: Arc<dyn OrderRepository>,
    pub(crate) workers: Arc<dyn WorkerRepository>,
    pub(crate) activity: Arc<dyn ActivityRepository>,
    pub(crate) deliveries: Arc<dyn DeliveryRepository>,
    pub(crate) settlements: Arc<dyn SettlementRepository>,
    pub(crate) fraud: Arc<FraudGate>,
    pub(crate) commission: Arc<dyn CommissionCalculator>,
    pub(crate) notifier: Arc<dyn Notifier>,
}

impl FulfillmentManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        workers: Arc<dyn WorkerRepository>,
        activity: Arc<dyn ActivityRepository>,
        deliveries: Arc<dyn DeliveryRepository>,
        settlements: Arc<dyn SettlementRepository>,
        fraud: Arc<FraudGate>,
        commission: Arc<dyn CommissionCalculator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            orders,
            workers,
            activity,
            deliveries,
            settlements,
            fraud,
            commission,
            notifier,
        }
    }

    /// Creates an order from an upstream-priced cart. The fraud gate runs
    /// before anything is written; a blocked or rate-limited submission
    /// leaves no order behind, only the persisted assessment.
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CreatedOrder, EngineError> {
        if request.lines.is_empty() {
            return Err(EngineError::Validation("cart is empty".into()));
        }
        let city = request.shipping.city.trim();
        if city.is_empty() {
            return Err(EngineError::Validation(
                "shipping address has no city".into(),
            ));
        }
        let total_minor: i64 = request
            .lines
            .iter()
            .map(|l| l.price_minor * i64::from(l.quantity))
            .sum();
        if total_minor <= 0 {
            return Err(EngineError::Validation("order total must be positive".into()));
        }
        let max_item_quantity = request.lines.iter().map(|l| l.quantity).max().unwrap_or(0);

        let assessment = self
            .fraud
            .check_payment(&PaymentRequest {
                user_id: request.customer_id,
                amount_minor: total_minor,
                is_cod: request.payment_method == PaymentMethod::Cod,
                max_item_quantity,
                client_ip: request.client_ip.clone(),
            })
            .await?;

        let order = self
            .orders
            .insert_order(NewOrder {
                customer_id: request.customer_id,
                payment_method: request.payment_method,
                total_minor,
                delivery_city: city.to_string(),
            })
            .await?;

        if let Err(e) = self.fraud.attach_order(assessment.trace_id, order.id).await {
            tracing::warn!(order_id = order.id, "failed to attach order to assessment: {e}");
        }

        self.activity
            .append(activity::record_system(
                order.id,
                actions::ORDER_CREATED,
                json!({
                    "total_minor": total_minor,
                    "payment_method": request.payment_method.as_str(),
                    "delivery_city": city,
                }),
            ))
            .await?;
        self.activity
            .append(activity::record_system(
                order.id,
                actions::FRAUD_ASSESSED,
                json!({
                    "trace_id": assessment.trace_id,
                    "score": assessment.score,
                    "decision": assessment.decision.as_str(),
                    "indicators": assessment.indicators,
                }),
            ))
            .await?;

        // City-matched packaging staff, best-effort; an unstaffed city
        // leaves the order claimable by the first responder.
        let assigned_staff_id = match self.auto_assign_staff(&order).await {
            Ok(worker_id) => worker_id,
            Err(e) => {
                tracing::warn!(order_id = order.id, "auto-assignment failed: {e}");
                None
            }
        };

        self.notify_event(
            "orders.created",
            &order.id.to_string(),
            &velora_shared::events::OrderCreatedEvent {
                order_id: order.id,
                customer_id: order.customer_id,
                total_minor,
                payment_method: order.payment_method.as_str().to_string(),
                delivery_city: order.delivery_city.clone(),
                fraud_trace_id: assessment.trace_id,
                timestamp: Utc::now().timestamp(),
            },
        )
        .await;

        let order = self
            .orders
            .get_order(order.id)
            .await?
            .ok_or(EngineError::not_found("order", order.id))?;

        Ok(CreatedOrder {
            fraud_trace_id: assessment.trace_id,
            fraud_score: assessment.score,
            assigned_staff_id,
            order,
        })
    }

    /// Applies one role-scoped status transition. When the acting worker's
    /// slot on the order is empty, the worker is bound as assignee in the
    /// same compare-and-set that moves the status (claim-on-first-action),
    /// and the single activity record carries both deltas.
    pub async fn transition(
        &self,
        order_id: i64,
        target: OrderStatus,
        actor: Actor,
    ) -> Result<OrderActivity, EngineError> {
        let order = self.load_order(order_id).await?;
        let (record, _claimed) = self
            .apply_transition(&order, target, actor, actions::ORDER_TRANSITION, json!({}))
            .await?;

        if target == OrderStatus::Delivered {
            // Re-read so a claim made in the same write shows up in the event.
            let delivered = self.load_order(order_id).await.unwrap_or(order);
            self.run_delivery_side_effects(&delivered, "").await;
        }
        Ok(record)
    }

    pub async fn order_view(&self, order_id: i64) -> Result<OrderView, EngineError> {
        let order = self.load_order(order_id).await?;
        let attempts = self.deliveries.list_for_order(order_id).await?;
        let settlement = self.settlements.find_by_order(order_id).await?;
        Ok(OrderView {
            order,
            attempts,
            settlement,
        })
    }

    pub async fn activity_for(&self, order_id: i64) -> Result<Vec<OrderActivity>, EngineError> {
        self.load_order(order_id).await?;
        self.activity.list_for_order(order_id).await
    }

    pub(crate) async fn load_order(&self, order_id: i64) -> Result<Order, EngineError> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or(EngineError::not_found("order", order_id))
    }

    /// Shared transition applier: validates the edge against the table,
    /// resolves the claim, performs the CAS and appends the one activity
    /// record for the transition. Returns the record and whether the
    /// actor claimed the order on the way.
    pub(crate) async fn apply_transition(
        &self,
        order: &Order,
        target: OrderStatus,
        actor: Actor,
        action: &str,
        extra_detail: serde_json::Value,
    ) -> Result<(OrderActivity, bool), EngineError> {
        lifecycle::validate(order.status, target, actor.role)?;

        let delivered_at = (target == OrderStatus::Delivered).then(Utc::now);
        let mut claimed = false;
        let applied = match AssigneeSlot::for_role(actor.role) {
            None => {
                self.orders
                    .cas_transition(order.id, order.status, target, delivered_at)
                    .await?
            }
            Some(slot) => match order.assignee(slot) {
                None => {
                    claimed = true;
                    self.orders
                        .cas_claim_and_transition(
                            order.id,
                            order.status,
                            target,
                            slot,
                            actor.id,
                            delivered_at,
                        )
                        .await?
                }
                Some(worker_id) if worker_id == actor.id => {
                    self.orders
                        .cas_transition(order.id, order.status, target, delivered_at)
                        .await?
                }
                Some(_) => {
                    return Err(EngineError::Authorization {
                        role: actor.role,
                        action: format!("act on order {} assigned to another worker", order.id),
                    })
                }
            },
        };
        if !applied {
            return Err(EngineError::ConcurrencyConflict(order.id));
        }

        let mut detail = json!({
            "from": order.status.as_str(),
            "to": target.as_str(),
            "claimed": claimed,
        });
        if let (Some(base), Some(extra)) = (detail.as_object_mut(), extra_detail.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        let record = self
            .activity
            .append(activity::record(order.id, action, actor, detail))
            .await?;
        Ok((record, claimed))
    }

    /// Referral commission and delivery notification, both best-effort.
    /// Neither failure rolls the delivery back.
    pub(crate) async fn run_delivery_side_effects(&self, order: &Order, proof_ref: &str) {
        match self
            .commission
            .on_order_delivered(order.id, order.total_minor)
            .await
        {
            Ok(result) => tracing::info!(
                order_id = order.id,
                commission_minor = result.total_commission_minor,
                "referral commission computed"
            ),
            Err(e) => tracing::warn!(
                order_id = order.id,
                "referral commission failed, continuing: {e}"
            ),
        }
        self.notify_event(
            "orders.delivered",
            &order.id.to_string(),
            &velora_shared::events::OrderDeliveredEvent {
                order_id: order.id,
                courier_id: order.assigned_courier_id,
                proof_ref: proof_ref.to_string(),
                timestamp: Utc::now().timestamp(),
            },
        )
        .await;
    }

    pub(crate) async fn notify_event<T: Serialize>(&self, topic: &str, key: &str, event: &T) {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("failed to serialize {topic} event: {e}");
                return;
            }
        };
        if let Err(e) = self.notifier.notify(topic, key, &payload).await {
            tracing::warn!("notification {topic}/{key} failed, continuing: {e}");
        }
    }

    pub(crate) fn ensure_role(
        actor: Actor,
        allowed: &[ActorRole],
        doing: &str,
    ) -> Result<(), EngineError> {
        if allowed.contains(&actor.role) {
            Ok(())
        } else {
            Err(EngineError::Authorization {
                role: actor.role,
                action: doing.to_string(),
            })
        }
    }

    /// Terminal orders accept no further writes of any kind.
    pub(crate) fn ensure_not_terminal(order: &Order, actor: Actor) -> Result<(), EngineError> {
        if lifecycle::is_terminal(order.status) {
            return Err(EngineError::InvalidTransition {
                from: order.status.to_string(),
                to: order.status.to_string(),
                role: actor.role,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::memory::{MemoryAssessments, MemoryStore};
    use crate::models::{PaymentStatus, Worker, WorkerRole};
    use velora_core::adapters::{LogNotifier, MockCommissionCalculator};
    use velora_fraud::{FraudPolicy, MemoryCounterStore};

    pub(crate) struct Harness {
        pub store: Arc<MemoryStore>,
        pub assessments: Arc<MemoryAssessments>,
        pub manager: FulfillmentManager,
    }

    pub(crate) fn harness() -> Harness {
        harness_with_policy(FraudPolicy::default())
    }

    pub(crate) fn harness_with_policy(policy: FraudPolicy) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let assessments = Arc::new(MemoryAssessments::new());
        let gate = Arc::new(FraudGate::new(
            Arc::new(MemoryCounterStore::new()),
            assessments.clone(),
            policy,
        ));
        let manager = FulfillmentManager::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            gate,
            Arc::new(MockCommissionCalculator),
            Arc::new(LogNotifier),
        );
        Harness {
            store,
            assessments,
            manager,
        }
    }

    pub(crate) fn worker(id: i64, role: WorkerRole, city: Option<&str>) -> Worker {
        Worker {
            id,
            name: format!("worker-{id}"),
            role,
            operating_city: city.map(str::to_string),
            active: true,
        }
    }

    pub(crate) fn order_at(id: i64, status: OrderStatus) -> Order {
        Order {
            id,
            customer_id: 900,
            status,
            payment_status: PaymentStatus::Pending,
            payment_method: PaymentMethod::Cod,
            total_minor: 48_000,
            delivery_city: "Dhaka".to_string(),
            assigned_staff_id: None,
            assigned_courier_id: None,
            packaged_count: 0,
            created_at: Utc::now(),
            delivered_at: None,
        }
    }

    pub(crate) fn create_request(customer_id: i64) -> CreateOrderRequest {
        CreateOrderRequest {
            customer_id,
            lines: vec![CartLine {
                product_id: 11,
                name: "ceramic mug".to_string(),
                quantity: 2,
                price_minor: 1_200,
            }],
            shipping: ShippingInfo {
                recipient: "A. Rahman".to_string(),
                phone: "01700000000".to_string(),
                address_line: "12 Lake Road".to_string(),
                city: "Dhaka".to_string(),
            },
            payment_method: PaymentMethod::Cod,
            client_ip: "198.51.100.7".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::models::WorkerRole;
    use velora_fraud::{Decision, FraudPolicy};

    #[tokio::test]
    async fn create_order_passes_gate_and_auto_assigns_city_staff() {
        let h = harness();
        h.store
            .insert_worker(worker(5, WorkerRole::Staff, Some("Dhaka")));
        h.store
            .insert_worker(worker(6, WorkerRole::Staff, Some("Khulna")));

        let created = h.manager.create_order(create_request(900)).await.unwrap();
        assert_eq!(created.order.status, OrderStatus::Pending);
        assert_eq!(created.assigned_staff_id, Some(5));
        assert_eq!(created.order.assigned_staff_id, Some(5));

        let log = h.store.activity_log();
        let actions: Vec<&str> = log.iter().map(|a| a.action.as_str()).collect();
        assert!(actions.contains(&"order.created"));
        assert!(actions.contains(&"fraud.assessed"));
        assert!(actions.contains(&"order.assigned"));
    }

    #[tokio::test]
    async fn blocked_creation_leaves_no_order_but_keeps_the_assessment() {
        let h = harness();
        let mut request = create_request(901);
        // High amount + over the COD ceiling + fresh account: 75 points.
        request.lines = vec![CartLine {
            product_id: 3,
            name: "bulk lot".to_string(),
            quantity: 1,
            price_minor: 250_000,
        }];

        let err = h.manager.create_order(request).await.unwrap_err();
        assert!(matches!(err, EngineError::FraudBlocked { .. }));
        assert!(h.store.activity_log().is_empty());

        let rows = h.assessments.all();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].decision, Decision::Block);
        assert_eq!(rows[0].order_id, None);
    }

    #[tokio::test]
    async fn unenforced_block_still_creates_the_order() {
        let h = harness_with_policy(FraudPolicy {
            enforce: false,
            ..FraudPolicy::default()
        });
        let mut request = create_request(902);
        request.lines = vec![CartLine {
            product_id: 3,
            name: "bulk lot".to_string(),
            quantity: 1,
            price_minor: 250_000,
        }];

        let created = h.manager.create_order(request).await.unwrap();
        assert!(created.fraud_score >= 50);
        let rows = h.assessments.all();
        assert_eq!(rows[0].decision, Decision::Block);
        assert_eq!(rows[0].order_id, Some(created.order.id));
    }

    #[tokio::test]
    async fn courier_claims_unassigned_order_on_first_pickup() {
        let h = harness();
        h.store.put_order(order_at(70, OrderStatus::Processing));

        let record = h
            .manager
            .transition(70, OrderStatus::PickedUp, Actor::courier(31))
            .await
            .unwrap();
        assert_eq!(record.detail["claimed"], true);

        let order = h.manager.load_order(70).await.unwrap();
        assert_eq!(order.status, OrderStatus::PickedUp);
        assert_eq!(order.assigned_courier_id, Some(31));
    }

    #[tokio::test]
    async fn assigned_order_rejects_a_different_courier() {
        let h = harness();
        let mut order = order_at(71, OrderStatus::Processing);
        order.assigned_courier_id = Some(31);
        h.store.put_order(order);

        let err = h
            .manager
            .transition(71, OrderStatus::PickedUp, Actor::courier(32))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Authorization { .. }));
    }

    #[tokio::test]
    async fn delivered_orders_never_transition_again() {
        let h = harness();
        h.store.put_order(order_at(72, OrderStatus::Delivered));

        for (target, actor) in [
            (OrderStatus::Processing, Actor::staff(1)),
            (OrderStatus::InTransit, Actor::courier(2)),
            (OrderStatus::Cancelled, Actor::admin(3)),
        ] {
            let err = h.manager.transition(72, target, actor).await.unwrap_err();
            assert!(
                matches!(err, EngineError::InvalidTransition { .. }),
                "{target} should be rejected"
            );
        }
        assert!(h.store.activity_log().is_empty());
    }

    #[tokio::test]
    async fn illegal_edge_writes_no_activity_record() {
        let h = harness();
        h.store.put_order(order_at(73, OrderStatus::Pending));

        let err = h
            .manager
            .transition(73, OrderStatus::Delivered, Actor::staff(4))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        assert!(h.store.activity_log().is_empty());
    }

    #[tokio::test]
    async fn admin_walks_the_return_branch() {
        let h = harness();
        h.store.put_order(order_at(74, OrderStatus::InTransit));
        let admin = Actor::admin(9);

        for target in [
            OrderStatus::ReturnRequested,
            OrderStatus::ReturnPickedUp,
            OrderStatus::ReturnInTransit,
            OrderStatus::Returned,
        ] {
            h.manager.transition(74, target, admin).await.unwrap();
        }
        let order = h.manager.load_order(74).await.unwrap();
        assert_eq!(order.status, OrderStatus::Returned);
    }
}
