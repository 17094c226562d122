use crate::activity::actions;
use crate::manager::FulfillmentManager;
use crate::models::{
    AttemptOutcome, DeliveryAttempt, NewDeliveryAttempt, Order, OrderActivity, OrderStatus,
    PaymentMethod, PaymentStatus,
};
use serde::Serialize;
use serde_json::json;
use velora_core::{Actor, ActorRole, EngineError};

/// Statuses from which a courier can stand at the door.
fn out_for_delivery(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::InTransit | OrderStatus::PickedUp | OrderStatus::Shipped
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryConfirmation {
    pub order: Order,
    pub attempt: DeliveryAttempt,
    pub activity: OrderActivity,
    /// True when a pending COD settlement entry was opened for the courier.
    pub settlement_opened: bool,
}

impl FulfillmentManager {
    /// Records a failed or partial delivery visit. Pure audit: the order
    /// status does not move, so repeated attempts stack up in the ledger
    /// until one of them confirms or the order is returned.
    pub async fn attempt_delivery(
        &self,
        order_id: i64,
        reason: &str,
        actor: Actor,
    ) -> Result<DeliveryAttempt, EngineError> {
        Self::ensure_role(
            actor,
            &[ActorRole::Courier, ActorRole::Admin],
            "record delivery attempts",
        )?;
        if reason.trim().is_empty() {
            return Err(EngineError::Validation(
                "delivery attempt needs a reason".into(),
            ));
        }

        let order = self.load_order(order_id).await?;
        Self::ensure_not_terminal(&order, actor)?;
        if !out_for_delivery(order.status) {
            return Err(EngineError::Validation(format!(
                "order {order_id} is not out for delivery ({})",
                order.status
            )));
        }

        let attempt = self
            .deliveries
            .record_attempt(NewDeliveryAttempt {
                order_id,
                courier_id: (actor.role == ActorRole::Courier).then_some(actor.id),
                reason: reason.trim().to_string(),
                proof_ref: None,
                otp_used: false,
                signature_captured: false,
                outcome: AttemptOutcome::Attempted,
            })
            .await?;
        self.activity
            .append(crate::activity::record(
                order_id,
                actions::DELIVERY_ATTEMPTED,
                actor,
                json!({ "reason": reason.trim(), "attempt_id": attempt.id }),
            ))
            .await?;
        Ok(attempt)
    }

    /// Confirms delivery against a stored proof artifact. The proof
    /// reference is mandatory; OTP and signature are corroboration only.
    /// Drives the courier edge into delivered (claiming the slot when
    /// empty), stamps delivered_at, and opens the COD settlement entry
    /// when cash is still owed.
    pub async fn confirm_delivery(
        &self,
        order_id: i64,
        proof_ref: Option<&str>,
        otp_used: bool,
        signature_captured: bool,
        actor: Actor,
    ) -> Result<DeliveryConfirmation, EngineError> {
        Self::ensure_role(
            actor,
            &[ActorRole::Courier, ActorRole::Admin],
            "confirm deliveries",
        )?;
        let proof = match proof_ref.map(str::trim) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => return Err(EngineError::MissingProof),
        };

        let order = self.load_order(order_id).await?;
        let (record, _claimed) = self
            .apply_transition(
                &order,
                OrderStatus::Delivered,
                actor,
                actions::DELIVERY_CONFIRMED,
                json!({
                    "proof_ref": proof,
                    "otp_used": otp_used,
                    "signature_captured": signature_captured,
                }),
            )
            .await?;

        let attempt = self
            .deliveries
            .record_attempt(NewDeliveryAttempt {
                order_id,
                courier_id: (actor.role == ActorRole::Courier)
                    .then_some(actor.id)
                    .or(order.assigned_courier_id),
                reason: "delivered".to_string(),
                proof_ref: Some(proof.clone()),
                otp_used,
                signature_captured,
                outcome: AttemptOutcome::Delivered,
            })
            .await?;

        let delivered = self.load_order(order_id).await?;
        let mut settlement_opened = false;
        if delivered.payment_method == PaymentMethod::Cod
            && delivered.payment_status == PaymentStatus::Pending
        {
            let courier_id = delivered
                .assigned_courier_id
                .unwrap_or(actor.id);
            self.settlements
                .open_pending(order_id, courier_id, delivered.total_minor)
                .await?;
            settlement_opened = true;
        }

        self.run_delivery_side_effects(&delivered, &proof).await;

        Ok(DeliveryConfirmation {
            order: delivered,
            attempt,
            activity: record,
            settlement_opened,
        })
    }
}
