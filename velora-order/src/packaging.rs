use crate::activity::{self, actions};
use crate::lifecycle;
use crate::manager::FulfillmentManager;
use crate::models::{OrderActivity, OrderStatus};
use serde::Serialize;
use serde_json::json;
use velora_core::{Actor, ActorRole, EngineError};

/// Boxes past this count are almost certainly a client retry loop, not a
/// real shipment; they are accepted but logged loudly.
const PACKAGE_COUNT_SANITY: i32 = 50;

#[derive(Debug, Clone, Serialize)]
pub struct PackagingOutcome {
    pub order_id: i64,
    pub packaged_count: i32,
    /// True when this increment moved the order into processing.
    pub transitioned: bool,
    pub activity: OrderActivity,
}

impl FulfillmentManager {
    /// Records one packed parcel. The count is an integer rather than a
    /// flag because multi-parcel orders are packed across several boxes;
    /// only the first increment drives the status change into processing,
    /// claiming the staff slot when it is still empty.
    pub async fn mark_packaged(
        &self,
        order_id: i64,
        actor: Actor,
    ) -> Result<PackagingOutcome, EngineError> {
        Self::ensure_role(actor, &[ActorRole::Staff, ActorRole::Admin], "package orders")?;

        let order = self.load_order(order_id).await?;
        Self::ensure_not_terminal(&order, actor)?;

        let packaged_count = self.orders.increment_packaged(order_id).await?;
        if packaged_count > PACKAGE_COUNT_SANITY {
            tracing::warn!(
                order_id,
                packaged_count,
                "packaging count far beyond any expected parcel split"
            );
        }

        // Status-gated rather than count-gated: the first parcel normally
        // drives the edge, and an increment that raced a failed transition
        // still heals the order instead of stranding it in pending.
        if lifecycle::is_permitted(order.status, OrderStatus::Processing, actor.role) {
            let (record, _claimed) = self
                .apply_transition(
                    &order,
                    OrderStatus::Processing,
                    actor,
                    actions::ORDER_PACKAGED,
                    json!({ "packaged_count": packaged_count }),
                )
                .await?;
            return Ok(PackagingOutcome {
                order_id,
                packaged_count,
                transitioned: true,
                activity: record,
            });
        }

        let record = self
            .activity
            .append(activity::record(
                order_id,
                actions::ORDER_PACKAGED,
                actor,
                json!({ "packaged_count": packaged_count }),
            ))
            .await?;
        Ok(PackagingOutcome {
            order_id,
            packaged_count,
            transitioned: false,
            activity: record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::testutil::*;

    #[tokio::test]
    async fn first_parcel_moves_pending_into_processing_and_claims_staff() {
        let h = harness();
        h.store.put_order(order_at(60, OrderStatus::Pending));

        let outcome = h
            .manager
            .mark_packaged(60, Actor::staff(7))
            .await
            .unwrap();
        assert_eq!(outcome.packaged_count, 1);
        assert!(outcome.transitioned);

        let order = h.manager.load_order(60).await.unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.assigned_staff_id, Some(7));
    }

    #[tokio::test]
    async fn later_parcels_only_count_boxes() {
        let h = harness();
        h.store.put_order(order_at(61, OrderStatus::Confirmed));
        let staff = Actor::staff(7);

        h.manager.mark_packaged(61, staff).await.unwrap();
        let second = h.manager.mark_packaged(61, staff).await.unwrap();
        let third = h.manager.mark_packaged(61, staff).await.unwrap();

        assert_eq!(second.packaged_count, 2);
        assert!(!second.transitioned);
        assert_eq!(third.packaged_count, 3);

        let order = h.manager.load_order(61).await.unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.packaged_count, 3);
    }

    #[tokio::test]
    async fn couriers_may_not_package() {
        let h = harness();
        h.store.put_order(order_at(62, OrderStatus::Pending));

        let err = h
            .manager
            .mark_packaged(62, Actor::courier(3))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Authorization { .. }));
    }

    #[tokio::test]
    async fn packaging_a_cancelled_order_is_rejected() {
        let h = harness();
        h.store.put_order(order_at(63, OrderStatus::Cancelled));

        let err = h
            .manager
            .mark_packaged(63, Actor::staff(7))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn first_parcel_on_an_already_processing_order_does_not_retrigger() {
        let h = harness();
        h.store.put_order(order_at(64, OrderStatus::Processing));

        let outcome = h
            .manager
            .mark_packaged(64, Actor::staff(7))
            .await
            .unwrap();
        assert_eq!(outcome.packaged_count, 1);
        assert!(!outcome.transitioned);
    }
}
