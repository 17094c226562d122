use crate::models::NewOrderActivity;
use velora_core::Actor;

/// Action names recorded in the append-only audit trail.
pub mod actions {
    pub const ORDER_CREATED: &str = "order.created";
    pub const ORDER_ASSIGNED: &str = "order.assigned";
    pub const ORDER_REASSIGNED: &str = "order.reassigned";
    pub const ORDER_TRANSITION: &str = "order.transition";
    pub const ORDER_PACKAGED: &str = "order.packaged";
    pub const DELIVERY_ATTEMPTED: &str = "delivery.attempted";
    pub const DELIVERY_CONFIRMED: &str = "delivery.confirmed";
    pub const COD_COLLECTED: &str = "cod.collected";
    pub const COD_SETTLED: &str = "cod.settled";
    pub const FRAUD_ASSESSED: &str = "fraud.assessed";
}

pub fn record(
    order_id: i64,
    action: &str,
    actor: Actor,
    detail: serde_json::Value,
) -> NewOrderActivity {
    NewOrderActivity {
        order_id,
        action: action.to_string(),
        actor_role: actor.role.to_string(),
        actor_id: Some(actor.id),
        detail,
    }
}

/// Activity attributed to the engine itself rather than a worker, e.g.
/// the fraud assessment written during order creation.
pub fn record_system(order_id: i64, action: &str, detail: serde_json::Value) -> NewOrderActivity {
    NewOrderActivity {
        order_id,
        action: action.to_string(),
        actor_role: "system".to_string(),
        actor_id: None,
        detail,
    }
}
