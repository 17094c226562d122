use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderCreatedEvent {
    pub order_id: i64,
    pub customer_id: i64,
    pub total_minor: i64,
    pub payment_method: String,
    pub delivery_city: String,
    pub fraud_trace_id: Uuid,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderAssignedEvent {
    pub order_id: i64,
    pub worker_id: i64,
    pub worker_role: String,
    pub reassignment: bool,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderDeliveredEvent {
    pub order_id: i64,
    pub courier_id: Option<i64>,
    pub proof_ref: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct CodCollectedEvent {
    pub order_id: i64,
    pub courier_id: i64,
    pub collected_minor: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BatchSettledEvent {
    pub batch_id: i64,
    pub courier_id: i64,
    pub total_minor: i64,
    pub entry_count: i64,
    pub timestamp: i64,
}
