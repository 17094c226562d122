use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use velora_core::ActorRole;

/// Order status along the fulfillment lifecycle. The forward chain runs
/// pending through delivered; the return branch forks off after pickup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    ReadyForPickup,
    PickedUp,
    InTransit,
    Shipped,
    Delivered,
    Cancelled,
    ReturnRequested,
    ReturnPickedUp,
    ReturnInTransit,
    Returned,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 13] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::ReadyForPickup,
        OrderStatus::PickedUp,
        OrderStatus::InTransit,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::ReturnRequested,
        OrderStatus::ReturnPickedUp,
        OrderStatus::ReturnInTransit,
        OrderStatus::Returned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::ReadyForPickup => "ready_for_pickup",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::ReturnRequested => "return_requested",
            OrderStatus::ReturnPickedUp => "return_picked_up",
            OrderStatus::ReturnInTransit => "return_in_transit",
            OrderStatus::Returned => "returned",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .iter()
            .find(|v| v.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cod,
    Online,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::Online => "online",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cod" => Ok(PaymentMethod::Cod),
            "online" => Ok(PaymentMethod::Online),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

/// Which assignee slot on the order a worker role occupies. Admins act on
/// any order without holding a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssigneeSlot {
    Staff,
    Courier,
}

impl AssigneeSlot {
    pub fn for_role(role: ActorRole) -> Option<AssigneeSlot> {
        match role {
            ActorRole::Staff => Some(AssigneeSlot::Staff),
            ActorRole::Courier => Some(AssigneeSlot::Courier),
            ActorRole::Admin => None,
        }
    }
}

/// The aggregate root. Price, tax and inventory are precomputed upstream;
/// the engine only moves the order through its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub customer_id: i64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub total_minor: i64,
    pub delivery_city: String,
    pub assigned_staff_id: Option<i64>,
    pub assigned_courier_id: Option<i64>,
    pub packaged_count: i32,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn assignee(&self, slot: AssigneeSlot) -> Option<i64> {
        match slot {
            AssigneeSlot::Staff => self.assigned_staff_id,
            AssigneeSlot::Courier => self.assigned_courier_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: i64,
    pub payment_method: PaymentMethod,
    pub total_minor: i64,
    pub delivery_city: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    Staff,
    Courier,
}

impl WorkerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerRole::Staff => "staff",
            WorkerRole::Courier => "courier",
        }
    }

    pub fn slot(&self) -> AssigneeSlot {
        match self {
            WorkerRole::Staff => AssigneeSlot::Staff,
            WorkerRole::Courier => AssigneeSlot::Courier,
        }
    }

    pub fn actor_role(&self) -> ActorRole {
        match self {
            WorkerRole::Staff => ActorRole::Staff,
            WorkerRole::Courier => ActorRole::Courier,
        }
    }
}

impl FromStr for WorkerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staff" => Ok(WorkerRole::Staff),
            "courier" => Ok(WorkerRole::Courier),
            other => Err(format!("unknown worker role: {other}")),
        }
    }
}

/// Packaging staff or courier. `operating_city = None` puts the worker in
/// the default fallback pool that serves every city.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: i64,
    pub name: String,
    pub role: WorkerRole,
    pub operating_city: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Attempted,
    Delivered,
    Returned,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Attempted => "attempted",
            AttemptOutcome::Delivered => "delivered",
            AttemptOutcome::Returned => "returned",
        }
    }
}

impl FromStr for AttemptOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "attempted" => Ok(AttemptOutcome::Attempted),
            "delivered" => Ok(AttemptOutcome::Delivered),
            "returned" => Ok(AttemptOutcome::Returned),
            other => Err(format!("unknown attempt outcome: {other}")),
        }
    }
}

/// One courier visit to the delivery address. Proof is optional on a plain
/// attempt and mandatory on the confirming one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: i64,
    pub order_id: i64,
    pub courier_id: Option<i64>,
    pub reason: String,
    pub proof_ref: Option<String>,
    pub otp_used: bool,
    pub signature_captured: bool,
    pub outcome: AttemptOutcome,
    pub attempted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDeliveryAttempt {
    pub order_id: i64,
    pub courier_id: Option<i64>,
    pub reason: String,
    pub proof_ref: Option<String>,
    pub otp_used: bool,
    pub signature_captured: bool,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Collected,
    Settled,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::Collected => "collected",
            SettlementStatus::Settled => "settled",
        }
    }
}

impl FromStr for SettlementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SettlementStatus::Pending),
            "collected" => Ok(SettlementStatus::Collected),
            "settled" => Ok(SettlementStatus::Settled),
            other => Err(format!("unknown settlement status: {other}")),
        }
    }
}

/// Cash-on-delivery money trail for one order. `settled` is terminal;
/// a settled row is never touched again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodSettlement {
    pub id: i64,
    pub order_id: i64,
    pub courier_id: i64,
    pub collected_minor: i64,
    pub collected_at: Option<DateTime<Utc>>,
    pub settlement_batch_id: Option<i64>,
    pub status: SettlementStatus,
}

/// A courier's collected cash grouped for back-office clearing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementBatch {
    pub id: i64,
    pub courier_id: i64,
    pub total_minor: i64,
    pub entry_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit record. History views are rebuilt from these rows
/// alone; they are never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderActivity {
    pub id: i64,
    pub order_id: i64,
    pub action: String,
    pub actor_role: String,
    pub actor_id: Option<i64>,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrderActivity {
    pub order_id: i64,
    pub action: String,
    pub actor_role: String,
    pub actor_id: Option<i64>,
    pub detail: serde_json::Value,
}
