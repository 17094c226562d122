use crate::{db_err, row_err};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use velora_core::EngineError;
use velora_order::models::{
    AssigneeSlot, AttemptOutcome, DeliveryAttempt, NewDeliveryAttempt, NewOrder, NewOrderActivity,
    Order, OrderActivity, OrderStatus,
};
use velora_order::repository::{ActivityRepository, DeliveryRepository, OrderRepository};

const ORDER_COLUMNS: &str = "id, customer_id, status, payment_status, payment_method, \
     total_minor, delivery_city, assigned_staff_id, assigned_courier_id, packaged_count, \
     created_at, delivered_at";

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    customer_id: i64,
    status: String,
    payment_status: String,
    payment_method: String,
    total_minor: i64,
    delivery_city: String,
    assigned_staff_id: Option<i64>,
    assigned_courier_id: Option<i64>,
    packaged_count: i32,
    created_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = EngineError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            customer_id: row.customer_id,
            status: row.status.parse().map_err(row_err)?,
            payment_status: row.payment_status.parse().map_err(row_err)?,
            payment_method: row.payment_method.parse().map_err(row_err)?,
            total_minor: row.total_minor,
            delivery_city: row.delivery_city,
            assigned_staff_id: row.assigned_staff_id,
            assigned_courier_id: row.assigned_courier_id,
            packaged_count: row.packaged_count,
            created_at: row.created_at,
            delivered_at: row.delivered_at,
        })
    }
}

fn slot_column(slot: AssigneeSlot) -> &'static str {
    match slot {
        AssigneeSlot::Staff => "assigned_staff_id",
        AssigneeSlot::Courier => "assigned_courier_id",
    }
}

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, EngineError> {
        let sql = format!(
            "INSERT INTO orders (customer_id, payment_method, total_minor, delivery_city) \
             VALUES ($1, $2, $3, $4) RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order.customer_id)
            .bind(order.payment_method.as_str())
            .bind(order.total_minor)
            .bind(&order.delivery_city)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        row.try_into()
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>, EngineError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(Order::try_from).transpose()
    }

    async fn cas_transition(
        &self,
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
        delivered_at: Option<DateTime<Utc>>,
    ) -> Result<bool, EngineError> {
        let result = sqlx::query(
            "UPDATE orders SET status = $1, delivered_at = COALESCE($2, delivered_at) \
             WHERE id = $3 AND status = $4",
        )
        .bind(to.as_str())
        .bind(delivered_at)
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
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
        let column = slot_column(slot);
        let sql = format!(
            "UPDATE orders SET status = $1, delivered_at = COALESCE($2, delivered_at), \
             {column} = $3 WHERE id = $4 AND status = $5 AND {column} IS NULL"
        );
        let result = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(delivered_at)
            .bind(worker_id)
            .bind(id)
            .bind(from.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn cas_assign(
        &self,
        id: i64,
        slot: AssigneeSlot,
        worker_id: i64,
        expected: Option<i64>,
    ) -> Result<bool, EngineError> {
        let column = slot_column(slot);
        let sql = format!(
            "UPDATE orders SET {column} = $1 \
             WHERE id = $2 AND {column} IS NOT DISTINCT FROM $3"
        );
        let result = sqlx::query(&sql)
            .bind(worker_id)
            .bind(id)
            .bind(expected)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn increment_packaged(&self, id: i64) -> Result<i32, EngineError> {
        let count: Option<i32> = sqlx::query_scalar(
            "UPDATE orders SET packaged_count = packaged_count + 1 \
             WHERE id = $1 RETURNING packaged_count",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        count.ok_or(EngineError::not_found("order", id))
    }

    async fn cas_mark_paid_cod(&self, id: i64) -> Result<bool, EngineError> {
        let result = sqlx::query(
            "UPDATE orders SET payment_status = 'paid' \
             WHERE id = $1 AND payment_method = 'cod' AND payment_status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: i64,
    order_id: i64,
    action: String,
    actor_role: String,
    actor_id: Option<i64>,
    detail: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<ActivityRow> for OrderActivity {
    fn from(row: ActivityRow) -> Self {
        OrderActivity {
            id: row.id,
            order_id: row.order_id,
            action: row.action,
            actor_role: row.actor_role,
            actor_id: row.actor_id,
            detail: row.detail,
            created_at: row.created_at,
        }
    }
}

pub struct PgActivityRepository {
    pool: PgPool,
}

impl PgActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityRepository for PgActivityRepository {
    async fn append(&self, activity: NewOrderActivity) -> Result<OrderActivity, EngineError> {
        let row = sqlx::query_as::<_, ActivityRow>(
            "INSERT INTO order_activity (order_id, action, actor_role, actor_id, detail) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, order_id, action, actor_role, actor_id, detail, created_at",
        )
        .bind(activity.order_id)
        .bind(&activity.action)
        .bind(&activity.actor_role)
        .bind(activity.actor_id)
        .bind(&activity.detail)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.into())
    }

    async fn list_for_order(&self, order_id: i64) -> Result<Vec<OrderActivity>, EngineError> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            "SELECT id, order_id, action, actor_role, actor_id, detail, created_at \
             FROM order_activity WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(OrderActivity::from).collect())
    }
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: i64,
    order_id: i64,
    courier_id: Option<i64>,
    reason: String,
    proof_ref: Option<String>,
    otp_used: bool,
    signature_captured: bool,
    outcome: String,
    attempted_at: DateTime<Utc>,
}

impl TryFrom<AttemptRow> for DeliveryAttempt {
    type Error = EngineError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        let outcome: AttemptOutcome = row.outcome.parse().map_err(row_err)?;
        Ok(DeliveryAttempt {
            id: row.id,
            order_id: row.order_id,
            courier_id: row.courier_id,
            reason: row.reason,
            proof_ref: row.proof_ref,
            otp_used: row.otp_used,
            signature_captured: row.signature_captured,
            outcome,
            attempted_at: row.attempted_at,
        })
    }
}

pub struct PgDeliveryRepository {
    pool: PgPool,
}

impl PgDeliveryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryRepository for PgDeliveryRepository {
    async fn record_attempt(
        &self,
        attempt: NewDeliveryAttempt,
    ) -> Result<DeliveryAttempt, EngineError> {
        let row = sqlx::query_as::<_, AttemptRow>(
            "INSERT INTO delivery_attempts \
             (order_id, courier_id, reason, proof_ref, otp_used, signature_captured, outcome) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id, order_id, courier_id, reason, proof_ref, otp_used, \
                       signature_captured, outcome, attempted_at",
        )
        .bind(attempt.order_id)
        .bind(attempt.courier_id)
        .bind(&attempt.reason)
        .bind(&attempt.proof_ref)
        .bind(attempt.otp_used)
        .bind(attempt.signature_captured)
        .bind(attempt.outcome.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        row.try_into()
    }

    async fn list_for_order(&self, order_id: i64) -> Result<Vec<DeliveryAttempt>, EngineError> {
        let rows = sqlx::query_as::<_, AttemptRow>(
            "SELECT id, order_id, courier_id, reason, proof_ref, otp_used, \
                    signature_captured, outcome, attempted_at \
             FROM delivery_attempts WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(DeliveryAttempt::try_from).collect()
    }
}
