use crate::{db_err, row_err};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use velora_core::EngineError;
use velora_order::models::{CodSettlement, SettlementBatch, SettlementStatus};
use velora_order::repository::SettlementRepository;

const SETTLEMENT_COLUMNS: &str =
    "id, order_id, courier_id, collected_minor, collected_at, settlement_batch_id, status";

#[derive(sqlx::FromRow)]
struct SettlementRow {
    id: i64,
    order_id: i64,
    courier_id: i64,
    collected_minor: i64,
    collected_at: Option<DateTime<Utc>>,
    settlement_batch_id: Option<i64>,
    status: String,
}

impl TryFrom<SettlementRow> for CodSettlement {
    type Error = EngineError;

    fn try_from(row: SettlementRow) -> Result<Self, Self::Error> {
        let status: SettlementStatus = row.status.parse().map_err(row_err)?;
        Ok(CodSettlement {
            id: row.id,
            order_id: row.order_id,
            courier_id: row.courier_id,
            collected_minor: row.collected_minor,
            collected_at: row.collected_at,
            settlement_batch_id: row.settlement_batch_id,
            status,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BatchRow {
    id: i64,
    courier_id: i64,
    total_minor: i64,
    entry_count: i64,
    created_at: DateTime<Utc>,
}

pub struct PgSettlementRepository {
    pool: PgPool,
}

impl PgSettlementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettlementRepository for PgSettlementRepository {
    async fn open_pending(
        &self,
        order_id: i64,
        courier_id: i64,
        amount_minor: i64,
    ) -> Result<CodSettlement, EngineError> {
        // The conflict arm keeps an existing entry untouched; the entry is
        // unique per order.
        sqlx::query(
            "INSERT INTO cod_settlements (order_id, courier_id, collected_minor, status) \
             VALUES ($1, $2, $3, 'pending') \
             ON CONFLICT (order_id) DO NOTHING",
        )
            .bind(order_id)
            .bind(courier_id)
            .bind(amount_minor)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        let select = format!("SELECT {SETTLEMENT_COLUMNS} FROM cod_settlements WHERE order_id = $1");
        let row = sqlx::query_as::<_, SettlementRow>(&select)
            .bind(order_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        row.try_into()
    }

    async fn find_by_order(&self, order_id: i64) -> Result<Option<CodSettlement>, EngineError> {
        let sql = format!("SELECT {SETTLEMENT_COLUMNS} FROM cod_settlements WHERE order_id = $1");
        let row = sqlx::query_as::<_, SettlementRow>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(CodSettlement::try_from).transpose()
    }

    async fn upsert_collected(
        &self,
        order_id: i64,
        courier_id: i64,
        amount_minor: i64,
    ) -> Result<Option<CodSettlement>, EngineError> {
        // A settled row is terminal: the guarded conflict arm refuses to
        // touch it and the call yields None.
        let sql = format!(
            "INSERT INTO cod_settlements \
             (order_id, courier_id, collected_minor, collected_at, status) \
             VALUES ($1, $2, $3, NOW(), 'collected') \
             ON CONFLICT (order_id) DO UPDATE SET \
                 courier_id = EXCLUDED.courier_id, \
                 collected_minor = EXCLUDED.collected_minor, \
                 collected_at = NOW(), \
                 status = 'collected' \
             WHERE cod_settlements.status <> 'settled' \
             RETURNING {SETTLEMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, SettlementRow>(&sql)
            .bind(order_id)
            .bind(courier_id)
            .bind(amount_minor)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(CodSettlement::try_from).transpose()
    }

    async fn list_collected(&self, courier_id: i64) -> Result<Vec<CodSettlement>, EngineError> {
        let sql = format!(
            "SELECT {SETTLEMENT_COLUMNS} FROM cod_settlements \
             WHERE courier_id = $1 AND status = 'collected' ORDER BY id"
        );
        let rows = sqlx::query_as::<_, SettlementRow>(&sql)
            .bind(courier_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(CodSettlement::try_from).collect()
    }

    async fn create_batch(
        &self,
        courier_id: i64,
        total_minor: i64,
        entry_count: i64,
    ) -> Result<SettlementBatch, EngineError> {
        let row = sqlx::query_as::<_, BatchRow>(
            "INSERT INTO settlement_batches (courier_id, total_minor, entry_count) \
             VALUES ($1, $2, $3) \
             RETURNING id, courier_id, total_minor, entry_count, created_at",
        )
        .bind(courier_id)
        .bind(total_minor)
        .bind(entry_count)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(SettlementBatch {
            id: row.id,
            courier_id: row.courier_id,
            total_minor: row.total_minor,
            entry_count: row.entry_count,
            created_at: row.created_at,
        })
    }

    async fn settle_into_batch(
        &self,
        courier_id: i64,
        batch_id: i64,
    ) -> Result<u64, EngineError> {
        let result = sqlx::query(
            "UPDATE cod_settlements \
             SET status = 'settled', settlement_batch_id = $1 \
             WHERE courier_id = $2 AND status = 'collected'",
        )
        .bind(batch_id)
        .bind(courier_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}
