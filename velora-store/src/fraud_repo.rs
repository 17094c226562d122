use crate::db_err;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use velora_core::EngineError;
use velora_fraud::gate::{AssessmentStore, FraudAssessment, NewFraudAssessment};

#[derive(sqlx::FromRow)]
struct InsertedRow {
    id: i64,
    created_at: DateTime<Utc>,
}

pub struct PgAssessmentStore {
    pool: PgPool,
}

impl PgAssessmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssessmentStore for PgAssessmentStore {
    async fn persist(
        &self,
        assessment: NewFraudAssessment,
    ) -> Result<FraudAssessment, EngineError> {
        let indicators = serde_json::to_value(&assessment.indicators)
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        let row = sqlx::query_as::<_, InsertedRow>(
            "INSERT INTO fraud_assessments \
             (trace_id, user_id, order_id, amount_minor, score, indicators, decision, enforced) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id, created_at",
        )
        .bind(assessment.trace_id)
        .bind(assessment.user_id)
        .bind(assessment.order_id)
        .bind(assessment.amount_minor)
        .bind(assessment.score as i32)
        .bind(&indicators)
        .bind(assessment.decision.as_str())
        .bind(assessment.enforced)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(FraudAssessment {
            id: row.id,
            trace_id: assessment.trace_id,
            user_id: assessment.user_id,
            order_id: assessment.order_id,
            amount_minor: assessment.amount_minor,
            score: assessment.score,
            indicators: assessment.indicators,
            decision: assessment.decision,
            enforced: assessment.enforced,
            created_at: row.created_at,
        })
    }

    async fn attach_order(&self, trace_id: Uuid, order_id: i64) -> Result<(), EngineError> {
        sqlx::query("UPDATE fraud_assessments SET order_id = $1 WHERE trace_id = $2")
            .bind(order_id)
            .bind(trace_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
