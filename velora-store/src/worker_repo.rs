use crate::{db_err, row_err};
use async_trait::async_trait;
use sqlx::PgPool;
use velora_core::EngineError;
use velora_order::models::{Worker, WorkerRole};
use velora_order::repository::WorkerRepository;

#[derive(sqlx::FromRow)]
struct WorkerRow {
    id: i64,
    name: String,
    role: String,
    operating_city: Option<String>,
    active: bool,
}

impl TryFrom<WorkerRow> for Worker {
    type Error = EngineError;

    fn try_from(row: WorkerRow) -> Result<Self, Self::Error> {
        let role: WorkerRole = row.role.parse().map_err(row_err)?;
        Ok(Worker {
            id: row.id,
            name: row.name,
            role,
            operating_city: row.operating_city,
            active: row.active,
        })
    }
}

pub struct PgWorkerRepository {
    pool: PgPool,
}

impl PgWorkerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkerRepository for PgWorkerRepository {
    async fn get_worker(&self, id: i64) -> Result<Option<Worker>, EngineError> {
        let row = sqlx::query_as::<_, WorkerRow>(
            "SELECT id, name, role, operating_city, active FROM workers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(Worker::try_from).transpose()
    }

    async fn list_active(&self, role: WorkerRole) -> Result<Vec<Worker>, EngineError> {
        let rows = sqlx::query_as::<_, WorkerRow>(
            "SELECT id, name, role, operating_city, active \
             FROM workers WHERE role = $1 AND active ORDER BY id",
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(Worker::try_from).collect()
    }
}
