use async_trait::async_trait;
use velora_core::EngineError;
use velora_fraud::CounterStore;

fn redis_err(e: redis::RedisError) -> EngineError {
    EngineError::Persistence(format!("redis: {e}"))
}

/// Redis-backed counters for the fraud gate and the HTTP rate limiter.
/// Every window lives server-side so the checks hold across instances.
#[derive(Clone)]
pub struct RedisCounters {
    client: redis::Client,
}

impl RedisCounters {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CounterStore for RedisCounters {
    async fn hit(&self, key: &str, window_secs: u64) -> Result<u64, EngineError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_err)?;
        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_secs as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(count.max(0) as u64)
    }

    async fn acquire_once(&self, key: &str, ttl_secs: u64) -> Result<bool, EngineError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_err)?;
        // SET NX: only set if the key does not exist
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(result.is_some())
    }

    async fn add_member(
        &self,
        key: &str,
        member: &str,
        window_secs: u64,
    ) -> Result<u64, EngineError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_err)?;
        let (cardinality,): (i64,) = redis::pipe()
            .atomic()
            .sadd(key, member)
            .ignore()
            .expire(key, window_secs as i64)
            .ignore()
            .scard(key)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(cardinality.max(0) as u64)
    }

    async fn first_seen(&self, key: &str) -> Result<i64, EngineError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_err)?;
        let now = chrono::Utc::now().timestamp();
        let _: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(now)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        let stamp: Option<i64> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(stamp.unwrap_or(now))
    }
}
