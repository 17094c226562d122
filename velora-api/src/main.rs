use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use velora_api::{app, state::{AppState, AuthConfig}};
use velora_core::adapters::{MockCommissionCalculator, MockProofStorage};
use velora_fraud::FraudGate;
use velora_order::FulfillmentManager;
use velora_store::fraud_repo::PgAssessmentStore;
use velora_store::order_repo::{PgActivityRepository, PgDeliveryRepository, PgOrderRepository};
use velora_store::settlement_repo::PgSettlementRepository;
use velora_store::worker_repo::PgWorkerRepository;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "velora_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = velora_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Velora API on port {}", config.server.port);

    // Postgres
    let db = velora_store::DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    // Redis counters (fraud gate + HTTP rate limiting)
    let counters = Arc::new(
        velora_store::RedisCounters::new(&config.redis.url)
            .await
            .expect("Failed to connect to Redis"),
    );

    // Kafka event producer doubles as the best-effort notifier
    let events = Arc::new(
        velora_store::EventProducer::new(&config.kafka.brokers)
            .expect("Failed to create Kafka producer"),
    );

    let fraud = Arc::new(FraudGate::new(
        counters.clone(),
        Arc::new(PgAssessmentStore::new(db.pool.clone())),
        config.fraud.clone(),
    ));

    let manager = Arc::new(FulfillmentManager::new(
        Arc::new(PgOrderRepository::new(db.pool.clone())),
        Arc::new(PgWorkerRepository::new(db.pool.clone())),
        Arc::new(PgActivityRepository::new(db.pool.clone())),
        Arc::new(PgDeliveryRepository::new(db.pool.clone())),
        Arc::new(PgSettlementRepository::new(db.pool.clone())),
        fraud,
        // External collaborators; swapped for the real clients in deployment.
        Arc::new(MockCommissionCalculator),
        events,
    ));

    let app_state = AppState {
        manager,
        counters,
        proof_storage: Arc::new(MockProofStorage),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        http_rate_limit_per_minute: config.assignment.http_rate_limit_per_minute,
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.expect("bind failed");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server error");
}
