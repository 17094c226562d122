use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;
use velora_api::middleware::auth::issue_actor_token;
use velora_api::state::{AppState, AuthConfig};
use velora_api::app;
use velora_core::adapters::{MockCommissionCalculator, MockProofStorage};
use velora_core::Actor;
use velora_fraud::{FraudGate, FraudPolicy, MemoryCounterStore};
use velora_order::memory::{MemoryAssessments, MemoryStore};
use velora_order::models::{Worker, WorkerRole};
use velora_order::FulfillmentManager;

const SECRET: &str = "integration-test-secret";

fn test_app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    store.insert_worker(Worker {
        id: 5,
        name: "packer".to_string(),
        role: WorkerRole::Staff,
        operating_city: Some("Dhaka".to_string()),
        active: true,
    });
    store.insert_worker(Worker {
        id: 9,
        name: "rider".to_string(),
        role: WorkerRole::Courier,
        operating_city: Some("Dhaka".to_string()),
        active: true,
    });

    let counters = Arc::new(MemoryCounterStore::new());
    let fraud = Arc::new(FraudGate::new(
        counters.clone(),
        Arc::new(MemoryAssessments::new()),
        FraudPolicy::default(),
    ));
    let manager = Arc::new(FulfillmentManager::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        fraud,
        Arc::new(MockCommissionCalculator),
        Arc::new(velora_core::adapters::LogNotifier),
    ));

    let state = AppState {
        manager,
        counters,
        proof_storage: Arc::new(MockProofStorage),
        auth: AuthConfig {
            secret: SECRET.to_string(),
            expiration: 3600,
        },
        http_rate_limit_per_minute: 1000,
    };
    (app(state), store)
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let mut req = builder
        .body(match body {
            Some(value) => Body::from(value.to_string()),
            None => Body::empty(),
        })
        .unwrap();
    // Stand-in for the connect info the real server attaches.
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 41000))));
    req
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn create_order_body() -> Value {
    json!({
        "customer_id": 700,
        "lines": [
            { "product_id": 1, "name": "kettle", "quantity": 1, "price_minor": 5200 }
        ],
        "shipping": {
            "recipient": "N. Akter",
            "phone": "01811111111",
            "address_line": "4 Mirpur Road",
            "city": "Dhaka"
        },
        "payment_method": "cod"
    })
}

#[tokio::test]
async fn health_is_open_and_worker_routes_require_a_token() {
    let (app, _) = test_app();

    let health = app
        .clone()
        .oneshot(request(Method::GET, "/health", None, None))
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let unauthorized = app
        .oneshot(request(
            Method::POST,
            "/v1/orders/1/transition",
            None,
            Some(json!({ "target": "picked_up" })),
        ))
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn full_cod_lifecycle_over_http() {
    let (app, _) = test_app();
    let staff = issue_actor_token(SECRET, Actor::staff(5), "packer", 3600).unwrap();
    let courier = issue_actor_token(SECRET, Actor::courier(9), "rider", 3600).unwrap();
    let admin = issue_actor_token(SECRET, Actor::admin(1), "ops", 3600).unwrap();

    // Create: fraud gate passes, staff auto-assigned by city.
    let created = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/v1/orders",
            None,
            Some(create_order_body()),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = body_json(created).await;
    let order_id = created["order"]["id"].as_i64().unwrap();
    assert_eq!(created["order"]["status"], "pending");
    assert_eq!(created["assigned_staff_id"], 5);

    // Package: first parcel moves the order into processing.
    let packaged = app
        .clone()
        .oneshot(request(
            Method::POST,
            &format!("/v1/orders/{order_id}/package"),
            Some(&staff),
            Some(json!({})),
        ))
        .await
        .unwrap();
    assert_eq!(packaged.status(), StatusCode::OK);
    assert_eq!(body_json(packaged).await["transitioned"], true);

    // Courier claims the order on pickup, then moves it out.
    for target in ["picked_up", "in_transit"] {
        let moved = app
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("/v1/orders/{order_id}/transition"),
                Some(&courier),
                Some(json!({ "target": target })),
            ))
            .await
            .unwrap();
        assert_eq!(moved.status(), StatusCode::OK, "transition to {target}");
    }

    // Confirm with a raw proof payload; the storage collaborator mints
    // the reference.
    let confirmed = app
        .clone()
        .oneshot(request(
            Method::POST,
            &format!("/v1/orders/{order_id}/confirm-delivery"),
            Some(&courier),
            Some(json!({ "proof_payload": "front-door-photo", "otp_used": true })),
        ))
        .await
        .unwrap();
    assert_eq!(confirmed.status(), StatusCode::OK);
    let confirmed = body_json(confirmed).await;
    assert_eq!(confirmed["order"]["status"], "delivered");
    assert_eq!(confirmed["settlement_opened"], true);

    // Cash in, then the back office clears the batch.
    let collected = app
        .clone()
        .oneshot(request(
            Method::POST,
            &format!("/v1/orders/{order_id}/collect-cod"),
            Some(&courier),
            Some(json!({ "amount_minor": 5200 })),
        ))
        .await
        .unwrap();
    assert_eq!(collected.status(), StatusCode::OK);

    let settled = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/v1/couriers/9/settle",
            Some(&admin),
            Some(json!({})),
        ))
        .await
        .unwrap();
    assert_eq!(settled.status(), StatusCode::OK);
    let settled = body_json(settled).await;
    assert_eq!(settled["batch"]["entry_count"], 1);
    assert_eq!(settled["lines"][0]["variance_minor"], 0);

    // The audit trail holds the whole story.
    let activity = app
        .clone()
        .oneshot(request(
            Method::GET,
            &format!("/v1/orders/{order_id}/activity"),
            None,
            None,
        ))
        .await
        .unwrap();
    let activity = body_json(activity).await;
    let actions: Vec<&str> = activity
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["action"].as_str().unwrap())
        .collect();
    for expected in [
        "order.created",
        "fraud.assessed",
        "order.assigned",
        "order.packaged",
        "order.transition",
        "delivery.confirmed",
        "cod.collected",
        "cod.settled",
    ] {
        assert!(actions.contains(&expected), "missing {expected}: {actions:?}");
    }
}

#[tokio::test]
async fn confirm_without_proof_is_rejected_with_missing_proof() {
    let (app, store) = test_app();
    let courier = issue_actor_token(SECRET, Actor::courier(9), "rider", 3600).unwrap();

    store.put_order(velora_order::models::Order {
        id: 301,
        customer_id: 700,
        status: velora_order::models::OrderStatus::InTransit,
        payment_status: velora_order::models::PaymentStatus::Pending,
        payment_method: velora_order::models::PaymentMethod::Cod,
        total_minor: 5200,
        delivery_city: "Dhaka".to_string(),
        assigned_staff_id: Some(5),
        assigned_courier_id: Some(9),
        packaged_count: 1,
        created_at: chrono::Utc::now(),
        delivered_at: None,
    });

    let rejected = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/v1/orders/301/confirm-delivery",
            Some(&courier),
            Some(json!({ "otp_used": true })),
        ))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    let body = body_json(rejected).await;
    assert_eq!(body["kind"], "missing_proof");

    // Status untouched.
    let view = app
        .oneshot(request(Method::GET, "/v1/orders/301", None, None))
        .await
        .unwrap();
    assert_eq!(body_json(view).await["order"]["status"], "in_transit");
}
