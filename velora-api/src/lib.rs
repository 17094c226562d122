use axum::{
    extract::State,
    http::Method,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod finance;
pub mod fulfillment;
pub mod middleware;
pub mod orders;
pub mod state;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    // Worker/admin surface: everything here runs with an explicit actor.
    let actor_routes = Router::new()
        .route("/v1/orders/{id}/transition", post(orders::transition_order))
        .route("/v1/orders/{id}/assign", post(orders::assign_order))
        .route("/v1/orders/bulk-assign", post(orders::bulk_assign))
        .route("/v1/orders/{id}/package", post(fulfillment::mark_packaged))
        .route(
            "/v1/orders/{id}/delivery-attempt",
            post(fulfillment::attempt_delivery),
        )
        .route(
            "/v1/orders/{id}/confirm-delivery",
            post(fulfillment::confirm_delivery),
        )
        .route("/v1/orders/{id}/collect-cod", post(finance::collect_cod))
        .route("/v1/couriers/{id}/settle", post(finance::settle_batch))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::actor_auth_middleware,
        ));

    // Storefront surface: order creation arrives from the trusted shop
    // frontend, which authenticates the customer itself.
    let public_routes = Router::new()
        .route("/v1/orders", post(orders::create_order))
        .route("/v1/orders/{id}", get(orders::get_order))
        .route("/v1/orders/{id}/activity", get(orders::get_activity))
        .route("/health", get(health));

    Router::new()
        .merge(actor_routes)
        .merge(public_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<SocketAddr>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, impl IntoResponse> {
    let ip = addr.ip().to_string();
    let key = format!("ratelimit:{}", ip);

    match state.counters.hit(&key, 60).await {
        Ok(count) if count > state.http_rate_limit_per_minute => Err((
            axum::http::StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded",
        )),
        Ok(_) => Ok(next.run(req).await),
        Err(_) => Ok(next.run(req).await), // Fail open
    }
}
