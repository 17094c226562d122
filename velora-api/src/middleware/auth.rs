use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use velora_core::{Actor, ActorRole};

use crate::state::AppState;

/// Claims minted by the session provider for staff, couriers and admins.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ActorClaims {
    pub sub: String,
    pub name: String,
    pub role: String,
    pub exp: usize,
}

/// Resolves the bearer token into an explicit `Actor` and injects it into
/// request extensions; every handler below this layer works with that
/// actor rather than any ambient session state.
pub async fn actor_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract token from Authorization header
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Decode and validate JWT
    let token_data = decode::<ActorClaims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    // 3. Map the claims onto an engine actor
    let id: i64 = token_data
        .claims
        .sub
        .parse()
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let role: ActorRole = token_data
        .claims
        .role
        .parse()
        .map_err(|_| StatusCode::FORBIDDEN)?;

    // 4. Inject the actor
    req.extensions_mut().insert(Actor::new(id, role));

    Ok(next.run(req).await)
}

/// Token minting used by operational tooling and the integration tests;
/// production tokens come from the session provider.
pub fn issue_actor_token(
    secret: &str,
    actor: Actor,
    name: &str,
    ttl_seconds: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = ActorClaims {
        sub: actor.id.to_string(),
        name: name.to_string(),
        role: actor.role.to_string(),
        exp: (chrono::Utc::now().timestamp() as usize) + ttl_seconds as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
