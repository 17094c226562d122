pub mod auth;

pub use auth::actor_auth_middleware;
