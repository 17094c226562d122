use crate::actor::ActorRole;

/// The engine-wide error taxonomy. Everything user-visible maps onto one
/// of these kinds; nothing is silently swallowed.
///
/// `ConcurrencyConflict` is safe to retry once after a re-read;
/// authorization and validation errors are not retryable without changed
/// input. `Persistence` is surfaced to the caller, never auto-retried.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("role {role} is not permitted to {action}")]
    Authorization { role: ActorRole, action: String },

    #[error("invalid transition {from} -> {to} for role {role}")]
    InvalidTransition {
        from: String,
        to: String,
        role: ActorRole,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("payment blocked by fraud gate (score {score})")]
    FraudBlocked { score: u32, trace_id: uuid::Uuid },

    #[error("duplicate submission detected: {0}")]
    DuplicateSubmission(String),

    #[error("rate limit exceeded for {0}")]
    RateLimited(String),

    #[error("concurrent update lost on order {0}, retry")]
    ConcurrencyConflict(i64),

    #[error("delivery confirmation requires a proof artifact")]
    MissingProof,

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        EngineError::NotFound { entity, id }
    }

    /// Whether a caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::ConcurrencyConflict(_))
    }
}
