use crate::models::OrderStatus;
use velora_core::{ActorRole, EngineError};

/// Role-scoped transition table for the order lifecycle.
///
/// Modeled as a direct lookup instead of branching: each (status, role)
/// pair maps to the full set of legal targets, so the table is
/// exhaustively unit-testable and a new edge is a one-line change.
///
/// Staff only ever move orders into packaging. Couriers own the
/// pickup-to-door leg. Admins may apply any edge of the DAG, walk the
/// return branch, and force-cancel anything that is not terminal.
pub fn allowed_targets(from: OrderStatus, role: ActorRole) -> &'static [OrderStatus] {
    use OrderStatus::*;

    match role {
        ActorRole::Staff => match from {
            Pending | Confirmed | Shipped => &[Processing],
            _ => &[],
        },
        ActorRole::Courier => match from {
            Processing | Confirmed => &[PickedUp],
            PickedUp => &[InTransit, Delivered, ReturnRequested],
            InTransit => &[Delivered, ReturnRequested],
            Shipped => &[PickedUp, InTransit, Delivered, ReturnRequested],
            _ => &[],
        },
        ActorRole::Admin => match from {
            Pending => &[Confirmed, Processing, Cancelled],
            Confirmed => &[Processing, PickedUp, Cancelled],
            Processing => &[ReadyForPickup, PickedUp, Cancelled],
            ReadyForPickup => &[PickedUp, Cancelled],
            PickedUp => &[InTransit, Delivered, ReturnRequested, Cancelled],
            InTransit => &[Shipped, Delivered, ReturnRequested, Cancelled],
            Shipped => &[Processing, PickedUp, InTransit, Delivered, ReturnRequested, Cancelled],
            ReturnRequested => &[ReturnPickedUp, Cancelled],
            ReturnPickedUp => &[ReturnInTransit, Cancelled],
            ReturnInTransit => &[Returned, Cancelled],
            Delivered | Cancelled | Returned => &[],
        },
    }
}

/// Terminal states accept no further writes of any kind.
pub fn is_terminal(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Returned
    )
}

pub fn is_permitted(from: OrderStatus, to: OrderStatus, role: ActorRole) -> bool {
    allowed_targets(from, role).contains(&to)
}

/// Validates one requested edge; an illegal request yields
/// `InvalidTransition` and the caller writes no activity record.
pub fn validate(from: OrderStatus, to: OrderStatus, role: ActorRole) -> Result<(), EngineError> {
    if is_permitted(from, to, role) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
            role,
        })
    }
}
