use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role under which a caller acts on an order. Every core call takes an
/// explicit actor; there is no ambient session lookup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Staff,
    Courier,
    Admin,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Staff => "staff",
            ActorRole::Courier => "courier",
            ActorRole::Admin => "admin",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staff" => Ok(ActorRole::Staff),
            "courier" => Ok(ActorRole::Courier),
            "admin" => Ok(ActorRole::Admin),
            other => Err(format!("unknown actor role: {other}")),
        }
    }
}

/// The authenticated identity behind a request, supplied by the session
/// provider at the API boundary and threaded through every operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: i64, role: ActorRole) -> Self {
        Self { id, role }
    }

    pub fn staff(id: i64) -> Self {
        Self::new(id, ActorRole::Staff)
    }

    pub fn courier(id: i64) -> Self {
        Self::new(id, ActorRole::Courier)
    }

    pub fn admin(id: i64) -> Self {
        Self::new(id, ActorRole::Admin)
    }
}
