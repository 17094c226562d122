pub mod actor;
pub mod adapters;
pub mod error;

pub use actor::{Actor, ActorRole};
pub use error::EngineError;
