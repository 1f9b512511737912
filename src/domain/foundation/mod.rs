//! Shared building blocks for every domain module.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{DeviceId, EntryId, UserId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
