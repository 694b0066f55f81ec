pub mod clock;
pub mod config;
pub mod error;
pub mod history;
pub mod instrument;
pub mod negotiation;
pub mod persistence;
pub mod present_value;
pub mod redistribution;
pub mod schedule;
pub mod types;
pub mod validation;

pub use error::NegotiationError;
pub use types::*;

/// Standard result type for all negotiation operations
pub type NegotiationResult<T> = Result<T, NegotiationError>;
